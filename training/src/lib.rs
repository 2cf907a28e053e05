//! Backpropagation, gradient checking and the mini-batch training loop.

pub mod context;
pub mod data_type;
pub mod error;
pub mod fit;
pub mod gradient;
pub mod metrics;
pub mod optimizer;

pub use context::{Clock, ProgressSink, SystemClock, TracingSink, TrainingContext};
pub use data_type::dataset::{Dataset, Sample};
pub use error::{TrainingError, TrainingResult};
pub use fit::{fit, train, StopReason, TrainingReport};
pub use optimizer::{random_step, MomentumOptimizer};
