//! Tensors, convolution and pooling engines, and the layers a feed-forward
//! network is built from.

pub mod activation;
pub mod conv;
pub mod dense;
pub mod error;
pub mod layer;
pub mod malgebra;
pub mod network;
pub mod pool;
pub mod reshape;
pub mod traits;

pub use activation::Activation;
pub use error::{TensorError, TensorResult};
pub use layer::AnyLayer;
pub use malgebra::shape::{Shape2, Shape3};
pub use malgebra::tensor::{Tensor2, Tensor3};
pub use network::Network;
pub use traits::{ConfigFS, Layer};
