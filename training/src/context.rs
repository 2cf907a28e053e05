use std::time::{Duration, Instant};

use tracing::info;

use crate::fit::StopReason;

// Settings of one training run
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TrainingContext {
    pub learning_rate: f32,
    /// Mean batch loss below which the run counts as converged.
    pub loss_goal: f32,
    /// `None` trains on the whole training set at once.
    pub batch_size: Option<usize>,
    pub max_epochs: usize,
    pub time_budget: Duration,
    pub momentum: f32,
    /// Every parameter is clamped to `[-max_norm, max_norm]` after a step.
    pub max_norm: f32,
    pub min_learning_rate: f32,
    /// Multiplied into the learning rate after every epoch.
    pub learning_rate_decay: Option<f32>,
    /// Seeds the shuffle; `None` draws from system entropy.
    pub seed: Option<u64>,
    pub report_interval: Duration,
}

impl Default for TrainingContext {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            loss_goal: 1e-6,
            batch_size: None,
            max_epochs: 10_000,
            time_budget: Duration::from_secs(60),
            momentum: 0.7,
            max_norm: 3.0,
            min_learning_rate: 1e-7,
            learning_rate_decay: None,
            seed: None,
            report_interval: Duration::from_millis(500),
        }
    }
}

/// Monotonic time source polled by the training loop.
pub trait Clock {
    /// Time since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Snapshot handed to a [`ProgressSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct Progress {
    pub epoch: usize,
    pub batch: usize,
    pub loss: f32,
    pub learning_rate: f32,
    pub elapsed: Duration,
    /// Set on the last report of a run.
    pub stop: Option<StopReason>,
}

pub trait ProgressSink {
    fn report(&mut self, progress: &Progress);
}

/// Forwards progress to `tracing` at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn report(&mut self, progress: &Progress) {
        match progress.stop {
            Some(reason) => info!(
                "training stopped ({:?}) after epoch {} batch {}: loss {:.6e}, lr {:.3e}, {:?}",
                reason, progress.epoch, progress.batch, progress.loss, progress.learning_rate, progress.elapsed
            ),
            None => info!(
                "epoch {} batch {}: loss {:.6e}, lr {:.3e}, {:?}",
                progress.epoch, progress.batch, progress.loss, progress.learning_rate, progress.elapsed
            ),
        }
    }
}
