use std::time::Duration;

use rand::{seq::SliceRandom, RngCore, SeedableRng};
use rand_chacha::ChaChaRng;
use tensor::{Layer, Network};
use tracing::{info, warn};

use crate::context::{Clock, Progress, ProgressSink, SystemClock, TracingSink, TrainingContext};
use crate::data_type::dataset::Sample;
use crate::error::{TrainingError, TrainingResult};
use crate::gradient::batch_gradient;
use crate::optimizer::MomentumOptimizer;

/// Terminal state of a training run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum StopReason {
    Converged,
    TimedOut,
    LearningRateCollapsed,
    EpochLimit,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct TrainingReport {
    pub stop_reason: StopReason,
    pub epochs: usize,
    pub batches: usize,
    pub final_loss: f32,
    pub learning_rate: f32,
    /// Mean loss of every batch, measured before its update.
    pub losses: Vec<f32>,
    pub elapsed: Duration,
}

fn shuffle_rng(seed: Option<u64>) -> Box<dyn RngCore> {
    match seed {
        Some(seed) => Box::new(ChaChaRng::seed_from_u64(seed)),
        None => Box::new(rand::rng()),
    }
}

fn stop_after_batch(ctx: &TrainingContext, loss: f32, elapsed: Duration, learning_rate: f32) -> Option<StopReason> {
    if loss < ctx.loss_goal {
        Some(StopReason::Converged)
    } else if elapsed > ctx.time_budget {
        Some(StopReason::TimedOut)
    } else if learning_rate < ctx.min_learning_rate {
        Some(StopReason::LearningRateCollapsed)
    } else {
        None
    }
}

/// Mini-batch gradient descent with momentum on `samples`.
///
/// Every epoch shuffles the sample order and walks it in contiguous batches.
/// After every batch the parameters are updated and the stop conditions
/// checked. The trained parameters stay in `network`. Divergence is not an
/// error: it shows up as the returned [`StopReason`].
pub fn fit(
    network: &mut Network,
    samples: &[Sample],
    ctx: &TrainingContext,
    clock: &dyn Clock,
    sink: &mut dyn ProgressSink,
) -> TrainingResult<TrainingReport> {
    if samples.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    let batch_size = match ctx.batch_size {
        Some(0) => return Err(TrainingError::InvalidBatchSize),
        Some(size) => size.min(samples.len()),
        None => samples.len(),
    };
    info!(
        "training {} params on {} samples, batch {}, lr {}",
        network.param_count(),
        samples.len(),
        batch_size,
        ctx.learning_rate
    );

    let start = clock.now();
    let mut rng = shuffle_rng(ctx.seed);
    let mut order: Vec<usize> = (0..samples.len()).collect();
    let mut params = network.get_params();
    let mut optimizer = MomentumOptimizer::new(params.len(), ctx.momentum, ctx.max_norm);
    let mut learning_rate = ctx.learning_rate;
    let mut losses = Vec::new();
    let mut last_report: Option<Duration> = None;

    for epoch in 0..ctx.max_epochs {
        order.shuffle(&mut *rng);
        for chunk in order.chunks(batch_size) {
            let (loss, gradient) = batch_gradient(network, chunk.iter().map(|idx| &samples[*idx]))?;
            optimizer.step(&mut params, &gradient, learning_rate)?;
            network.set_params(&params)?;
            let loss = loss as f32;
            losses.push(loss);

            let elapsed = clock.now().saturating_sub(start);
            let stop = stop_after_batch(ctx, loss, elapsed, learning_rate);
            let due = match last_report {
                None => true,
                Some(at) => elapsed.saturating_sub(at) >= ctx.report_interval,
            };
            if due || stop.is_some() {
                sink.report(&Progress {
                    epoch,
                    batch: losses.len(),
                    loss,
                    learning_rate,
                    elapsed,
                    stop,
                });
                last_report = Some(elapsed);
            }
            if let Some(stop_reason) = stop {
                match stop_reason {
                    StopReason::TimedOut => warn!("time budget of {:?} exhausted", ctx.time_budget),
                    StopReason::LearningRateCollapsed => warn!("learning rate collapsed to {:e}", learning_rate),
                    _ => info!("converged after {} batches", losses.len()),
                }
                return Ok(TrainingReport {
                    stop_reason,
                    epochs: epoch + 1,
                    batches: losses.len(),
                    final_loss: loss,
                    learning_rate,
                    losses,
                    elapsed,
                });
            }
        }
        if let Some(decay) = ctx.learning_rate_decay {
            learning_rate *= decay;
        }
    }

    let elapsed = clock.now().saturating_sub(start);
    let final_loss = losses.last().copied().unwrap_or(f32::NAN);
    sink.report(&Progress {
        epoch: ctx.max_epochs,
        batch: losses.len(),
        loss: final_loss,
        learning_rate,
        elapsed,
        stop: Some(StopReason::EpochLimit),
    });
    Ok(TrainingReport {
        stop_reason: StopReason::EpochLimit,
        epochs: ctx.max_epochs,
        batches: losses.len(),
        final_loss,
        learning_rate,
        losses,
        elapsed,
    })
}

/// [`fit`] on the wall clock, reporting through `tracing`.
pub fn train(network: &mut Network, samples: &[Sample], ctx: &TrainingContext) -> TrainingResult<TrainingReport> {
    fit(network, samples, ctx, &SystemClock::new(), &mut TracingSink)
}
