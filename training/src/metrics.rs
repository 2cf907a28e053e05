//! Loss and quality measures of a network over a set of samples.

use tensor::{Network, Tensor3};

use crate::data_type::dataset::Sample;
use crate::error::{TrainingError, TrainingResult};

/// Output error of one prediction, `output - expected`.
pub fn output_error(output: &Tensor3, expected: &Tensor3) -> TrainingResult<Tensor3> {
    Ok(output.zip_map(expected, |o, e| o - e)?)
}

/// Half sum of squared errors, `sum(e^2) / 2`.
pub fn squared_error(error: &Tensor3) -> f64 {
    error.values().iter().map(|e| (*e as f64) * (*e as f64)).sum::<f64>() / 2.0
}

/// Mean half-squared-error loss of the network over `samples`.
///
/// # Arguments
/// * `network` - Network to evaluate; its stored layer inputs are overwritten
/// * `samples` - Input/expected-output pairs
///
/// # Returns
/// * Mean over samples of `sum(error^2) / 2`, not divided by the output size
pub fn mean_loss(network: &mut Network, samples: &[Sample]) -> TrainingResult<f64> {
    if samples.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    let mut total = 0.0;
    for sample in samples {
        let output = network.forward_pass(&sample.input)?;
        total += squared_error(&output_error(&output, &sample.output)?);
    }
    Ok(total / samples.len() as f64)
}

/// Share of samples whose largest output sits where the largest expected value is.
///
/// Ties resolve to the first index on both sides.
pub fn accuracy(network: &mut Network, samples: &[Sample]) -> TrainingResult<f32> {
    if samples.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    let mut hits = 0usize;
    for sample in samples {
        let output = network.forward_pass(&sample.input)?;
        if output.max_pos() == sample.output.max_pos() {
            hits += 1;
        }
    }
    Ok(hits as f32 / samples.len() as f32)
}

/// Mean absolute difference over every output value of every sample.
pub fn mean_absolute_error(network: &mut Network, samples: &[Sample]) -> TrainingResult<f64> {
    if samples.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    let mut total = 0.0f64;
    let mut count = 0usize;
    for sample in samples {
        let output = network.forward_pass(&sample.input)?;
        let error = output_error(&output, &sample.output)?;
        total += error.values().iter().map(|e| e.abs() as f64).sum::<f64>();
        count += error.values().len();
    }
    Ok(total / count.max(1) as f64)
}
