//! Analytic (backpropagated) and finite-difference gradients of the mean
//! half-squared-error loss with respect to the flat parameter vector.

use rayon::prelude::*;
use tensor::{Layer, Network};

use crate::data_type::dataset::Sample;
use crate::error::{TrainingError, TrainingResult};
use crate::metrics::{mean_loss, output_error, squared_error};

/// Floor of the denominator in [`relative_error`], so that two tiny
/// gradients do not count as a large disagreement.
pub const RELATIVE_ERROR_FLOOR: f32 = 1e-2;

/// Mean loss and mean gradient over a batch, summed in sample order.
pub(crate) fn batch_gradient<'a>(
    network: &mut Network,
    samples: impl ExactSizeIterator<Item = &'a Sample>,
) -> TrainingResult<(f64, Vec<f32>)> {
    let n = samples.len();
    if n == 0 {
        return Err(TrainingError::EmptyDataset);
    }
    let mut gradient = vec![0.0f32; network.param_count()];
    let mut loss = 0.0f64;
    for sample in samples {
        let output = network.forward_pass(&sample.input)?;
        let error = output_error(&output, &sample.output)?;
        loss += squared_error(&error);
        let (_, sample_gradient) = network.backward_pass(&error)?;
        gradient.iter_mut().zip(sample_gradient).for_each(|(acc, g)| *acc += g);
    }
    let scale = 1.0 / n as f32;
    gradient.iter_mut().for_each(|g| *g *= scale);
    Ok((loss / n as f64, gradient))
}

/// Backpropagated gradient of the mean loss over `samples`.
///
/// Each sample is forward-passed, its error `output - expected` pushed back
/// through the network, and the per-sample gradients averaged.
pub fn backprop_gradient(network: &mut Network, samples: &[Sample]) -> TrainingResult<(f64, Vec<f32>)> {
    batch_gradient(network, samples.iter())
}

/// Central finite differences `(L(p + d) - L(p - d)) / 2d` for every parameter.
///
/// Parameters are perturbed in parallel, each worker on its own copy of the
/// network. The denominator is the perturbation actually representable in
/// `f32`, and losses are accumulated in `f64`.
pub fn numerical_gradient(network: &Network, samples: &[Sample], delta: f32) -> TrainingResult<Vec<f32>> {
    if samples.is_empty() {
        return Err(TrainingError::EmptyDataset);
    }
    let params = network.get_params();
    (0..params.len())
        .into_par_iter()
        .map(|i| -> TrainingResult<f32> {
            let mut local = network.clone();
            let mut shifted = params.clone();
            shifted[i] = params[i] + delta;
            let up = shifted[i];
            local.set_params(&shifted)?;
            let loss_up = mean_loss(&mut local, samples)?;
            shifted[i] = params[i] - delta;
            let down = shifted[i];
            local.set_params(&shifted)?;
            let loss_down = mean_loss(&mut local, samples)?;
            Ok(((loss_up - loss_down) / (up - down) as f64) as f32)
        })
        .collect()
}

/// `|a - n| / max(|a|, |n|, RELATIVE_ERROR_FLOOR)`
pub fn relative_error(analytic: f32, numeric: f32) -> f32 {
    (analytic - numeric).abs() / analytic.abs().max(numeric.abs()).max(RELATIVE_ERROR_FLOOR)
}

/// Worst disagreement between backprop and finite differences.
#[derive(Clone, Debug, PartialEq)]
pub struct GradientCheck {
    pub max_relative_error: f32,
    pub worst_param: usize,
    pub analytic: Vec<f32>,
    pub numeric: Vec<f32>,
}

pub fn gradient_check(network: &mut Network, samples: &[Sample], delta: f32) -> TrainingResult<GradientCheck> {
    let (_, analytic) = backprop_gradient(network, samples)?;
    let numeric = numerical_gradient(network, samples, delta)?;
    let (worst_param, max_relative_error) = analytic
        .iter()
        .zip(numeric.iter())
        .map(|(a, n)| relative_error(*a, *n))
        .enumerate()
        .fold((0, 0.0f32), |best, (idx, err)| if err > best.1 { (idx, err) } else { best });
    Ok(GradientCheck { max_relative_error, worst_param, analytic, numeric })
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaChaRng;
    use tensor::{Activation, AnyLayer, Shape2, Shape3, Tensor3};

    use super::*;

    fn random_tensor(rng: &mut ChaChaRng, shape: Shape3) -> Tensor3 {
        Tensor3::from_values(shape, (0..shape.volume()).map(|_| rng.random_range(-1.0..1.0)).collect()).unwrap()
    }

    fn samples(rng: &mut ChaChaRng) -> Vec<Sample> {
        (0..4)
            .map(|_| {
                let input = random_tensor(rng, Shape3::new(1, 4, 4));
                let output = Tensor3::from_values(Shape3::new(1, 1, 1), vec![rng.random_range(0.1..0.9)]).unwrap();
                Sample::new(input, output)
            })
            .collect()
    }

    fn randomize(net: &mut Network, rng: &mut ChaChaRng) {
        let params: Vec<f32> = (0..net.param_count()).map(|_| rng.random_range(-0.5..0.5)).collect();
        net.set_params(&params).unwrap();
    }

    fn assert_close(check: &GradientCheck) {
        assert!(
            check.max_relative_error < 1e-2,
            "param {}: analytic {} vs numeric {}",
            check.worst_param,
            check.analytic[check.worst_param],
            check.numeric[check.worst_param]
        );
    }

    #[test]
    fn conv_pool_dense_chain() {
        let mut rng = ChaChaRng::seed_from_u64(31);
        let input = Shape3::new(1, 4, 4);
        let mut net = Network::new(vec![
            AnyLayer::input(input),
            AnyLayer::conv(input, Shape2::new(3, 3), 2, 1, (1, 1)).unwrap(),
            AnyLayer::activation(Shape3::new(2, 4, 4), Activation::Tanh),
            AnyLayer::avg_pool(Shape3::new(2, 4, 4), 2).unwrap(),
            AnyLayer::flatten(Shape3::new(2, 2, 2)),
            AnyLayer::fully_connected(Shape3::new(1, 1, 8), 1).unwrap(),
            AnyLayer::activation(Shape3::new(1, 1, 1), Activation::Sigmoid),
        ])
        .unwrap();
        randomize(&mut net, &mut rng);
        let data = samples(&mut rng);
        let check = gradient_check(&mut net, &data, 1e-2).unwrap();
        assert_eq!(check.analytic.len(), 2 * 10 + 9);
        assert_close(&check);
    }

    #[test]
    fn strided_conv_chain() {
        let mut rng = ChaChaRng::seed_from_u64(32);
        let input = Shape3::new(1, 4, 4);
        let mut net = Network::new(vec![
            AnyLayer::conv(input, Shape2::new(2, 2), 3, 2, (0, 0)).unwrap(),
            AnyLayer::activation(Shape3::new(3, 2, 2), Activation::Softplus),
            AnyLayer::conv(Shape3::new(3, 2, 2), Shape2::new(3, 3), 2, 1, (1, 1)).unwrap(),
            AnyLayer::activation(Shape3::new(2, 2, 2), Activation::Erf),
            AnyLayer::flatten(Shape3::new(2, 2, 2)),
            AnyLayer::fully_connected(Shape3::new(1, 1, 8), 1).unwrap(),
        ])
        .unwrap();
        randomize(&mut net, &mut rng);
        let data = samples(&mut rng);
        let check = gradient_check(&mut net, &data, 1e-2).unwrap();
        assert_close(&check);
    }

    #[test]
    fn backprop_averages_over_samples() {
        let mut rng = ChaChaRng::seed_from_u64(33);
        let mut net = Network::new(vec![AnyLayer::fully_connected(Shape3::new(1, 4, 4), 1).unwrap()]).unwrap();
        randomize(&mut net, &mut rng);
        let data = samples(&mut rng);
        let (loss, mean) = backprop_gradient(&mut net, &data).unwrap();
        let mut sum = vec![0.0f32; mean.len()];
        let mut loss_sum = 0.0;
        for sample in &data {
            let (l, g) = backprop_gradient(&mut net, std::slice::from_ref(sample)).unwrap();
            loss_sum += l;
            sum.iter_mut().zip(g).for_each(|(s, v)| *s += v);
        }
        assert!((loss - loss_sum / 4.0).abs() < 1e-9);
        for (m, s) in mean.iter().zip(sum) {
            assert!((m - s / 4.0).abs() < 1e-5);
        }
    }

    #[test]
    fn empty_batch_rejected() {
        let mut net = Network::new(vec![AnyLayer::flatten(Shape3::new(1, 2, 2))]).unwrap();
        assert_eq!(backprop_gradient(&mut net, &[]).unwrap_err(), TrainingError::EmptyDataset);
        assert_eq!(numerical_gradient(&net, &[], 1e-3).unwrap_err(), TrainingError::EmptyDataset);
    }

    #[test]
    fn relative_error_floor() {
        assert_eq!(relative_error(1.0, 1.0), 0.0);
        assert!((relative_error(2.0, 1.0) - 0.5).abs() < 1e-7);
        assert!(relative_error(1e-6, -1e-6) < 1e-3);
    }
}
