use rand::RngCore;
use rand_distr::{Distribution, Normal};
use tensor::error::check_param_count;
use tensor::{Layer, Network, TensorError};
use tracing::debug;

use crate::data_type::dataset::Sample;
use crate::error::TrainingResult;
use crate::metrics::mean_loss;

/// Gradient descent with momentum and a max-norm clamp on every parameter.
#[derive(Clone, Debug)]
pub struct MomentumOptimizer {
    momentum: f32,
    max_norm: f32,
    velocity: Vec<f32>,
}

impl MomentumOptimizer {
    pub fn new(param_count: usize, momentum: f32, max_norm: f32) -> Self {
        Self { momentum, max_norm, velocity: vec![0.0; param_count] }
    }

    pub fn velocity(&self) -> &[f32] {
        &self.velocity
    }

    /// One update of `params` in place; returns how many values were clamped.
    ///
    /// `v = momentum * (v - lr * g)`, then `p += -lr * g + v`. A value pushed
    /// outside `[-max_norm, max_norm]` is pinned to the bound and its
    /// velocity reset to zero.
    pub fn step(&mut self, params: &mut [f32], gradient: &[f32], learning_rate: f32) -> TrainingResult<usize> {
        check_param_count(self.velocity.len(), params.len())?;
        check_param_count(self.velocity.len(), gradient.len())?;
        let mut clamped = 0;
        for ((p, v), g) in params.iter_mut().zip(self.velocity.iter_mut()).zip(gradient) {
            let descent = -learning_rate * g;
            *v = self.momentum * (*v + descent);
            *p += descent + *v;
            if p.abs() > self.max_norm {
                *p = p.clamp(-self.max_norm, self.max_norm);
                *v = 0.0;
                clamped += 1;
            }
        }
        if clamped > 0 {
            debug!("max-norm clamp hit {} parameters", clamped);
        }
        Ok(clamped)
    }
}

/// Random-search step: adds `N(0, stddev)` noise to every parameter and
/// keeps the change only if the mean loss over `samples` does not rise.
///
/// # Returns
/// * The mean loss of the parameters the network ends up with
pub fn random_step(network: &mut Network, samples: &[Sample], stddev: f32, rng: &mut dyn RngCore) -> TrainingResult<f64> {
    let noise = Normal::new(0.0, stddev).map_err(|e| TensorError::InvalidGeometry(format!("random step: {}", e)))?;
    let old_loss = mean_loss(network, samples)?;
    let old_params = network.get_params();
    let new_params: Vec<f32> = old_params.iter().map(|p| p + noise.sample(&mut *rng)).collect();
    network.set_params(&new_params)?;
    let new_loss = mean_loss(network, samples)?;
    if new_loss > old_loss {
        network.set_params(&old_params)?;
        return Ok(old_loss);
    }
    Ok(new_loss)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaChaRng;
    use tensor::{AnyLayer, Shape3, Tensor3};

    use super::*;
    use crate::error::TrainingError;

    fn regression_samples() -> Vec<Sample> {
        [(0.0, 1.0), (1.0, 3.0), (2.0, 5.0), (-1.0, -1.0)]
            .iter()
            .map(|(x, y)| {
                Sample::new(
                    Tensor3::from_values(Shape3::new(1, 1, 1), vec![*x]).unwrap(),
                    Tensor3::from_values(Shape3::new(1, 1, 1), vec![*y]).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn plain_step_with_momentum() {
        let mut opt = MomentumOptimizer::new(1, 0.7, 3.0);
        let mut params = [1.0];
        opt.step(&mut params, &[0.5], 0.1).unwrap();
        // v = 0.7 * (0 - 0.05), p = 1 - 0.05 - 0.035
        assert!((opt.velocity()[0] + 0.035).abs() < 1e-7);
        assert!((params[0] - 0.915).abs() < 1e-6);
        opt.step(&mut params, &[0.5], 0.1).unwrap();
        // v = 0.7 * (-0.035 - 0.05)
        assert!((opt.velocity()[0] + 0.0595).abs() < 1e-6);
    }

    #[test]
    fn clamp_pins_value_and_resets_velocity() {
        let mut opt = MomentumOptimizer::new(2, 0.7, 3.0);
        let mut params = [2.9, -2.9];
        let clamped = opt.step(&mut params, &[-1.0, 1.0], 1.0).unwrap();
        assert_eq!(clamped, 2);
        assert_eq!(params, [3.0, -3.0]);
        assert_eq!(opt.velocity(), &[0.0, 0.0]);

        // next step starts from zero velocity
        opt.step(&mut params, &[1.0, -1.0], 0.5).unwrap();
        assert!((opt.velocity()[0] + 0.35).abs() < 1e-6);
        assert!((params[0] - (3.0 - 0.5 - 0.35)).abs() < 1e-6);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let mut opt = MomentumOptimizer::new(2, 0.7, 3.0);
        let mut params = [0.0, 0.0];
        assert!(matches!(opt.step(&mut params, &[1.0], 0.1), Err(TrainingError::Tensor(_))));
        assert_eq!(params, [0.0, 0.0]);
    }

    #[test]
    fn random_steps_never_raise_the_loss() {
        let samples = regression_samples();
        let mut net = Network::new(vec![AnyLayer::fully_connected(Shape3::new(1, 1, 1), 1).unwrap()]).unwrap();
        let mut rng = ChaChaRng::seed_from_u64(5);
        let start = mean_loss(&mut net, &samples).unwrap();
        let mut previous = start;
        for _ in 0..200 {
            let loss = random_step(&mut net, &samples, 0.1, &mut rng).unwrap();
            assert!(loss <= previous, "loss rose from {} to {}", previous, loss);
            assert_eq!(mean_loss(&mut net, &samples).unwrap(), loss);
            previous = loss;
        }
        assert!(previous < start);
    }

    #[test]
    fn rejected_step_restores_params() {
        let samples = regression_samples();
        let mut net = Network::new(vec![AnyLayer::fully_connected(Shape3::new(1, 1, 1), 1).unwrap()]).unwrap();
        // y = 2x + 1 fits exactly, so every perturbation is worse
        net.set_params(&[2.0, 1.0]).unwrap();
        let mut rng = ChaChaRng::seed_from_u64(6);
        for _ in 0..10 {
            assert_eq!(random_step(&mut net, &samples, 0.1, &mut rng).unwrap(), 0.0);
            assert_eq!(net.get_params(), vec![2.0, 1.0]);
        }
    }

    #[test]
    fn negative_spread_is_an_error() {
        let mut net = Network::new(vec![AnyLayer::fully_connected(Shape3::new(1, 1, 1), 1).unwrap()]).unwrap();
        let result = random_step(&mut net, &regression_samples(), -1.0, &mut ChaChaRng::seed_from_u64(7));
        assert!(matches!(result, Err(TrainingError::Tensor(_))));
    }
}
