use rand::RngCore;
use tracing::debug;

use crate::conv::fs::{read_json, write_json};
use crate::error::{check_param_count, check_shape, TensorError, TensorResult};
use crate::layer::AnyLayer;
use crate::malgebra::{shape::Shape3, tensor::Tensor3};
use crate::traits::{ConfigFS, Layer};

/// Ordered chain of layers where each output shape feeds the next input.
///
/// The flat parameter vector is the concatenation of every layer's
/// [`Layer::get_params`] in forward order; [`Network::backward_pass`]
/// produces its gradient in the same layout.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "StoredNetwork")]
pub struct Network {
    layers: Vec<AnyLayer>,
}

#[derive(serde::Deserialize)]
struct StoredNetwork {
    layers: Vec<AnyLayer>,
}

impl TryFrom<StoredNetwork> for Network {
    type Error = TensorError;
    fn try_from(stored: StoredNetwork) -> Result<Self, Self::Error> {
        Network::new(stored.layers)
    }
}

impl Network {
    pub fn new(layers: Vec<AnyLayer>) -> TensorResult<Self> {
        if layers.is_empty() {
            return Err(TensorError::InvalidGeometry("network needs at least one layer".to_string()));
        }
        for pair in layers.windows(2) {
            check_shape("layer chain", pair[0].output_shape(), pair[1].input_shape())?;
        }
        for (idx, layer) in layers.iter().enumerate() {
            debug!(
                "layer {} {}: {} -> {}, {} params",
                idx,
                layer.name(),
                layer.input_shape(),
                layer.output_shape(),
                layer.param_count()
            );
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[AnyLayer] {
        &self.layers
    }
    pub fn len(&self) -> usize {
        self.layers.len()
    }
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Runs every layer in order; each one keeps its input for the backward pass.
    pub fn forward_pass(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        let mut current = input.clone();
        for layer in self.layers.iter_mut() {
            current = layer.forward(&current)?;
        }
        Ok(current)
    }

    /// Pushes `output_error` back through the chain.
    ///
    /// Returns the error at the network input and the flat parameter
    /// gradient, laid out like [`Layer::get_params`].
    pub fn backward_pass(&self, output_error: &Tensor3) -> TensorResult<(Tensor3, Vec<f32>)> {
        let mut per_layer = Vec::with_capacity(self.layers.len());
        let mut current = output_error.clone();
        for layer in self.layers.iter().rev() {
            let mut gradient = Vec::with_capacity(layer.param_count());
            current = layer.backward(&current, &mut gradient)?;
            per_layer.push(gradient);
        }
        // Collected last layer first.
        per_layer.reverse();
        Ok((current, per_layer.concat()))
    }
}

impl Layer for Network {
    fn name(&self) -> &'static str {
        "network"
    }
    fn input_shape(&self) -> Shape3 {
        self.layers.first().map(|l| l.input_shape()).unwrap_or(Shape3::new(0, 0, 0))
    }
    fn output_shape(&self) -> Shape3 {
        self.layers.last().map(|l| l.output_shape()).unwrap_or(Shape3::new(0, 0, 0))
    }
    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        self.forward_pass(input)
    }
    fn backward(&self, output_error: &Tensor3, gradient: &mut Vec<f32>) -> TensorResult<Tensor3> {
        let (input_error, own) = self.backward_pass(output_error)?;
        gradient.extend(own);
        Ok(input_error)
    }
    fn param_count(&self) -> usize {
        self.layers.iter().map(|l| l.param_count()).sum()
    }
    fn get_params(&self) -> Vec<f32> {
        self.layers.iter().flat_map(|l| l.get_params()).collect()
    }
    fn set_params(&mut self, params: &[f32]) -> TensorResult<()> {
        check_param_count(self.param_count(), params.len())?;
        let mut offset = 0;
        for layer in self.layers.iter_mut() {
            let count = layer.param_count();
            layer.set_params(&params[offset..offset + count])?;
            offset += count;
        }
        Ok(())
    }
    fn random_init_params(&mut self, rng: &mut dyn RngCore) -> TensorResult<()> {
        for layer in self.layers.iter_mut() {
            layer.random_init_params(rng)?;
        }
        Ok(())
    }
}

impl ConfigFS for Network {
    type OutType = Self;
    async fn read(path: &str) -> TensorResult<Self::OutType> {
        read_json(path).await
    }
    async fn save(&self, path: &str) -> TensorResult<()> {
        write_json(self, path).await
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaChaRng;

    use super::*;
    use crate::activation::Activation;
    use crate::malgebra::shape::Shape2;

    fn small_net() -> Network {
        let input = Shape3::new(1, 4, 4);
        Network::new(vec![
            AnyLayer::input(input),
            AnyLayer::conv(input, Shape2::new(3, 3), 2, 1, (1, 1)).unwrap(),
            AnyLayer::activation(Shape3::new(2, 4, 4), Activation::Tanh),
            AnyLayer::max_pool(Shape3::new(2, 4, 4), 2).unwrap(),
            AnyLayer::flatten(Shape3::new(2, 2, 2)),
            AnyLayer::fully_connected(Shape3::new(1, 1, 8), 3).unwrap(),
        ])
        .unwrap()
    }

    fn random_input(rng: &mut ChaChaRng) -> Tensor3 {
        Tensor3::from_values(Shape3::new(1, 4, 4), (0..16).map(|_| rng.random_range(-1.0..1.0)).collect()).unwrap()
    }

    #[test]
    fn chain_shapes_checked() {
        let result = Network::new(vec![
            AnyLayer::input(Shape3::new(1, 4, 4)),
            AnyLayer::flatten(Shape3::new(1, 4, 5)),
        ]);
        assert!(matches!(result, Err(TensorError::ShapeMismatch { context: "layer chain", .. })));
        assert!(Network::new(Vec::new()).is_err());
    }

    #[test]
    fn gradient_layout_matches_params() {
        let mut rng = ChaChaRng::seed_from_u64(4);
        let mut net = small_net();
        net.random_init_params(&mut rng).unwrap();
        assert_eq!(net.param_count(), 2 * 10 + 9 * 3);

        let x = random_input(&mut rng);
        let y = net.forward_pass(&x).unwrap();
        assert_eq!(y.shape(), Shape3::new(1, 1, 3));
        let (dx, gradient) = net.backward_pass(&y).unwrap();
        assert_eq!(dx.shape(), Shape3::new(1, 4, 4));
        assert_eq!(gradient.len(), net.param_count());

        // The dense layer sits last, so its gradient is the tail of the vector.
        let mut dense_gradient = Vec::new();
        let AnyLayer::FullyConnected(dense) = &net.layers()[5] else {
            panic!("expected the dense layer");
        };
        dense.backward(&y, &mut dense_gradient).unwrap();
        assert_eq!(&gradient[20..], dense_gradient.as_slice());
    }

    #[test]
    fn set_params_is_idempotent_and_atomic() {
        let mut rng = ChaChaRng::seed_from_u64(8);
        let mut net = small_net();
        net.random_init_params(&mut rng).unwrap();
        let x = random_input(&mut rng);
        let before = net.forward_pass(&x).unwrap();
        let params = net.get_params();
        net.set_params(&params).unwrap();
        assert_eq!(net.forward_pass(&x).unwrap(), before);

        let short = vec![0.0; params.len() - 1];
        assert!(net.set_params(&short).is_err());
        assert_eq!(net.get_params(), params);
    }

    #[test]
    fn nested_network_is_a_layer() {
        let mut rng = ChaChaRng::seed_from_u64(12);
        let mut inner = small_net();
        inner.random_init_params(&mut rng).unwrap();
        let x = random_input(&mut rng);
        let expected = inner.forward_pass(&x).unwrap();
        let mut outer = Network::new(vec![
            AnyLayer::Network(inner),
            AnyLayer::activation(Shape3::new(1, 1, 3), Activation::Sigmoid),
        ])
        .unwrap();
        let out = outer.forward_pass(&x).unwrap();
        assert_eq!(out, expected.map(|v| Activation::Sigmoid.apply(v)));
        assert_eq!(outer.param_count(), 47);
    }

    #[tokio::test]
    async fn network_read_write_test() {
        let mut rng = ChaChaRng::seed_from_u64(21);
        let mut net = small_net();
        net.random_init_params(&mut rng).unwrap();
        let path = std::env::temp_dir().join(format!("network_{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();

        net.save(&path).await.unwrap();
        let mut restored = Network::read(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(restored.get_params(), net.get_params());
        let x = random_input(&mut rng);
        assert_eq!(restored.forward_pass(&x).unwrap(), net.forward_pass(&x).unwrap());
    }

    #[test]
    fn broken_chain_rejected_on_load() {
        let net = small_net();
        let mut json = serde_json::to_value(&net).unwrap();
        let layers = json["layers"].as_array_mut().unwrap();
        layers.remove(4);
        assert!(serde_json::from_value::<Network>(json).is_err());
    }
}
