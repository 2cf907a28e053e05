use crate::error::{check_param_count, check_shape, TensorError, TensorResult};
use crate::malgebra::{shape::Shape3, tensor::Tensor3};
use crate::traits::Layer;

pub mod pooling;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum PoolMethod {
    Max,
    Average,
}

/// Down-sampling layer without parameters.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "StoredPool")]
pub struct PoolLayer {
    input: Shape3,
    output: Shape3,
    scale: usize,
    method: PoolMethod,
    #[serde(skip)]
    last_input: Option<Tensor3>,
}

// Shared stored form; unpooling layers carry no method.
#[derive(serde::Deserialize)]
struct StoredPool {
    input: Shape3,
    output: Shape3,
    scale: usize,
    method: Option<PoolMethod>,
}

impl TryFrom<StoredPool> for PoolLayer {
    type Error = TensorError;
    fn try_from(stored: StoredPool) -> Result<Self, Self::Error> {
        let method = stored
            .method
            .ok_or_else(|| TensorError::Serialization("pooling layer without method".to_string()))?;
        let layer = PoolLayer::new(stored.input, stored.scale, method)?;
        check_shape("stored pooling output", layer.output, stored.output)?;
        Ok(layer)
    }
}

impl TryFrom<StoredPool> for UnpoolLayer {
    type Error = TensorError;
    fn try_from(stored: StoredPool) -> Result<Self, Self::Error> {
        let layer = UnpoolLayer::new(stored.input, stored.scale)?;
        check_shape("stored unpooling output", layer.output, stored.output)?;
        Ok(layer)
    }
}

impl PoolLayer {
    pub fn new(input: Shape3, scale: usize, method: PoolMethod) -> TensorResult<Self> {
        let output = pooling::pooled_shape(scale, input)?;
        Ok(Self { input, output, scale, method, last_input: None })
    }
    pub fn scale(&self) -> usize {
        self.scale
    }
    pub fn method(&self) -> PoolMethod {
        self.method
    }
}

impl Layer for PoolLayer {
    fn name(&self) -> &'static str {
        match self.method {
            PoolMethod::Max => "max-pool",
            PoolMethod::Average => "avg-pool",
        }
    }
    fn input_shape(&self) -> Shape3 {
        self.input
    }
    fn output_shape(&self) -> Shape3 {
        self.output
    }
    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        check_shape("pooling input", self.input, input.shape())?;
        let out = match self.method {
            PoolMethod::Max => pooling::pool_max(self.scale, input)?,
            PoolMethod::Average => pooling::pool_avg(self.scale, input)?,
        };
        self.last_input = Some(input.clone());
        Ok(out)
    }
    fn backward(&self, output_error: &Tensor3, _gradient: &mut Vec<f32>) -> TensorResult<Tensor3> {
        check_shape("pooling output error", self.output, output_error.shape())?;
        match self.method {
            PoolMethod::Average => {
                let area = (self.scale * self.scale) as f32;
                pooling::unpool(self.scale, &output_error.map(|e| e / area))
            }
            PoolMethod::Max => {
                let last_input = self
                    .last_input
                    .as_ref()
                    .ok_or(TensorError::BackwardBeforeForward("max-pool"))?;
                let winners = pooling::max_positions(self.scale, last_input)?;
                let mut routed = vec![0.0; self.input.volume()];
                for (pos, e) in winners.into_iter().zip(output_error.values()) {
                    routed[pos] += e;
                }
                Tensor3::from_values(self.input, routed)
            }
        }
    }
    fn param_count(&self) -> usize {
        0
    }
    fn get_params(&self) -> Vec<f32> {
        Vec::new()
    }
    fn set_params(&mut self, params: &[f32]) -> TensorResult<()> {
        check_param_count(0, params.len())
    }
}

/// Nearest-neighbour up-sampling layer.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "StoredPool")]
pub struct UnpoolLayer {
    input: Shape3,
    output: Shape3,
    scale: usize,
}

impl UnpoolLayer {
    pub fn new(input: Shape3, scale: usize) -> TensorResult<Self> {
        let output = pooling::unpooled_shape(scale, input)?;
        Ok(Self { input, output, scale })
    }
}

impl Layer for UnpoolLayer {
    fn name(&self) -> &'static str {
        "unpool"
    }
    fn input_shape(&self) -> Shape3 {
        self.input
    }
    fn output_shape(&self) -> Shape3 {
        self.output
    }
    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        check_shape("unpooling input", self.input, input.shape())?;
        pooling::unpool(self.scale, input)
    }
    fn backward(&self, output_error: &Tensor3, _gradient: &mut Vec<f32>) -> TensorResult<Tensor3> {
        check_shape("unpooling output error", self.output, output_error.shape())?;
        pooling::block_sum(self.scale, output_error)
    }
    fn param_count(&self) -> usize {
        0
    }
    fn get_params(&self) -> Vec<f32> {
        Vec::new()
    }
    fn set_params(&mut self, params: &[f32]) -> TensorResult<()> {
        check_param_count(0, params.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(shape: Shape3, values: &[f32]) -> Tensor3 {
        Tensor3::from_values(shape, values.to_vec()).unwrap()
    }

    #[test]
    fn max_pool_routes_error_to_winner() {
        let mut layer = PoolLayer::new(Shape3::new(1, 2, 4), 2, PoolMethod::Max).unwrap();
        let input = tensor(Shape3::new(1, 2, 4), &[1.0, 3.0, -1.0, -2.0, 3.0, 0.0, -4.0, -1.5]);
        let out = layer.forward(&input).unwrap();
        assert_eq!(out.values(), &[3.0, -1.0]);

        let mut gradient = Vec::new();
        let back = layer.backward(&tensor(Shape3::new(1, 1, 2), &[10.0, 20.0]), &mut gradient).unwrap();
        assert_eq!(back.values(), &[0.0, 10.0, 20.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(gradient.is_empty());
    }

    #[test]
    fn max_pool_backward_needs_forward() {
        let layer = PoolLayer::new(Shape3::new(1, 2, 2), 2, PoolMethod::Max).unwrap();
        let result = layer.backward(&Tensor3::zeros(Shape3::new(1, 1, 1)), &mut Vec::new());
        assert_eq!(result, Err(TensorError::BackwardBeforeForward("max-pool")));
    }

    #[test]
    fn average_pool_spreads_error() {
        let layer = PoolLayer::new(Shape3::new(1, 2, 2), 2, PoolMethod::Average).unwrap();
        let back = layer.backward(&tensor(Shape3::new(1, 1, 1), &[8.0]), &mut Vec::new()).unwrap();
        assert_eq!(back.values(), &[2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn unpool_sums_error_per_block() {
        let mut layer = UnpoolLayer::new(Shape3::new(1, 1, 2), 2).unwrap();
        let up = layer.forward(&tensor(Shape3::new(1, 1, 2), &[1.0, 2.0])).unwrap();
        assert_eq!(up.values(), &[1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]);
        let back = layer.backward(&up, &mut Vec::new()).unwrap();
        assert_eq!(back.values(), &[4.0, 8.0]);
    }

    #[test]
    fn wrong_shapes_rejected() {
        assert!(PoolLayer::new(Shape3::new(1, 3, 3), 2, PoolMethod::Average).is_err());
        let mut layer = PoolLayer::new(Shape3::new(1, 4, 4), 2, PoolMethod::Average).unwrap();
        assert!(matches!(
            layer.forward(&Tensor3::zeros(Shape3::new(2, 4, 4))),
            Err(TensorError::ShapeMismatch { .. })
        ));
        assert!(layer.set_params(&[1.0]).is_err());
        assert!(layer.set_params(&[]).is_ok());
    }
}
