//! Layers that move values around without computing anything.

use crate::error::{check_param_count, check_shape, TensorResult};
use crate::malgebra::{shape::Shape3, tensor::Tensor3};
use crate::traits::Layer;

macro_rules! no_params {
    () => {
        fn param_count(&self) -> usize {
            0
        }
        fn get_params(&self) -> Vec<f32> {
            Vec::new()
        }
        fn set_params(&mut self, params: &[f32]) -> TensorResult<()> {
            check_param_count(0, params.len())
        }
    };
}

/// `(D, H, W)` to `(1, 1, D*H*W)`.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct Flatten {
    input: Shape3,
}

impl Flatten {
    pub fn new(input: Shape3) -> Self {
        Self { input }
    }
}

impl Layer for Flatten {
    fn name(&self) -> &'static str {
        "flatten"
    }
    fn input_shape(&self) -> Shape3 {
        self.input
    }
    fn output_shape(&self) -> Shape3 {
        Shape3::new(1, 1, self.input.volume())
    }
    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        check_shape("flatten input", self.input, input.shape())?;
        input.reshape(self.output_shape())
    }
    fn backward(&self, output_error: &Tensor3, _gradient: &mut Vec<f32>) -> TensorResult<Tensor3> {
        check_shape("flatten output error", self.output_shape(), output_error.shape())?;
        output_error.reshape(self.input)
    }
    no_params!();
}

/// Passthrough; also stands in for dropout at inference time.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct Identity {
    shape: Shape3,
}

impl Identity {
    pub fn new(shape: Shape3) -> Self {
        Self { shape }
    }
}

impl Layer for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }
    fn input_shape(&self) -> Shape3 {
        self.shape
    }
    fn output_shape(&self) -> Shape3 {
        self.shape
    }
    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        check_shape("identity input", self.shape, input.shape())?;
        Ok(input.clone())
    }
    fn backward(&self, output_error: &Tensor3, _gradient: &mut Vec<f32>) -> TensorResult<Tensor3> {
        check_shape("identity output error", self.shape, output_error.shape())?;
        Ok(output_error.clone())
    }
    no_params!();
}

/// Boundary layer at the head of a network: only checks the shape.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct Input {
    shape: Shape3,
}

impl Input {
    pub fn new(shape: Shape3) -> Self {
        Self { shape }
    }
}

impl Layer for Input {
    fn name(&self) -> &'static str {
        "input"
    }
    fn input_shape(&self) -> Shape3 {
        self.shape
    }
    fn output_shape(&self) -> Shape3 {
        self.shape
    }
    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        check_shape("network input", self.shape, input.shape())?;
        Ok(input.clone())
    }
    fn backward(&self, output_error: &Tensor3, _gradient: &mut Vec<f32>) -> TensorResult<Tensor3> {
        check_shape("network input error", self.shape, output_error.shape())?;
        Ok(output_error.clone())
    }
    no_params!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TensorError;

    #[test]
    fn flatten_and_back() {
        let shape = Shape3::new(2, 2, 3);
        let mut layer = Flatten::new(shape);
        let x = Tensor3::from_values(shape, (0..12).map(|v| v as f32).collect()).unwrap();
        let flat = layer.forward(&x).unwrap();
        assert_eq!(flat.shape(), Shape3::new(1, 1, 12));
        assert_eq!(flat.values(), x.values());
        assert_eq!(layer.backward(&flat, &mut Vec::new()).unwrap(), x);
    }

    #[test]
    fn input_checks_shape() {
        let mut layer = Input::new(Shape3::new(1, 2, 2));
        assert!(matches!(
            layer.forward(&Tensor3::zeros(Shape3::new(1, 2, 3))),
            Err(TensorError::ShapeMismatch { context: "network input", .. })
        ));
        let mut identity = Identity::new(Shape3::new(1, 2, 2));
        let x = Tensor3::from_values(Shape3::new(1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(identity.forward(&x).unwrap(), x);
        assert!(identity.set_params(&[0.0]).is_err());
    }
}
