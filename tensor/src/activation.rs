//! Element-wise activation layers.
//!
//! Every function except softmax maps one value to one value, and its
//! backward pass multiplies the incoming error by the derivative evaluated at
//! the stored input. At a branch boundary the derivative takes the branch the
//! forward formula takes.

use crate::error::{check_param_count, check_shape, TensorError, TensorResult};
use crate::malgebra::{shape::Shape3, tensor::Tensor3};
use crate::traits::Layer;

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;
const TWO_OVER_SQRT_PI: f32 = std::f32::consts::FRAC_2_SQRT_PI;

#[derive(Clone, Copy, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Activation {
    Relu,
    LeakyRelu { alpha: f32 },
    Sigmoid,
    Tanh,
    Elu { alpha: f32 },
    Selu,
    HardSigmoid,
    Erf,
    Softplus,
    FastSigmoid,
    /// Normalised exponential over every value of the tensor.
    Softmax,
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl Activation {
    pub fn name(&self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::LeakyRelu { .. } => "leaky-relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::Elu { .. } => "elu",
            Activation::Selu => "selu",
            Activation::HardSigmoid => "hard-sigmoid",
            Activation::Erf => "erf",
            Activation::Softplus => "softplus",
            Activation::FastSigmoid => "fast-sigmoid",
            Activation::Softmax => "softmax",
        }
    }

    /// φ(x). Softmax has no scalar form and passes the value through.
    pub fn apply(&self, x: f32) -> f32 {
        match *self {
            Activation::Relu => x.max(0.0),
            Activation::LeakyRelu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::Elu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x.exp_m1()
                }
            }
            Activation::Selu => {
                if x >= 0.0 {
                    SELU_SCALE * x
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp_m1()
                }
            }
            Activation::HardSigmoid => (0.2 * x + 0.5).clamp(0.0, 1.0),
            Activation::Erf => libm::erff(x),
            Activation::Softplus => x.max(0.0) + (-x.abs()).exp().ln_1p(),
            Activation::FastSigmoid => x / (1.0 + x.abs()),
            Activation::Softmax => x,
        }
    }

    /// φ'(x).
    pub fn derivative(&self, x: f32) -> f32 {
        match *self {
            Activation::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::LeakyRelu { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha
                }
            }
            Activation::Sigmoid => {
                let s = sigmoid(x);
                s * (1.0 - s)
            }
            Activation::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            Activation::Elu { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha * x.exp()
                }
            }
            Activation::Selu => {
                if x >= 0.0 {
                    SELU_SCALE
                } else {
                    SELU_SCALE * SELU_ALPHA * x.exp()
                }
            }
            Activation::HardSigmoid => {
                if x > -2.5 && x < 2.5 {
                    0.2
                } else {
                    0.0
                }
            }
            Activation::Erf => TWO_OVER_SQRT_PI * (-x * x).exp(),
            Activation::Softplus => sigmoid(x),
            Activation::FastSigmoid => {
                let d = 1.0 + x.abs();
                1.0 / (d * d)
            }
            Activation::Softmax => 1.0,
        }
    }
}

/// Max-shifted softmax over all values.
pub fn softmax(input: &Tensor3) -> Tensor3 {
    let max = input.values().iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps = input.map(|v| (v - max).exp());
    let total = exps.sum();
    exps.map(|v| v / total)
}

#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
pub struct ActivationLayer {
    shape: Shape3,
    function: Activation,
    #[serde(skip)]
    last_input: Option<Tensor3>,
}

impl ActivationLayer {
    pub fn new(shape: Shape3, function: Activation) -> Self {
        Self { shape, function, last_input: None }
    }
    pub fn function(&self) -> Activation {
        self.function
    }
}

impl Layer for ActivationLayer {
    fn name(&self) -> &'static str {
        self.function.name()
    }
    fn input_shape(&self) -> Shape3 {
        self.shape
    }
    fn output_shape(&self) -> Shape3 {
        self.shape
    }
    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        check_shape("activation input", self.shape, input.shape())?;
        let out = match self.function {
            Activation::Softmax => softmax(input),
            f => input.map(|x| f.apply(x)),
        };
        self.last_input = Some(input.clone());
        Ok(out)
    }
    fn backward(&self, output_error: &Tensor3, _gradient: &mut Vec<f32>) -> TensorResult<Tensor3> {
        check_shape("activation output error", self.shape, output_error.shape())?;
        let last_input = self
            .last_input
            .as_ref()
            .ok_or(TensorError::BackwardBeforeForward(self.function.name()))?;
        match self.function {
            Activation::Softmax => {
                let s = softmax(last_input);
                let dot: f32 = s.values().iter().zip(output_error.values()).map(|(a, b)| a * b).sum();
                s.zip_map(output_error, |si, ei| si * (ei - dot))
            }
            f => output_error.zip_map(last_input, |e, x| e * f.derivative(x)),
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

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Activation; 11] = [
        Activation::Relu,
        Activation::LeakyRelu { alpha: 0.1 },
        Activation::Sigmoid,
        Activation::Tanh,
        Activation::Elu { alpha: 1.0 },
        Activation::Selu,
        Activation::HardSigmoid,
        Activation::Erf,
        Activation::Softplus,
        Activation::FastSigmoid,
        Activation::Softmax,
    ];

    #[test]
    fn derivatives_match_differences() {
        let delta = 1e-3f32;
        for f in ALL.iter().filter(|f| **f != Activation::Softmax) {
            for x in [-3.1f32, -1.3, -0.4, 0.35, 0.9, 2.2, 3.7] {
                let numeric = (f.apply(x + delta) - f.apply(x - delta)) / (2.0 * delta);
                let analytic = f.derivative(x);
                assert!((numeric - analytic).abs() < 1e-2, "{} at {}: {} vs {}", f.name(), x, numeric, analytic);
            }
        }
    }

    #[test]
    fn boundary_takes_forward_branch() {
        assert_eq!(Activation::Relu.derivative(0.0), 0.0);
        assert_eq!(Activation::LeakyRelu { alpha: 0.2 }.derivative(0.0), 0.2);
        assert_eq!(Activation::Elu { alpha: 0.5 }.derivative(0.0), 0.5);
        assert_eq!(Activation::Selu.derivative(0.0), SELU_SCALE);
        assert_eq!(Activation::HardSigmoid.derivative(2.5), 0.0);
    }

    #[test]
    fn known_values() {
        assert_eq!(Activation::Relu.apply(-2.0), 0.0);
        assert_eq!(Activation::LeakyRelu { alpha: 0.1 }.apply(-2.0), -0.2);
        assert_eq!(Activation::Sigmoid.apply(0.0), 0.5);
        assert_eq!(Activation::HardSigmoid.apply(10.0), 1.0);
        assert_eq!(Activation::HardSigmoid.apply(0.0), 0.5);
        assert_eq!(Activation::FastSigmoid.apply(1.0), 0.5);
        assert!((Activation::Erf.apply(1.0) - 0.842_700_8).abs() < 1e-6);
        assert!((Activation::Softplus.apply(0.0) - std::f32::consts::LN_2).abs() < 1e-6);
        assert!(Activation::Softplus.apply(100.0).is_finite());
    }

    #[test]
    fn layer_backward_uses_stored_input() {
        let shape = Shape3::new(1, 1, 3);
        let mut layer = ActivationLayer::new(shape, Activation::Relu);
        layer.forward(&Tensor3::from_values(shape, vec![-1.0, 0.0, 2.0]).unwrap()).unwrap();
        let back = layer.backward(&Tensor3::from_values(shape, vec![5.0, 5.0, 5.0]).unwrap(), &mut Vec::new()).unwrap();
        assert_eq!(back.values(), &[0.0, 0.0, 5.0]);
    }

    #[test]
    fn softmax_sums_to_one_and_backprops() {
        let shape = Shape3::new(1, 1, 3);
        let x = Tensor3::from_values(shape, vec![1.0, 2.0, 1000.0]).unwrap();
        let s = softmax(&x);
        assert!((s.sum() - 1.0).abs() < 1e-6);
        assert!(s.values().iter().all(|v| v.is_finite()));

        let x = Tensor3::from_values(shape, vec![0.3, -0.2, 0.5]).unwrap();
        let e = Tensor3::from_values(shape, vec![1.0, -2.0, 0.5]).unwrap();
        let mut layer = ActivationLayer::new(shape, Activation::Softmax);
        layer.forward(&x).unwrap();
        let back = layer.backward(&e, &mut Vec::new()).unwrap();
        let loss = |v: &[f32]| -> f32 {
            let t = Tensor3::from_values(shape, v.to_vec()).unwrap();
            softmax(&t).values().iter().zip(e.values()).map(|(a, b)| a * b).sum()
        };
        for i in 0..3 {
            let mut plus = x.values().to_vec();
            plus[i] += 1e-3;
            let mut minus = x.values().to_vec();
            minus[i] -= 1e-3;
            let numeric = (loss(&plus) - loss(&minus)) / 2e-3;
            assert!((numeric - back.values()[i]).abs() < 1e-2);
        }
    }

    #[test]
    fn serde_tagged_kind() {
        let json = serde_json::to_string(&Activation::LeakyRelu { alpha: 0.5 }).unwrap();
        assert_eq!(json, r#"{"kind":"leaky-relu","alpha":0.5}"#);
        let back: Activation = serde_json::from_str(r#"{"kind":"hard-sigmoid"}"#).unwrap();
        assert_eq!(back, Activation::HardSigmoid);
    }
}
