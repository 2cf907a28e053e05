use rand::RngCore;
use rand_distr::{Distribution, Normal};

use crate::error::{check_param_count, check_shape, TensorError, TensorResult};
use crate::malgebra::{shape::Shape3, tensor::Tensor3};
use crate::traits::Layer;

/// Fully-connected layer with the bias folded into the weight matrix.
///
/// The input is read as a flat vector `x` of `n_in` values and extended with
/// a constant 1. The output is `(1, 1, n_out)` with `y[o] = sum_i x~[i] * W[i, o]`,
/// where `W` is `(n_in + 1) x n_out`, row-major, bias row last.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "StoredFullyConnected")]
pub struct FullyConnected {
    input: Shape3,
    outputs: usize,
    weights: Vec<f32>,
    #[serde(skip)]
    last_input: Option<Tensor3>,
}

#[derive(serde::Deserialize)]
struct StoredFullyConnected {
    input: Shape3,
    outputs: usize,
    weights: Vec<f32>,
}

impl TryFrom<StoredFullyConnected> for FullyConnected {
    type Error = TensorError;
    fn try_from(stored: StoredFullyConnected) -> Result<Self, Self::Error> {
        let mut layer = FullyConnected::new(stored.input, stored.outputs)?;
        layer.set_params(&stored.weights)?;
        Ok(layer)
    }
}

impl FullyConnected {
    pub fn new(input: Shape3, outputs: usize) -> TensorResult<Self> {
        if outputs == 0 || input.volume() == 0 {
            return Err(TensorError::InvalidGeometry(format!(
                "dense layer from {} to {} outputs",
                input, outputs
            )));
        }
        Ok(Self {
            input,
            outputs,
            weights: vec![0.0; (input.volume() + 1) * outputs],
            last_input: None,
        })
    }

    pub fn inputs(&self) -> usize {
        self.input.volume()
    }
    pub fn outputs(&self) -> usize {
        self.outputs
    }

    #[inline(always)]
    fn weight(&self, i: usize, o: usize) -> f32 {
        self.weights[i * self.outputs + o]
    }
}

impl Layer for FullyConnected {
    fn name(&self) -> &'static str {
        "fully-connected"
    }
    fn input_shape(&self) -> Shape3 {
        self.input
    }
    fn output_shape(&self) -> Shape3 {
        Shape3::new(1, 1, self.outputs)
    }

    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        check_shape("dense input", self.input, input.shape())?;
        let n_in = self.inputs();
        let mut out: Vec<f32> = self.weights[n_in * self.outputs..].to_vec();
        for (i, x) in input.values().iter().enumerate() {
            let row = &self.weights[i * self.outputs..(i + 1) * self.outputs];
            out.iter_mut().zip(row).for_each(|(acc, w)| *acc += x * w);
        }
        self.last_input = Some(input.clone());
        Tensor3::from_values(self.output_shape(), out)
    }

    fn backward(&self, output_error: &Tensor3, gradient: &mut Vec<f32>) -> TensorResult<Tensor3> {
        check_shape("dense output error", self.output_shape(), output_error.shape())?;
        let last_input = self
            .last_input
            .as_ref()
            .ok_or(TensorError::BackwardBeforeForward("fully-connected"))?;
        let e = output_error.values();

        let mut input_error = vec![0.0; self.inputs()];
        for (i, dx) in input_error.iter_mut().enumerate() {
            *dx = (0..self.outputs).map(|o| self.weight(i, o) * e[o]).sum();
        }

        gradient.reserve(self.weights.len());
        for x in last_input.values().iter().copied().chain(std::iter::once(1.0)) {
            gradient.extend(e.iter().map(|eo| x * eo));
        }
        Tensor3::from_values(self.input, input_error)
    }

    fn param_count(&self) -> usize {
        self.weights.len()
    }
    fn get_params(&self) -> Vec<f32> {
        self.weights.clone()
    }
    fn set_params(&mut self, params: &[f32]) -> TensorResult<()> {
        check_param_count(self.weights.len(), params.len())?;
        self.weights.copy_from_slice(params);
        Ok(())
    }

    /// He-normal weights over `n_in` inputs, zero bias row.
    fn random_init_params(&mut self, rng: &mut dyn RngCore) -> TensorResult<()> {
        let normal = Normal::new(0.0, (2.0 / self.inputs().max(1) as f32).sqrt())
            .map_err(|e| TensorError::InvalidGeometry(format!("he init of {}: {}", self.name(), e)))?;
        let bias_row = self.inputs() * self.outputs;
        for (idx, w) in self.weights.iter_mut().enumerate() {
            *w = if idx < bias_row { normal.sample(&mut *rng) } else { 0.0 };
        }
        Ok(())
    }
}
