use rand::RngCore;

use crate::error::TensorResult;
use crate::malgebra::{shape::Shape3, tensor::Tensor3};

/// JSON persistence through tokio's async file system.
pub trait ConfigFS {
    type OutType;
    async fn save(&self, path: &str) -> TensorResult<()>;
    async fn read(path: &str) -> TensorResult<Self::OutType>;
}

/// Capability set shared by every layer of a network.
pub trait Layer {
    fn name(&self) -> &'static str;
    fn input_shape(&self) -> Shape3;
    fn output_shape(&self) -> Shape3;

    /// Validates the input shape, remembers the input for [`Layer::backward`]
    /// and returns a freshly allocated output of [`Layer::output_shape`].
    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3>;

    /// Maps the error at the output to the error at the input.
    ///
    /// The layer's own parameter gradient, if any, is appended to `gradient`
    /// in the order of [`Layer::get_params`].
    fn backward(&self, output_error: &Tensor3, gradient: &mut Vec<f32>) -> TensorResult<Tensor3>;

    fn param_count(&self) -> usize;
    fn get_params(&self) -> Vec<f32>;
    /// Fails without touching the layer if `params.len() != param_count()`.
    fn set_params(&mut self, params: &[f32]) -> TensorResult<()>;

    /// Draws fresh parameters; layers without parameters do nothing.
    fn random_init_params(&mut self, _rng: &mut dyn RngCore) -> TensorResult<()> {
        Ok(())
    }
}
