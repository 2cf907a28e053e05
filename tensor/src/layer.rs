use rand::RngCore;

use crate::activation::{Activation, ActivationLayer};
use crate::conv::ConvLayer;
use crate::dense::FullyConnected;
use crate::error::TensorResult;
use crate::malgebra::{shape::{Shape2, Shape3}, tensor::Tensor3};
use crate::network::Network;
use crate::pool::{PoolLayer, PoolMethod, UnpoolLayer};
use crate::reshape::{Flatten, Identity, Input};
use crate::traits::Layer;

/// Closed set of layer kinds a [`Network`] is built from.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(tag = "layer", rename_all = "kebab-case")]
pub enum AnyLayer {
    Input(Input),
    Conv(ConvLayer),
    Pool(PoolLayer),
    Unpool(UnpoolLayer),
    Activation(ActivationLayer),
    FullyConnected(FullyConnected),
    Flatten(Flatten),
    Identity(Identity),
    Network(Network),
}

macro_rules! dispatch {
    ($self:expr, $layer:ident => $body:expr) => {
        match $self {
            AnyLayer::Input($layer) => $body,
            AnyLayer::Conv($layer) => $body,
            AnyLayer::Pool($layer) => $body,
            AnyLayer::Unpool($layer) => $body,
            AnyLayer::Activation($layer) => $body,
            AnyLayer::FullyConnected($layer) => $body,
            AnyLayer::Flatten($layer) => $body,
            AnyLayer::Identity($layer) => $body,
            AnyLayer::Network($layer) => $body,
        }
    };
}

impl AnyLayer {
    pub fn input(shape: Shape3) -> Self {
        AnyLayer::Input(Input::new(shape))
    }
    pub fn conv(input: Shape3, window: Shape2, features: usize, stride: usize, padding: (usize, usize)) -> TensorResult<Self> {
        Ok(AnyLayer::Conv(ConvLayer::new(input, window, features, stride, padding)?))
    }
    pub fn max_pool(input: Shape3, scale: usize) -> TensorResult<Self> {
        Ok(AnyLayer::Pool(PoolLayer::new(input, scale, PoolMethod::Max)?))
    }
    pub fn avg_pool(input: Shape3, scale: usize) -> TensorResult<Self> {
        Ok(AnyLayer::Pool(PoolLayer::new(input, scale, PoolMethod::Average)?))
    }
    pub fn unpool(input: Shape3, scale: usize) -> TensorResult<Self> {
        Ok(AnyLayer::Unpool(UnpoolLayer::new(input, scale)?))
    }
    pub fn activation(shape: Shape3, function: Activation) -> Self {
        AnyLayer::Activation(ActivationLayer::new(shape, function))
    }
    pub fn fully_connected(input: Shape3, outputs: usize) -> TensorResult<Self> {
        Ok(AnyLayer::FullyConnected(FullyConnected::new(input, outputs)?))
    }
    pub fn flatten(input: Shape3) -> Self {
        AnyLayer::Flatten(Flatten::new(input))
    }
    pub fn identity(shape: Shape3) -> Self {
        AnyLayer::Identity(Identity::new(shape))
    }
}

impl Layer for AnyLayer {
    fn name(&self) -> &'static str {
        dispatch!(self, l => l.name())
    }
    fn input_shape(&self) -> Shape3 {
        dispatch!(self, l => l.input_shape())
    }
    fn output_shape(&self) -> Shape3 {
        dispatch!(self, l => l.output_shape())
    }
    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        dispatch!(self, l => l.forward(input))
    }
    fn backward(&self, output_error: &Tensor3, gradient: &mut Vec<f32>) -> TensorResult<Tensor3> {
        dispatch!(self, l => l.backward(output_error, gradient))
    }
    fn param_count(&self) -> usize {
        dispatch!(self, l => l.param_count())
    }
    fn get_params(&self) -> Vec<f32> {
        dispatch!(self, l => l.get_params())
    }
    fn set_params(&mut self, params: &[f32]) -> TensorResult<()> {
        dispatch!(self, l => l.set_params(params))
    }
    fn random_init_params(&mut self, rng: &mut dyn RngCore) -> TensorResult<()> {
        dispatch!(self, l => l.random_init_params(rng))
    }
}
