use rand::RngCore;
use rayon::prelude::*;

use crate::conv::convolution::{convolve, convolve_dilated_2d};
use crate::conv::filter::flip_filters_spatially;
use crate::conv::transpose::convolve_transpose_3d;
use crate::conv::ConvLayer;
use crate::error::{check_shape, TensorError, TensorResult};
use crate::malgebra::{shape::Shape3, tensor::Tensor3};
use crate::traits::Layer;

impl Layer for ConvLayer {
    fn name(&self) -> &'static str {
        "conv"
    }
    fn input_shape(&self) -> Shape3 {
        self.input
    }
    fn output_shape(&self) -> Shape3 {
        self.output
    }

    fn forward(&mut self, input: &Tensor3) -> TensorResult<Tensor3> {
        check_shape("convolution input", self.input, input.shape())?;
        let out = convolve(self.stride, self.padding.0, self.padding.1, &self.filters, input)?;
        self.last_input = Some(input.clone());
        Ok(out)
    }

    fn backward(&self, output_error: &Tensor3, gradient: &mut Vec<f32>) -> TensorResult<Tensor3> {
        check_shape("convolution output error", self.output, output_error.shape())?;
        let last_input = self.last_input.as_ref().ok_or(TensorError::BackwardBeforeForward("conv"))?;

        // Input error: every depth of the input collects the error of all
        // filters through the matching depth slice of their weights.
        let flipped = flip_filters_spatially(&self.filters)?;
        let input_error = flipped
            .filters()
            .par_iter()
            .map(|f| convolve_transpose_3d(self.stride, self.padding.0, self.padding.1, f.weights(), output_error))
            .collect::<TensorResult<Vec<_>>>()?;
        let input_error = Tensor3::from_depth_slices(input_error)?;
        check_shape("convolution input error", self.input, input_error.shape())?;

        let padded = last_input.padding(self.padding).depth_slices();
        let window = self.filters.filter_shape().without_depth();
        let per_filter = output_error
            .depth_slices()
            .par_iter()
            .map(|error| -> TensorResult<Vec<f32>> {
                let mut grads = Vec::with_capacity(self.filters.filter_shape().volume() + 1);
                for slice in &padded {
                    grads.extend(convolve_dilated_2d(self.stride, window, error, slice)?.into_values());
                }
                grads.push(error.sum());
                Ok(grads)
            })
            .collect::<TensorResult<Vec<_>>>()?;
        gradient.extend(per_filter.into_iter().flatten());
        Ok(input_error)
    }

    fn param_count(&self) -> usize {
        self.filters.param_count()
    }
    fn get_params(&self) -> Vec<f32> {
        self.filters.get_params()
    }
    fn set_params(&mut self, params: &[f32]) -> TensorResult<()> {
        self.filters.set_params(params)
    }
    fn random_init_params(&mut self, rng: &mut dyn RngCore) -> TensorResult<()> {
        self.he_init(rng)
    }
}
