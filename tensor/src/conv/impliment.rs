use rand::RngCore;
use rand_distr::{Distribution, Normal};

use crate::conv::{convolution, filter::FilterBank, ConvLayer};
use crate::error::{TensorError, TensorResult};
use crate::malgebra::shape::{Shape2, Shape3};

impl ConvLayer {
    /// Layer of `features` zero-initialised filters of `window` size.
    ///
    /// Fails with [`TensorError::InvalidGeometry`] when stride and padding do
    /// not tile the input exactly.
    pub fn new(
        input: Shape3,
        window: Shape2,
        features: usize,
        stride: usize,
        padding: (usize, usize),
    ) -> TensorResult<Self> {
        if features == 0 {
            return Err(TensorError::EmptyFilterBank);
        }
        let out = convolution::output_shape(stride, padding, window, input.without_depth())?;
        let filters = FilterBank::zeros(Shape3::new(input.depth, window.height, window.width), features)?;
        Ok(Self {
            input,
            output: Shape3::new(features, out.height, out.width),
            filters,
            stride,
            padding,
            last_input: None,
        })
    }

    /// Same geometry, with an existing bank.
    pub fn with_filters(input: Shape3, filters: FilterBank, stride: usize, padding: (usize, usize)) -> TensorResult<Self> {
        let mut layer = Self::new(input, filters.filter_shape().without_depth(), filters.len(), stride, padding)?;
        crate::error::check_shape("convolution filter", layer.filters.filter_shape(), filters.filter_shape())?;
        layer.filters = filters;
        Ok(layer)
    }

    pub fn filters(&self) -> &FilterBank {
        &self.filters
    }
    pub fn stride(&self) -> usize {
        self.stride
    }
    pub fn padding(&self) -> (usize, usize) {
        self.padding
    }

    /// He-normal weights `N(0, sqrt(2 / fan_in))`, zero biases.
    pub fn he_init(&mut self, rng: &mut dyn RngCore) -> TensorResult<()> {
        let shape = self.filters.filter_shape();
        let std = (2.0 / shape.volume().max(1) as f32).sqrt();
        let normal = Normal::new(0.0, std)
            .map_err(|e| TensorError::InvalidGeometry(format!("he init of convolution: {}", e)))?;
        let weights: Vec<f32> = (0..shape.volume() * self.filters.len()).map(|_| normal.sample(&mut *rng)).collect();
        let biases = vec![0.0; self.filters.len()];
        self.filters = FilterBank::from_params(shape, self.filters.len(), &weights, &biases)?;
        Ok(())
    }
}
