use crate::conv::filter::FilterBank;
use crate::error::{check_shape, TensorError};
use crate::malgebra::{shape::Shape3, tensor::Tensor3};

pub mod convolution;
pub mod filter;
pub mod fs;
pub mod impliment;
pub mod neural;
pub mod transpose;

/// Convolutional layer: a filter bank slid over the zero-padded input.
#[derive(Clone, Debug, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "StoredConvLayer")]
pub struct ConvLayer {
    // depth, height, width
    input: Shape3,
    // filters, out height, out width
    output: Shape3,
    // filters -> depth -> fy -> fx, plus one bias per filter
    filters: FilterBank,
    stride: usize,
    // rows, columns added on every side
    padding: (usize, usize),
    #[serde(skip)]
    last_input: Option<Tensor3>,
}

#[derive(serde::Deserialize)]
struct StoredConvLayer {
    input: Shape3,
    output: Shape3,
    filters: FilterBank,
    stride: usize,
    padding: (usize, usize),
}

impl TryFrom<StoredConvLayer> for ConvLayer {
    type Error = TensorError;
    fn try_from(stored: StoredConvLayer) -> Result<Self, Self::Error> {
        let layer = ConvLayer::with_filters(stored.input, stored.filters, stored.stride, stored.padding)?;
        check_shape("stored convolution output", layer.output, stored.output)?;
        Ok(layer)
    }
}
