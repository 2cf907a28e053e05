//! Transposed ("scatter") convolution, the adjoint of [`super::convolution`].
//!
//! Every input cell `(y, x)` adds `filter[yf, xf] * input[y, x]` onto
//! `out[stride*y + yf, stride*x + xf]`. The full result is then cropped by the
//! unpadding on every side. Used for upsampling and for pushing an error
//! tensor back through a convolutional layer.

use rayon::prelude::*;

use crate::conv::filter::{Filter, FilterBank};
use crate::error::{TensorError, TensorResult};
use crate::malgebra::shape::{Shape2, Shape3};
use crate::malgebra::tensor::{Tensor2, Tensor3};

fn scatter_go(stride: usize, filter: &Tensor2, input: &Tensor2, out: &mut Tensor2) {
    let fy = filter.shape().height;
    let fx = filter.shape().width;
    let in_shape = input.shape();
    for y in 0..in_shape.height {
        for x in 0..in_shape.width {
            for yf in 0..fy {
                for xf in 0..fx {
                    out.add_at(stride * y + yf, stride * x + xf, filter.get(yf, xf) * input.get(y, x));
                }
            }
        }
    }
}

fn scatter_go_fixed<const STRIDE: usize, const FY: usize, const FX: usize>(
    filter: &Tensor2,
    input: &Tensor2,
    out: &mut Tensor2,
) {
    debug_assert_eq!(filter.shape(), Shape2::new(FY, FX));
    let in_shape = input.shape();
    for y in 0..in_shape.height {
        for x in 0..in_shape.width {
            for yf in 0..FY {
                for xf in 0..FX {
                    out.add_at(STRIDE * y + yf, STRIDE * x + xf, filter.get(yf, xf) * input.get(y, x));
                }
            }
        }
    }
}

fn scatter(stride: usize, filter: &Tensor2, input: &Tensor2, out: &mut Tensor2) {
    let f = filter.shape();
    match (stride, f.height, f.width) {
        (1, 1, 1) => scatter_go_fixed::<1, 1, 1>(filter, input, out),
        (1, 3, 3) => scatter_go_fixed::<1, 3, 3>(filter, input, out),
        (1, 5, 5) => scatter_go_fixed::<1, 5, 5>(filter, input, out),
        (2, 1, 1) => scatter_go_fixed::<2, 1, 1>(filter, input, out),
        (2, 3, 3) => scatter_go_fixed::<2, 3, 3>(filter, input, out),
        (2, 5, 5) => scatter_go_fixed::<2, 5, 5>(filter, input, out),
        _ => scatter_go(stride, filter, input, out),
    }
}

/// Size of the scatter target before cropping: `f + stride * (n - 1)` per axis.
fn full_shape(stride: usize, filter: Shape2, input: Shape2) -> TensorResult<Shape2> {
    if stride == 0 {
        return Err(TensorError::InvalidGeometry("stride must be at least 1".to_string()));
    }
    if input.height == 0 || input.width == 0 || filter.height == 0 || filter.width == 0 {
        return Err(TensorError::InvalidGeometry(format!(
            "cannot transpose-convolve input {} with filter {}",
            input, filter
        )));
    }
    Ok(Shape2::new(
        filter.height + stride * (input.height - 1),
        filter.width + stride * (input.width - 1),
    ))
}

fn convolve_transpose_with(
    stride: usize,
    unpad: (usize, usize),
    filter: &Tensor2,
    input: &Tensor2,
    fast_path: bool,
) -> TensorResult<Tensor2> {
    let mut out = Tensor2::zeros(full_shape(stride, filter.shape(), input.shape())?);
    if fast_path {
        scatter(stride, filter, input, &mut out);
    } else {
        scatter_go(stride, filter, input, &mut out);
    }
    out.unpadding(unpad)
}

/// Transposed convolution of one slice with one 2-D filter.
pub fn convolve_transpose(
    stride: usize,
    unpad_y: usize,
    unpad_x: usize,
    filter: &Tensor2,
    input: &Tensor2,
) -> TensorResult<Tensor2> {
    convolve_transpose_with(stride, (unpad_y, unpad_x), filter, input, true)
}

/// One 2-D filter applied to every depth slice of the input.
pub fn convolve_transpose_depth(
    stride: usize,
    unpad_y: usize,
    unpad_x: usize,
    filter: &Tensor2,
    input: &Tensor3,
) -> TensorResult<Tensor3> {
    let slices = input
        .depth_slices()
        .iter()
        .map(|slice| convolve_transpose(stride, unpad_y, unpad_x, filter, slice))
        .collect::<TensorResult<Vec<_>>>()?;
    Tensor3::from_depth_slices(slices)
}

/// Every depth slice of `filters` applied to the same input slice.
pub fn convolve_transpose_slices(
    stride: usize,
    unpad_y: usize,
    unpad_x: usize,
    filters: &Tensor3,
    input: &Tensor2,
) -> TensorResult<Tensor3> {
    let slices = filters
        .depth_slices()
        .iter()
        .map(|filter| convolve_transpose(stride, unpad_y, unpad_x, filter, input))
        .collect::<TensorResult<Vec<_>>>()?;
    Tensor3::from_depth_slices(slices)
}

/// Filter slice `z` against input slice `z`, all results summed.
pub fn convolve_transpose_3d(
    stride: usize,
    unpad_y: usize,
    unpad_x: usize,
    filter: &Tensor3,
    input: &Tensor3,
) -> TensorResult<Tensor2> {
    if filter.shape().depth != input.shape().depth {
        return Err(TensorError::ShapeMismatch {
            context: "transposed convolution depth",
            expected: Shape3::new(input.shape().depth, filter.shape().height, filter.shape().width),
            got: filter.shape(),
        });
    }
    let parts = filter
        .depth_slices()
        .iter()
        .zip(input.depth_slices().iter())
        .map(|(f, slice)| convolve_transpose(stride, unpad_y, unpad_x, f, slice))
        .collect::<TensorResult<Vec<_>>>()?;
    Tensor2::sum_all(&parts)?
        .ok_or_else(|| TensorError::InvalidGeometry("transposed convolution over zero depth".to_string()))
}

/// [`convolve_transpose_3d`] plus the filter bias.
pub fn convolve_transpose_filter(
    stride: usize,
    unpad_y: usize,
    unpad_x: usize,
    filter: &Filter,
    input: &Tensor3,
) -> TensorResult<Tensor2> {
    let without_bias = convolve_transpose_3d(stride, unpad_y, unpad_x, filter.weights(), input)?;
    Ok(without_bias.map(|v| v + filter.bias()))
}

/// One output depth slice per filter of the bank.
pub fn convolve_transpose_bank(
    stride: usize,
    unpad_y: usize,
    unpad_x: usize,
    bank: &FilterBank,
    input: &Tensor3,
) -> TensorResult<Tensor3> {
    let slices = bank
        .filters()
        .par_iter()
        .map(|filter| convolve_transpose_filter(stride, unpad_y, unpad_x, filter, input))
        .collect::<TensorResult<Vec<_>>>()?;
    Tensor3::from_depth_slices(slices)
}
