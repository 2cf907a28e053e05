//! Direct convolution (cross-correlation) of tensors with filters.
//!
//! The primitive slides one 2-D kernel over one zero-padded 2-D slice.
//! A 3-D convolution sums the primitive over the depth slices of input and
//! filter, and a filter-bank convolution stacks one 3-D result per filter.

use rayon::prelude::*;

use crate::conv::filter::{Filter, FilterBank};
use crate::error::{TensorError, TensorResult};
use crate::malgebra::shape::{Shape2, Shape3};
use crate::malgebra::tensor::{Tensor2, Tensor3};

/// Output size of a convolution over a `input`-sized slice.
///
/// `floor((H + 2*pad_y - fy) / stride) + 1`, and the same for the width.
/// The division must be exact: a geometry that would silently drop border
/// rows or columns is rejected.
pub fn output_shape(stride: usize, pad: (usize, usize), filter: Shape2, input: Shape2) -> TensorResult<Shape2> {
    if stride == 0 {
        return Err(TensorError::InvalidGeometry("stride must be at least 1".to_string()));
    }
    let padded = Shape2::new(input.height + 2 * pad.0, input.width + 2 * pad.1);
    if filter.height == 0 || filter.width == 0 || filter.height > padded.height || filter.width > padded.width {
        return Err(TensorError::InvalidGeometry(format!(
            "filter {} does not fit into padded input {}",
            filter, padded
        )));
    }
    let span = (padded.height - filter.height, padded.width - filter.width);
    if span.0 % stride != 0 || span.1 % stride != 0 {
        return Err(TensorError::InvalidGeometry(format!(
            "stride {} does not evenly divide input {} with filter {} and padding {:?}",
            stride, input, filter, pad
        )));
    }
    Ok(Shape2::new(span.0 / stride + 1, span.1 / stride + 1))
}

/// Slides `filter` over an already padded slice and accumulates into `out`.
fn slide_go(stride: usize, filter: &Tensor2, padded: &Tensor2, out: &mut Tensor2) {
    let fy = filter.shape().height;
    let fx = filter.shape().width;
    let out_shape = out.shape();
    for y in 0..out_shape.height {
        for x in 0..out_shape.width {
            let mut acc = 0.0;
            for yf in 0..fy {
                for xf in 0..fx {
                    acc += filter.get(yf, xf) * padded.get(stride * y + yf, stride * x + xf);
                }
            }
            out.add_at(y, x, acc);
        }
    }
}

fn slide_go_fixed<const STRIDE: usize, const FY: usize, const FX: usize>(
    filter: &Tensor2,
    padded: &Tensor2,
    out: &mut Tensor2,
) {
    debug_assert_eq!(filter.shape(), Shape2::new(FY, FX));
    let out_shape = out.shape();
    for y in 0..out_shape.height {
        for x in 0..out_shape.width {
            let mut acc = 0.0;
            for yf in 0..FY {
                for xf in 0..FX {
                    acc += filter.get(yf, xf) * padded.get(STRIDE * y + yf, STRIDE * x + xf);
                }
            }
            out.add_at(y, x, acc);
        }
    }
}

fn slide(stride: usize, filter: &Tensor2, padded: &Tensor2, out: &mut Tensor2) {
    let f = filter.shape();
    match (stride, f.height, f.width) {
        (1, 1, 1) => slide_go_fixed::<1, 1, 1>(filter, padded, out),
        (1, 3, 3) => slide_go_fixed::<1, 3, 3>(filter, padded, out),
        (1, 5, 5) => slide_go_fixed::<1, 5, 5>(filter, padded, out),
        (2, 1, 1) => slide_go_fixed::<2, 1, 1>(filter, padded, out),
        (2, 3, 3) => slide_go_fixed::<2, 3, 3>(filter, padded, out),
        (2, 5, 5) => slide_go_fixed::<2, 5, 5>(filter, padded, out),
        _ => slide_go(stride, filter, padded, out),
    }
}

/// Single-filter 2-D convolution, the primitive of the engine.
pub fn convolve_2d(
    stride: usize,
    pad_y: usize,
    pad_x: usize,
    filter: &Tensor2,
    input: &Tensor2,
) -> TensorResult<Tensor2> {
    let out_shape = output_shape(stride, (pad_y, pad_x), filter.shape(), input.shape())?;
    let padded = input.padding((pad_y, pad_x));
    let mut out = Tensor2::zeros(out_shape);
    slide(stride, filter, &padded, &mut out);
    Ok(out)
}

fn check_depth(filter: Shape3, input: Shape3) -> TensorResult<()> {
    if filter.depth != input.depth {
        return Err(TensorError::ShapeMismatch {
            context: "filter depth must equal input depth",
            expected: Shape3::new(input.depth, filter.height, filter.width),
            got: filter,
        });
    }
    Ok(())
}

/// Convolution of one filter with padded depth slices, bias included.
fn convolve_padded(stride: usize, out_shape: Shape2, filter: &Filter, padded: &[Tensor2]) -> Tensor2 {
    let mut out = Tensor2::zeros(out_shape);
    for (z, slice) in padded.iter().enumerate() {
        slide(stride, &filter.weights().depth_slice(z), slice, &mut out);
    }
    out.map(|v| v + filter.bias())
}

/// 3-D convolution with a single filter: depth slices summed, plus bias.
pub fn convolve_3d(
    stride: usize,
    pad_y: usize,
    pad_x: usize,
    filter: &Filter,
    input: &Tensor3,
) -> TensorResult<Tensor2> {
    check_depth(filter.shape(), input.shape())?;
    let out_shape = output_shape(
        stride,
        (pad_y, pad_x),
        filter.shape().without_depth(),
        input.shape().without_depth(),
    )?;
    let padded = input.padding((pad_y, pad_x)).depth_slices();
    Ok(convolve_padded(stride, out_shape, filter, &padded))
}

/// Filter-bank convolution: output depth `f` is the 3-D convolution with filter `f`.
pub fn convolve(
    stride: usize,
    pad_y: usize,
    pad_x: usize,
    bank: &FilterBank,
    input: &Tensor3,
) -> TensorResult<Tensor3> {
    check_depth(bank.filter_shape(), input.shape())?;
    let out_shape = output_shape(
        stride,
        (pad_y, pad_x),
        bank.filter_shape().without_depth(),
        input.shape().without_depth(),
    )?;
    let padded = input.padding((pad_y, pad_x)).depth_slices();
    let slices: Vec<Tensor2> = bank
        .filters()
        .par_iter()
        .map(|filter| convolve_padded(stride, out_shape, filter, &padded))
        .collect();
    Tensor3::from_depth_slices(slices)
}

/// Correlates `kernel` with `input` sampling the input every `dilation` cells.
///
/// `out[yf, xf] = sum over (y, x) of kernel[y, x] * input[dilation*y + yf, dilation*x + xf]`
/// This is the weight gradient of a strided convolution: `input` is the padded
/// layer input and `kernel` one depth slice of the output error.
pub fn convolve_dilated_2d(
    dilation: usize,
    out_shape: Shape2,
    kernel: &Tensor2,
    input: &Tensor2,
) -> TensorResult<Tensor2> {
    let k = kernel.shape();
    let i = input.shape();
    if dilation == 0 || k.height == 0 || k.width == 0 {
        return Err(TensorError::InvalidGeometry("dilation and kernel must be non-zero".to_string()));
    }
    if dilation * (k.height - 1) + out_shape.height > i.height || dilation * (k.width - 1) + out_shape.width > i.width {
        return Err(TensorError::InvalidGeometry(format!(
            "dilated kernel {} with output {} exceeds input {}",
            k, out_shape, i
        )));
    }
    let mut out = Tensor2::zeros(out_shape);
    for yf in 0..out_shape.height {
        for xf in 0..out_shape.width {
            let mut acc = 0.0;
            for y in 0..k.height {
                for x in 0..k.width {
                    acc += kernel.get(y, x) * input.get(dilation * y + yf, dilation * x + xf);
                }
            }
            out.set(yf, xf, acc);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaChaRng;

    use super::*;

    fn random_tensor3(rng: &mut ChaChaRng, shape: Shape3) -> Tensor3 {
        Tensor3::from_values(shape, (0..shape.volume()).map(|_| rng.random_range(-1.0..1.0)).collect()).unwrap()
    }

    // Textbook definition with implicit zero padding, used as the reference.
    fn reference(stride: usize, pad: (usize, usize), bank: &FilterBank, input: &Tensor3) -> Vec<f32> {
        let s = input.shape();
        let f = bank.filter_shape();
        let out_h = (s.height + 2 * pad.0 - f.height) / stride + 1;
        let out_w = (s.width + 2 * pad.1 - f.width) / stride + 1;
        let mut out = Vec::new();
        for filter in bank.filters() {
            for y in 0..out_h {
                for x in 0..out_w {
                    let mut acc = filter.bias();
                    for d in 0..f.depth {
                        for yf in 0..f.height {
                            for xf in 0..f.width {
                                let iy = (y * stride + yf) as isize - pad.0 as isize;
                                let ix = (x * stride + xf) as isize - pad.1 as isize;
                                if iy >= 0 && ix >= 0 && (iy as usize) < s.height && (ix as usize) < s.width {
                                    acc += filter.weights().get(d, yf, xf) * input.get(d, iy as usize, ix as usize);
                                }
                            }
                        }
                    }
                    out.push(acc);
                }
            }
        }
        out
    }

    #[test]
    fn identity_kernel_keeps_input() {
        let input = Tensor2::from_values(Shape2::new(2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut kernel = Tensor2::zeros(Shape2::new(3, 3));
        kernel.set(1, 1, 1.0);
        let out = convolve_2d(1, 1, 1, &kernel, &input).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn output_geometry() {
        assert_eq!(output_shape(1, (1, 1), Shape2::new(3, 3), Shape2::new(4, 4)).unwrap(), Shape2::new(4, 4));
        assert_eq!(output_shape(2, (0, 0), Shape2::new(2, 2), Shape2::new(4, 6)).unwrap(), Shape2::new(2, 3));
        assert!(output_shape(0, (0, 0), Shape2::new(1, 1), Shape2::new(4, 4)).is_err());
        assert!(output_shape(2, (1, 1), Shape2::new(3, 3), Shape2::new(4, 4)).is_err());
        assert!(output_shape(1, (0, 0), Shape2::new(5, 5), Shape2::new(4, 4)).is_err());
    }

    #[test]
    fn bank_matches_reference() {
        let mut rng = ChaChaRng::seed_from_u64(3);
        for (stride, pad, filter, input) in [
            (1, (1, 1), Shape3::new(2, 3, 3), Shape3::new(2, 5, 5)),
            (2, (0, 0), Shape3::new(3, 2, 2), Shape3::new(3, 6, 4)),
            (1, (0, 2), Shape3::new(1, 1, 5), Shape3::new(1, 3, 4)),
            (3, (1, 0), Shape3::new(2, 2, 3), Shape3::new(2, 6, 6)),
        ] {
            let weights: Vec<f32> = (0..4 * filter.volume()).map(|_| rng.random_range(-1.0..1.0)).collect();
            let biases: Vec<f32> = (0..4).map(|_| rng.random_range(-1.0..1.0)).collect();
            let bank = FilterBank::from_params(filter, 4, &weights, &biases).unwrap();
            let x = random_tensor3(&mut rng, input);
            let out = convolve(stride, pad.0, pad.1, &bank, &x).unwrap();
            let expected = reference(stride, pad, &bank, &x);
            assert_eq!(out.shape().depth, 4);
            for (a, b) in out.values().iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-5, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn depth_mismatch_is_rejected() {
        let bank = FilterBank::zeros(Shape3::new(2, 3, 3), 1).unwrap();
        let input = Tensor3::zeros(Shape3::new(3, 4, 4));
        assert!(matches!(convolve(1, 1, 1, &bank, &input), Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn fixed_slide_equals_generic_slide() {
        let mut rng = ChaChaRng::seed_from_u64(5);
        for (stride, k) in [(1, 1), (1, 3), (1, 5), (2, 1), (2, 3), (2, 5)] {
            let filter = random_tensor3(&mut rng, Shape3::new(1, k, k)).depth_slice(0);
            let padded = random_tensor3(&mut rng, Shape3::new(1, 4 * stride + k, 2 * stride + k)).depth_slice(0);
            let out_shape = Shape2::new(5, 3);
            let mut fast = Tensor2::zeros(out_shape);
            let mut generic = Tensor2::zeros(out_shape);
            slide(stride, &filter, &padded, &mut fast);
            slide_go(stride, &filter, &padded, &mut generic);
            assert_eq!(fast.values(), generic.values());
        }
    }

    #[test]
    fn dilation_one_is_plain_convolution() {
        let mut rng = ChaChaRng::seed_from_u64(9);
        let kernel = random_tensor3(&mut rng, Shape3::new(1, 3, 3)).depth_slice(0);
        let input = random_tensor3(&mut rng, Shape3::new(1, 5, 6)).depth_slice(0);
        let dilated = convolve_dilated_2d(1, Shape2::new(3, 4), &kernel, &input).unwrap();
        let plain = convolve_2d(1, 0, 0, &kernel, &input).unwrap();
        for (a, b) in dilated.values().iter().zip(plain.values()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
