//! Non-overlapping `scale x scale` block reductions and their inverse-shape
//! up-sampling.

use crate::error::{TensorError, TensorResult};
use crate::malgebra::shape::Shape3;
use crate::malgebra::tensor::Tensor3;

/// Output shape of a pooling step; every spatial axis must divide evenly.
pub fn pooled_shape(scale: usize, input: Shape3) -> TensorResult<Shape3> {
    if scale == 0 {
        return Err(TensorError::InvalidGeometry("pooling scale must be at least 1".to_string()));
    }
    if input.height % scale != 0 || input.width % scale != 0 {
        return Err(TensorError::InvalidGeometry(format!(
            "pooling scale {} does not divide input {}",
            scale, input
        )));
    }
    Ok(Shape3::new(input.depth, input.height / scale, input.width / scale))
}

/// Output shape of an unpooling step.
pub fn unpooled_shape(scale: usize, input: Shape3) -> TensorResult<Shape3> {
    if scale == 0 {
        return Err(TensorError::InvalidGeometry("unpooling scale must be at least 1".to_string()));
    }
    Ok(Shape3::new(input.depth, input.height * scale, input.width * scale))
}

fn pool_with<A: Copy>(
    scale: usize,
    input: &Tensor3,
    init: A,
    reduce: impl Fn(A, f32) -> A,
    finish: impl Fn(A) -> f32,
) -> TensorResult<Tensor3> {
    let out_shape = pooled_shape(scale, input.shape())?;
    let mut out = Tensor3::zeros(out_shape);
    for z in 0..out_shape.depth {
        for y in 0..out_shape.height {
            for x in 0..out_shape.width {
                let mut acc = init;
                for yb in 0..scale {
                    for xb in 0..scale {
                        acc = reduce(acc, input.get(z, scale * y + yb, scale * x + xb));
                    }
                }
                out.set(z, y, x, finish(acc));
            }
        }
    }
    Ok(out)
}

/// Maximum of every block.
pub fn pool_max(scale: usize, input: &Tensor3) -> TensorResult<Tensor3> {
    pool_with(scale, input, f32::NEG_INFINITY, f32::max, |v| v)
}

/// Mean of every block.
///
/// Blocks are summed in `f64`, so a block of identical values averages back
/// to exactly that value.
pub fn pool_avg(scale: usize, input: &Tensor3) -> TensorResult<Tensor3> {
    let area = (scale * scale) as f64;
    pool_with(scale, input, 0.0f64, |acc, v| acc + v as f64, |sum| (sum / area) as f32)
}

/// Nearest-neighbour up-sampling: every input cell fills one output block.
pub fn unpool(scale: usize, input: &Tensor3) -> TensorResult<Tensor3> {
    let out_shape = unpooled_shape(scale, input.shape())?;
    let mut out = Tensor3::zeros(out_shape);
    for z in 0..out_shape.depth {
        for y in 0..out_shape.height {
            for x in 0..out_shape.width {
                out.set(z, y, x, input.get(z, y / scale, x / scale));
            }
        }
    }
    Ok(out)
}

/// Flat input offset of the first block maximum, for every output cell.
///
/// Used to route the error of a max pooling step back to its winners.
pub fn max_positions(scale: usize, input: &Tensor3) -> TensorResult<Vec<usize>> {
    let in_shape = input.shape();
    let out_shape = pooled_shape(scale, in_shape)?;
    let mut winners = Vec::with_capacity(out_shape.volume());
    for z in 0..out_shape.depth {
        for y in 0..out_shape.height {
            for x in 0..out_shape.width {
                let mut best = (in_shape.idx(z, scale * y, scale * x), f32::NEG_INFINITY);
                for yb in 0..scale {
                    for xb in 0..scale {
                        let (iy, ix) = (scale * y + yb, scale * x + xb);
                        let value = input.get(z, iy, ix);
                        if value > best.1 {
                            best = (in_shape.idx(z, iy, ix), value);
                        }
                    }
                }
                winners.push(best.0);
            }
        }
    }
    Ok(winners)
}

/// Sum of every block, the adjoint of [`unpool`].
pub fn block_sum(scale: usize, input: &Tensor3) -> TensorResult<Tensor3> {
    pool_with(scale, input, 0.0f32, |acc, v| acc + v, |v| v)
}
