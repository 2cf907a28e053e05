use rand::{Rng, RngCore};
use tensor::{Shape3, Tensor3, TensorResult};
use training::Sample;

pub const SIDE: usize = 8;

/// Images holding either a horizontal (class 0) or a vertical (class 1) bar.
///
/// Every pixel gets uniform noise of `noise` amplitude on top of the bar.
pub fn bars(count: usize, noise: f32, rng: &mut dyn RngCore) -> TensorResult<Vec<Sample>> {
    let shape = Shape3::new(1, SIDE, SIDE);
    (0..count)
        .map(|_| -> TensorResult<Sample> {
            let vertical = rng.random_bool(0.5);
            let line = rng.random_range(0..SIDE);
            let values = (0..shape.volume())
                .map(|idx| {
                    let (y, x) = (idx / SIDE, idx % SIDE);
                    let on_bar = if vertical { x == line } else { y == line };
                    let base = if on_bar { 1.0 } else { 0.0 };
                    base + rng.random_range(-noise..=noise)
                })
                .collect();
            let label = if vertical { vec![0.0, 1.0] } else { vec![1.0, 0.0] };
            Ok(Sample::new(
                Tensor3::from_values(shape, values)?,
                Tensor3::from_values(Shape3::new(1, 1, 2), label)?,
            ))
        })
        .collect()
}
