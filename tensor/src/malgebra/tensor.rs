use crate::error::{TensorError, TensorResult};
use crate::malgebra::shape::{Shape2, Shape3};

/// Dense row-major 2-D array of `f32`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawTensor2")]
pub struct Tensor2 {
    shape: Shape2,
    values: Vec<f32>,
}

/// Dense depth-major 3-D array of `f32`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawTensor3")]
pub struct Tensor3 {
    shape: Shape3,
    values: Vec<f32>,
}

// Unchecked forms used only during deserialization.
#[derive(serde::Deserialize)]
struct RawTensor2 {
    shape: Shape2,
    values: Vec<f32>,
}

#[derive(serde::Deserialize)]
struct RawTensor3 {
    shape: Shape3,
    values: Vec<f32>,
}

impl TryFrom<RawTensor2> for Tensor2 {
    type Error = TensorError;
    fn try_from(raw: RawTensor2) -> Result<Self, Self::Error> {
        Tensor2::from_values(raw.shape, raw.values)
    }
}

impl TryFrom<RawTensor3> for Tensor3 {
    type Error = TensorError;
    fn try_from(raw: RawTensor3) -> Result<Self, Self::Error> {
        Tensor3::from_values(raw.shape, raw.values)
    }
}

impl Tensor2 {
    pub fn zeros(shape: Shape2) -> Self {
        Self { shape, values: vec![0.0; shape.volume()] }
    }
    pub fn from_values(shape: Shape2, values: Vec<f32>) -> TensorResult<Self> {
        if values.len() != shape.volume() {
            return Err(TensorError::DataLength { expected: shape.volume(), got: values.len() });
        }
        Ok(Self { shape, values })
    }
    pub fn shape(&self) -> Shape2 {
        self.shape
    }
    pub fn values(&self) -> &[f32] {
        &self.values
    }
    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
    #[inline(always)]
    pub fn get(&self, y: usize, x: usize) -> f32 {
        self.values[self.shape.idx(y, x)]
    }
    #[inline(always)]
    pub fn set(&mut self, y: usize, x: usize, value: f32) {
        let idx = self.shape.idx(y, x);
        self.values[idx] = value;
    }
    #[inline(always)]
    pub fn add_at(&mut self, y: usize, x: usize, value: f32) {
        let idx = self.shape.idx(y, x);
        self.values[idx] += value;
    }
    pub fn sum(&self) -> f32 {
        self.values.iter().sum()
    }
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self { shape: self.shape, values: self.values.iter().map(|v| f(*v)).collect() }
    }
    /// Surrounds the slice with a zero border of `pad.0` rows and `pad.1` columns.
    pub fn padding(&self, pad: (usize, usize)) -> Self {
        if pad.0 == 0 && pad.1 == 0 {
            return self.clone();
        }
        let mut out = Tensor2::zeros(Shape2::new(
            self.shape.height + 2 * pad.0,
            self.shape.width + 2 * pad.1,
        ));
        for y in 0..self.shape.height {
            for x in 0..self.shape.width {
                out.set(y + pad.0, x + pad.1, self.get(y, x));
            }
        }
        out
    }
    /// Crops `pad.0` rows and `pad.1` columns from every side.
    pub fn unpadding(&self, pad: (usize, usize)) -> TensorResult<Self> {
        if 2 * pad.0 > self.shape.height || 2 * pad.1 > self.shape.width {
            return Err(TensorError::InvalidGeometry(format!(
                "cannot crop {:?} from a {} slice",
                pad, self.shape
            )));
        }
        let mut out = Tensor2::zeros(Shape2::new(
            self.shape.height - 2 * pad.0,
            self.shape.width - 2 * pad.1,
        ));
        for y in 0..out.shape.height {
            for x in 0..out.shape.width {
                out.set(y, x, self.get(y + pad.0, x + pad.1));
            }
        }
        Ok(out)
    }
    /// Element-wise sum of equally shaped slices. `None` for an empty list.
    pub fn sum_all(slices: &[Tensor2]) -> TensorResult<Option<Tensor2>> {
        let Some(first) = slices.first() else {
            return Ok(None);
        };
        let mut acc = first.clone();
        for slice in &slices[1..] {
            if slice.shape != acc.shape {
                return Err(TensorError::ShapeMismatch {
                    context: "sum of 2-D slices",
                    expected: Shape3::new(1, acc.shape.height, acc.shape.width),
                    got: Shape3::new(1, slice.shape.height, slice.shape.width),
                });
            }
            acc.values.iter_mut().zip(slice.values.iter()).for_each(|(a, b)| *a += *b);
        }
        Ok(Some(acc))
    }
}

impl Tensor3 {
    pub fn zeros(shape: Shape3) -> Self {
        Self { shape, values: vec![0.0; shape.volume()] }
    }
    pub fn from_values(shape: Shape3, values: Vec<f32>) -> TensorResult<Self> {
        if values.len() != shape.volume() {
            return Err(TensorError::DataLength { expected: shape.volume(), got: values.len() });
        }
        Ok(Self { shape, values })
    }
    pub fn shape(&self) -> Shape3 {
        self.shape
    }
    pub fn values(&self) -> &[f32] {
        &self.values
    }
    pub fn into_values(self) -> Vec<f32> {
        self.values
    }
    #[inline(always)]
    pub fn get(&self, z: usize, y: usize, x: usize) -> f32 {
        self.values[self.shape.idx(z, y, x)]
    }
    #[inline(always)]
    pub fn set(&mut self, z: usize, y: usize, x: usize, value: f32) {
        let idx = self.shape.idx(z, y, x);
        self.values[idx] = value;
    }
    pub fn sum(&self) -> f32 {
        self.values.iter().sum()
    }
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self { shape: self.shape, values: self.values.iter().map(|v| f(*v)).collect() }
    }
    /// Combines two equally shaped tensors value by value.
    pub fn zip_map(&self, other: &Tensor3, f: impl Fn(f32, f32) -> f32) -> TensorResult<Self> {
        if self.shape != other.shape {
            return Err(TensorError::ShapeMismatch {
                context: "element-wise tensor operation",
                expected: self.shape,
                got: other.shape,
            });
        }
        Ok(Self {
            shape: self.shape,
            values: self.values.iter().zip(other.values.iter()).map(|(a, b)| f(*a, *b)).collect(),
        })
    }
    /// Same values, new geometry of equal volume.
    pub fn reshape(&self, shape: Shape3) -> TensorResult<Self> {
        Tensor3::from_values(shape, self.values.clone())
    }
    pub fn depth_slice(&self, z: usize) -> Tensor2 {
        let area = self.shape.height * self.shape.width;
        Tensor2 {
            shape: self.shape.without_depth(),
            values: self.values[z * area..(z + 1) * area].to_vec(),
        }
    }
    pub fn depth_slices(&self) -> Vec<Tensor2> {
        (0..self.shape.depth).map(|z| self.depth_slice(z)).collect()
    }
    /// Stacks equally shaped slices along a new depth axis.
    pub fn from_depth_slices(slices: Vec<Tensor2>) -> TensorResult<Self> {
        let Some(first) = slices.first() else {
            return Ok(Tensor3::zeros(Shape3::new(0, 0, 0)));
        };
        let slice_shape = first.shape();
        let shape = Shape3::new(slices.len(), slice_shape.height, slice_shape.width);
        let mut values = Vec::with_capacity(shape.volume());
        for slice in slices {
            if slice.shape() != slice_shape {
                return Err(TensorError::ShapeMismatch {
                    context: "stacking depth slices",
                    expected: Shape3::new(1, slice_shape.height, slice_shape.width),
                    got: Shape3::new(1, slice.shape().height, slice.shape().width),
                });
            }
            values.extend(slice.into_values());
        }
        Ok(Self { shape, values })
    }
    /// Zero border around every depth slice.
    pub fn padding(&self, pad: (usize, usize)) -> Self {
        if pad.0 == 0 && pad.1 == 0 {
            return self.clone();
        }
        let slices = self.depth_slices().iter().map(|slice| slice.padding(pad)).collect::<Vec<_>>();
        let padded = Shape3::new(
            self.shape.depth,
            self.shape.height + 2 * pad.0,
            self.shape.width + 2 * pad.1,
        );
        Tensor3 { shape: padded, values: slices.into_iter().flat_map(|s| s.into_values()).collect() }
    }
    /// Flat index of the first maximal value.
    pub fn max_pos(&self) -> Option<usize> {
        self.values
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f32)>, (idx, value)| match best {
                Some((_, best_value)) if *value <= best_value => best,
                _ => Some((idx, *value)),
            })
            .map(|(idx, _)| idx)
    }
}
