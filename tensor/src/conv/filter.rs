use crate::error::{check_param_count, TensorError, TensorResult};
use crate::malgebra::{shape::Shape3, tensor::Tensor3};

/// A 3-D kernel plus the scalar bias added to every output value.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Filter {
    weights: Tensor3,
    bias: f32,
}

impl Filter {
    pub fn new(weights: Tensor3, bias: f32) -> Self {
        Self { weights, bias }
    }
    pub fn zeros(shape: Shape3) -> Self {
        Self::new(Tensor3::zeros(shape), 0.0)
    }
    pub fn shape(&self) -> Shape3 {
        self.weights.shape()
    }
    pub fn volume(&self) -> usize {
        self.weights.shape().volume()
    }
    pub fn weights(&self) -> &Tensor3 {
        &self.weights
    }
    pub fn bias(&self) -> f32 {
        self.bias
    }
    /// Replaces weights and bias; the weight count must equal the kernel volume.
    pub fn set_params(&mut self, weights: &[f32], bias: f32) -> TensorResult<()> {
        check_param_count(self.volume(), weights.len())?;
        self.weights = Tensor3::from_values(self.shape(), weights.to_vec())?;
        self.bias = bias;
        Ok(())
    }
}

/// Ordered, non-empty group of equally shaped filters.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(try_from = "Vec<Filter>", into = "Vec<Filter>")]
pub struct FilterBank(Vec<Filter>);

impl TryFrom<Vec<Filter>> for FilterBank {
    type Error = TensorError;
    fn try_from(filters: Vec<Filter>) -> Result<Self, Self::Error> {
        FilterBank::new(filters)
    }
}

impl From<FilterBank> for Vec<Filter> {
    fn from(bank: FilterBank) -> Self {
        bank.0
    }
}

impl FilterBank {
    pub fn new(filters: Vec<Filter>) -> TensorResult<Self> {
        let Some(first) = filters.first() else {
            return Err(TensorError::EmptyFilterBank);
        };
        let shape = first.shape();
        if let Some(other) = filters.iter().find(|f| f.shape() != shape) {
            return Err(TensorError::ShapeMismatch {
                context: "filter bank",
                expected: shape,
                got: other.shape(),
            });
        }
        Ok(Self(filters))
    }
    /// `k` zero filters of the given shape.
    pub fn zeros(shape: Shape3, k: usize) -> TensorResult<Self> {
        Self::new(vec![Filter::zeros(shape); k])
    }
    /// Builds a bank from `k * volume` weights and `k` biases.
    pub fn from_params(shape: Shape3, k: usize, weights: &[f32], biases: &[f32]) -> TensorResult<Self> {
        check_param_count(k * shape.volume(), weights.len())?;
        check_param_count(k, biases.len())?;
        let filters = weights
            .chunks(shape.volume())
            .zip(biases.iter())
            .map(|(chunk, bias)| -> TensorResult<Filter> { Ok(Filter::new(Tensor3::from_values(shape, chunk.to_vec())?, *bias)) })
            .collect::<TensorResult<Vec<Filter>>>()?;
        Self::new(filters)
    }
    pub fn filters(&self) -> &[Filter] {
        &self.0
    }
    pub fn filters_mut(&mut self) -> &mut [Filter] {
        &mut self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Shape shared by every filter.
    pub fn filter_shape(&self) -> Shape3 {
        self.0[0].shape()
    }
    /// Weights plus one bias per filter.
    pub fn param_count(&self) -> usize {
        self.0.len() * (self.filter_shape().volume() + 1)
    }
    /// Per filter: depth-major weights, then its bias.
    pub fn get_params(&self) -> Vec<f32> {
        self.0
            .iter()
            .flat_map(|f| f.weights().values().iter().copied().chain(std::iter::once(f.bias())))
            .collect()
    }
    pub fn set_params(&mut self, params: &[f32]) -> TensorResult<()> {
        check_param_count(self.param_count(), params.len())?;
        let stride = self.filter_shape().volume() + 1;
        let mut updated = self.0.clone();
        for (filter, chunk) in updated.iter_mut().zip(params.chunks(stride)) {
            filter.set_params(&chunk[..stride - 1], chunk[stride - 1])?;
        }
        self.0 = updated;
        Ok(())
    }
}

/// Swaps the depth axis with the filter axis of a bank.
///
/// A bank of `k` filters of shape `(d, fy, fx)` becomes `d` filters of shape
/// `(k, fy, fx)` with `new[i][j, y, x] = old[j][i, y, x]`. The spatial layout
/// is kept as is. Every new filter carries the mean of the old biases.
pub fn flip_filters_spatially(bank: &FilterBank) -> TensorResult<FilterBank> {
    let k = bank.len();
    let old_shape = bank.filter_shape();
    let new_shape = Shape3::new(k, old_shape.height, old_shape.width);
    let bias = bank.filters().iter().map(|f| f.bias() / k as f32).sum::<f32>();
    let flipped = (0..old_shape.depth)
        .map(|i| {
            let mut weights = Tensor3::zeros(new_shape);
            for (j, filter) in bank.filters().iter().enumerate() {
                for y in 0..new_shape.height {
                    for x in 0..new_shape.width {
                        weights.set(j, y, x, filter.weights().get(i, y, x));
                    }
                }
            }
            Filter::new(weights, bias)
        })
        .collect();
    FilterBank::new(flipped)
}
