use rand::{seq::SliceRandom, RngCore};
use tensor::{error::check_shape, Shape3, Tensor3};

use crate::error::{TrainingError, TrainingResult};

const MIN_STD: f32 = 1e-8;

/// One input with the output the network should produce for it.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Sample {
    pub input: Tensor3,
    pub output: Tensor3,
}

impl Sample {
    pub fn new(input: Tensor3, output: Tensor3) -> Self {
        Self { input, output }
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize, serde::Serialize)]
pub struct Dataset {
    pub training: Vec<Sample>,
    pub test: Vec<Sample>,
}

/// Per-position statistics of a set of equally shaped tensors.
#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Normalization {
    pub shape: Shape3,
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Normalization {
    /// Mean and standard deviation of every value position.
    pub fn fit<'a>(tensors: impl IntoIterator<Item = &'a Tensor3>) -> TrainingResult<Self> {
        let mut tensors = tensors.into_iter().peekable();
        let shape = tensors.peek().map(|t| t.shape()).ok_or(TrainingError::EmptyDataset)?;
        let mut sum = vec![0.0f64; shape.volume()];
        let mut sum_sq = vec![0.0f64; shape.volume()];
        let mut count = 0usize;
        for t in tensors {
            check_shape("normalized tensor", shape, t.shape())?;
            for ((s, q), v) in sum.iter_mut().zip(sum_sq.iter_mut()).zip(t.values()) {
                *s += *v as f64;
                *q += (*v as f64) * (*v as f64);
            }
            count += 1;
        }
        let n = count as f64;
        let mean: Vec<f32> = sum.iter().map(|s| (s / n) as f32).collect();
        let std = sum
            .iter()
            .zip(sum_sq.iter())
            .map(|(s, q)| {
                let m = s / n;
                ((q / n - m * m).max(0.0).sqrt() as f32).max(MIN_STD)
            })
            .collect();
        Ok(Self { shape, mean, std })
    }

    pub fn apply(&self, tensor: &Tensor3) -> TrainingResult<Tensor3> {
        check_shape("normalized tensor", self.shape, tensor.shape())?;
        let values = tensor
            .values()
            .iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(v, (m, s))| (v - m) / s)
            .collect();
        Ok(Tensor3::from_values(self.shape, values)?)
    }

    /// Maps a normalized tensor back to the original scale.
    pub fn revert(&self, tensor: &Tensor3) -> TrainingResult<Tensor3> {
        check_shape("normalized tensor", self.shape, tensor.shape())?;
        let values = tensor
            .values()
            .iter()
            .zip(self.mean.iter().zip(self.std.iter()))
            .map(|(v, (m, s))| v * s + m)
            .collect();
        Ok(Tensor3::from_values(self.shape, values)?)
    }
}

impl Dataset {
    pub fn new(training: Vec<Sample>, test: Vec<Sample>) -> Self {
        Self { training, test }
    }

    /// Shuffles `samples` and keeps `test_fraction` of them for testing.
    pub fn split(mut samples: Vec<Sample>, test_fraction: f32, rng: &mut dyn RngCore) -> Self {
        samples.shuffle(rng);
        let n_test = ((samples.len() as f32) * test_fraction.clamp(0.0, 1.0)).round() as usize;
        let training = samples.split_off(n_test);
        Self { training, test: samples }
    }

    /// Zero-mean, unit-variance inputs, with statistics taken from the training set.
    pub fn normalize_inputs(&mut self) -> TrainingResult<Normalization> {
        let norm = Normalization::fit(self.training.iter().map(|s| &s.input))?;
        for sample in self.training.iter_mut().chain(self.test.iter_mut()) {
            sample.input = norm.apply(&sample.input)?;
        }
        Ok(norm)
    }

    pub fn normalize_outputs(&mut self) -> TrainingResult<Normalization> {
        let norm = Normalization::fit(self.training.iter().map(|s| &s.output))?;
        for sample in self.training.iter_mut().chain(self.test.iter_mut()) {
            sample.output = norm.apply(&sample.output)?;
        }
        Ok(norm)
    }
}
