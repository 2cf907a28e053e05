use tensor::TensorError;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrainingError {
    #[error("dataset has no samples to train or evaluate on")]
    EmptyDataset,
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

pub type TrainingResult<T> = Result<T, TrainingError>;
