use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::fs::File;

use crate::conv::ConvLayer;
use crate::error::{TensorError, TensorResult};
use crate::traits::ConfigFS;

fn check_json_path(path: &str) -> TensorResult<()> {
    if !path.ends_with(".json") {
        return Err(TensorError::Io(format!("{} is not a .json path", path)));
    }
    Ok(())
}

pub(crate) async fn write_json<T: Serialize>(value: &T, path: &str) -> TensorResult<()> {
    check_json_path(path)?;
    let pretty_json = serde_json::to_string_pretty(value)?;
    let data_file = File::create(path).await?;
    let mut data_file = BufWriter::new(data_file);
    data_file.write_all(pretty_json.as_bytes()).await?;
    data_file.flush().await?;
    Ok(())
}

pub(crate) async fn read_json<T: DeserializeOwned>(path: &str) -> TensorResult<T> {
    check_json_path(path)?;
    let mut file = File::open(path).await?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).await?;
    Ok(serde_json::from_str(&contents)?)
}

impl ConfigFS for ConvLayer {
    type OutType = Self;
    async fn read(path: &str) -> TensorResult<Self::OutType> {
        read_json(path).await
    }
    async fn save(&self, path: &str) -> TensorResult<()> {
        write_json(self, path).await
    }
}
