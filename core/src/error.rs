use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("discovery error: {0}")]
    Discovery(String),
    #[error("archive tool error: {0}")]
    Archive(String),
    #[error("upload error: {0}")]
    Upload(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
