use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("not authorized")]
    Unauthorized,
    #[error("unknown page cursor: {0}")]
    InvalidCursor(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("track file decode error: {0}")]
    Decode(#[from] serde_yaml::Error),
}
