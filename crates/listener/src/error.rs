use thiserror::Error;

use crate::client::ClientError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("client error: {0}")]
    Client(#[from] ClientError),
    #[error("invalid settings: {0}")]
    Invalid(String),
}
