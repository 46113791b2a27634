//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// `--config` named a file that does not exist.
    #[error("config file not found at {path}")]
    ConfigNotFound { path: PathBuf },

    #[error(transparent)]
    Config(#[from] runtime::ConfigError),

    /// The logging subscriber could not be installed.
    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
