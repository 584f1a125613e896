use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrtmError {
    #[error("Invalid fetch configuration: {0}")]
    InvalidConfig(String),

    #[error("Could not lock {path:?} within {waited:?}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("Empty answer for stop {cod_stop:?}")]
    EmptyAnswer { cod_stop: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("Fetch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, CrtmError>;
