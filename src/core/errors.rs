use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("runtime is not ready")]
    RuntimeNotReady,

    #[error("runtime bootstrap failed: {0}")]
    BootstrapFailed(String),

    /// The submitted code raised. Carries the exception text only.
    #[error("{0}")]
    Evaluation(String),

    #[error("runtime protocol error: {0}")]
    Protocol(String),

    /// The interpreter process is gone or its channel can no longer be
    /// trusted. The instance must be replaced.
    #[error("runtime lost: {0}")]
    RuntimeLost(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for HarnessError {
    fn from(e: serde_json::Error) -> Self {
        HarnessError::Protocol(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
