use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimqError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Local pre-process failed: {0}")]
    LocalPreprocess(String),

    #[error("Remote operation failed: {0}")]
    RemoteOperation(String),

    #[error("Remote job failed: {reason} (rc: {exit_code:?})")]
    RemoteJob {
        reason: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Scheduler command failed: {0}")]
    RemoteScheduler(String),

    #[error("Seed assignment failed: {0}")]
    Seed(String),

    #[error("Model error: {0}")]
    Model(String),
}

pub type Error = SimqError;
pub type Result<T> = std::result::Result<T, Error>;
