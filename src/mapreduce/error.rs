use std::path::PathBuf;

use thiserror::Error;
use tonic::Status;

pub type TaskResult<T> = Result<T, TaskError>;

/// Failure of a single map or reduce task. Reported back to the caller of `RunTask`; the worker
/// keeps serving.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("user function panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TaskError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<TaskError> for Status {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::InvalidTask(_) => Status::invalid_argument(err.to_string()),
            _ => Status::internal(err.to_string()),
        }
    }
}

/// Fatal errors of the worker process itself.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create work directory {path}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot reach coordinator at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("coordinator rejected registration: {0}")]
    Register(Status),

    #[error("worker server failed: {0}")]
    Serve(#[from] tonic::transport::Error),

    #[error("worker server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("cannot read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
