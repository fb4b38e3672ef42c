use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Watch terminated: {0}")]
    WatchFailed(String),

    #[error("Missing field: {0}")]
    MissingField(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Fatal errors crash the process; the orchestrator restarts it.
    /// Everything else is absorbed by the next reconciliation pass.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::InvalidConfig(_) => true,
            Error::WatchFailed(_) => true,
            _ => false,
        }
    }
}
