use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid amount: {0} (must be greater than zero)")]
    InvalidAmount(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient pending balance for {user}: have {pending}, need {requested}")]
    InsufficientPending {
        user: String,
        pending: u64,
        requested: u64,
    },

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Transport failure: {0}")]
    TransportFailure(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),
}

impl Error {
    /// Failures a redelivery of the triggering event may cure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::UpstreamUnavailable(_) | Error::TransportFailure(_) | Error::StorageError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
