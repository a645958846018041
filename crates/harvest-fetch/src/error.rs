use thiserror::Error;

use harvest_store::StoreError;

pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Error, Debug)]
pub enum FetchError {
    /// The controller answered with an error status.
    #[error("controller returned {status} for {what}")]
    Controller { status: u16, what: String },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("malformed controller response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
