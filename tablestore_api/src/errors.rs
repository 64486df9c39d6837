//! Error types for the table store client.

/// Errors that can occur when talking to the table store.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An HTTP request failed (network error or timeout).
    #[error("Request failed")]
    RequestFailed,
    /// The store returned a non-success status with a body snippet.
    #[error("Request failed with status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    /// The response body could not be deserialized.
    #[error("Failed to parse response: {0}")]
    Parse(String),
    /// Rows could not be serialized into a request body.
    #[error("Failed to serialize rows: {0}")]
    Serialize(String),
    /// The base URL or table name did not form a valid URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// A delete without any filter would wipe the whole table.
    #[error("Refusing to delete from {0} without a filter")]
    UnfilteredDelete(String),
}

impl Error {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::RequestFailed => true,
            Error::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
