//! Directory client errors.

use thiserror::Error;

/// Error returned by any [`ContentDirectory`](crate::ContentDirectory) call.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// Connection or protocol failure before a response arrived.
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The backend answered with a non-success status.
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("failed to parse response from {url}: {message}")]
    Parse { url: String, message: String },

    #[error("invalid endpoint '{endpoint}': {message}")]
    InvalidUrl { endpoint: String, message: String },

    /// A bundle, image or file could not be loaded.
    #[error("asset unavailable at {location}: {message}")]
    AssetLoad { location: String, message: String },

    /// A listing endpoint answered with nothing usable.
    #[error("{0}")]
    Empty(String),
}

impl DirectoryError {
    /// Transport-level failures: the request never produced a usable answer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DirectoryError::Network { .. }
                | DirectoryError::Timeout { .. }
                | DirectoryError::Status { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DirectoryError::Timeout { .. })
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DirectoryError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_decode() {
            DirectoryError::Parse {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            DirectoryError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn parse(url: &str, err: serde_json::Error) -> Self {
        DirectoryError::Parse {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
