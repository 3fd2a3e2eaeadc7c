//! Session errors and the coarse error kinds reported to the error sink.

use content_directory::DirectoryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::presentation::{ContentKind, PresentationError};
use crate::quiz::QuizDataError;

pub type Result<T> = std::result::Result<T, SessionError>;

/// Coarse classification of a failed resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Parse,
    UnsupportedType,
    InvalidMetadata,
    AssetLoad,
    Presentation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Parse => "parse",
            ErrorKind::UnsupportedType => "unsupported_type",
            ErrorKind::InvalidMetadata => "invalid_metadata",
            ErrorKind::AssetLoad => "asset_load",
            ErrorKind::Presentation => "presentation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("unsupported content type '{0}'")]
    UnsupportedType(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid quiz data: {0}")]
    QuizData(#[from] QuizDataError),

    /// Anchored content resolved but no tracked marker pose is available.
    #[error("no marker anchor available for {0}")]
    MissingAnchor(ContentKind),

    #[error("no local sample registered for '{0}'")]
    UnknownSample(String),

    #[error("failed to read local sample {}: {source}", .path.display())]
    LocalAsset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Presentation(#[from] PresentationError),

    #[error("{stage} timed out after {limit:?}")]
    Timeout { stage: &'static str, limit: Duration },
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Directory(e) => match e {
                DirectoryError::Parse { .. } => ErrorKind::Parse,
                DirectoryError::AssetLoad { .. } => ErrorKind::AssetLoad,
                DirectoryError::Empty(_) => ErrorKind::Parse,
                DirectoryError::Network { .. }
                | DirectoryError::Timeout { .. }
                | DirectoryError::Status { .. }
                | DirectoryError::InvalidUrl { .. } => ErrorKind::Network,
            },
            SessionError::UnsupportedType(_) | SessionError::UnknownSample(_) => {
                ErrorKind::UnsupportedType
            }
            SessionError::InvalidMetadata(_) | SessionError::QuizData(_) => {
                ErrorKind::InvalidMetadata
            }
            SessionError::MissingAnchor(_) => ErrorKind::Presentation,
            SessionError::LocalAsset { .. } => ErrorKind::AssetLoad,
            SessionError::Presentation(PresentationError::AssetMissing { .. }) => {
                ErrorKind::AssetLoad
            }
            SessionError::Presentation(_) => ErrorKind::Presentation,
            SessionError::Timeout { .. } => ErrorKind::Network,
        }
    }

    pub fn invalid_metadata(message: impl Into<String>) -> Self {
        SessionError::InvalidMetadata(message.into())
    }
}
