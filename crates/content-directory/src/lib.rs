//! ContentDirectory trait: the only boundary between the marker session and
//! the remote content backend. The session crate depends on this trait, never
//! on the HTTP transport directly.

pub mod catalogue;
pub mod error;
pub mod http;
pub mod types;

use async_trait::async_trait;

pub use catalogue::{NewQuiz, ObjectUpdate, QuizQuestion};
pub use error::DirectoryError;
pub use http::{resolve_endpoint, DirectoryConfig, HttpDirectoryClient, API_KEY_HEADER};
pub use types::{
    BundleHandle, ContentDescriptor, ContentMetadata, ContentType, FileCollection, FileEntry,
    ImageHandle, QuizPayload, ShortUrlRecord,
};

pub type Result<T> = std::result::Result<T, DirectoryError>;

/// Asynchronous, single-shot lookups against the content backend.
///
/// No operation retries. Every error carries a human-readable message.
#[async_trait]
pub trait ContentDirectory: Send + Sync {
    /// Resolve an image marker's reference name to its content descriptor.
    async fn resolve_by_identity(&self, identity: &str) -> Result<ContentDescriptor>;

    /// Resolve a QR short code to its content descriptor.
    async fn resolve_by_short_code(&self, short_code: &str) -> Result<ContentDescriptor>;

    /// Secondary quiz lookup used when descriptor metadata carries a `quiz_id`.
    async fn fetch_quiz_by_id(&self, quiz_id: &str) -> Result<QuizPayload>;

    /// Direct quiz fetch of a descriptor's payload reference.
    async fn fetch_quiz_at(&self, location: &str) -> Result<QuizPayload>;

    async fn fetch_asset_bundle(&self, location: &str) -> Result<BundleHandle>;

    /// Fetch an image by URL, or by file id when `location` is not a URL.
    async fn fetch_image(&self, location: &str) -> Result<ImageHandle>;

    async fn fetch_file_collection(&self, collection_id: &str) -> Result<FileCollection>;

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;
}
