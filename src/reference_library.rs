//! Runtime reference-image library: downloads a backend file collection into
//! a local cache and names each image for the tracker.

use content_directory::{ContentDirectory, DirectoryError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ReferenceLibraryConfig;

pub const IMAGE_NAME_PREFIX: &str = "DynamicImage_";

/// One image ready to add to the tracker's reference library.
#[derive(Clone, PartialEq, Serialize)]
pub struct ReferenceImage {
    pub name: String,
    pub file_id: String,
    pub cache_path: PathBuf,
    pub physical_width_m: f32,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("name", &self.name)
            .field("file_id", &self.file_id)
            .field("cache_path", &self.cache_path)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub images: Vec<ReferenceImage>,
    pub cache_hits: usize,
    pub downloaded: usize,
    /// File ids that could not be loaded; they are left out of the library.
    pub skipped: Vec<String>,
}

pub struct ReferenceLibrarySync {
    directory: Arc<dyn ContentDirectory>,
    config: ReferenceLibraryConfig,
}

impl ReferenceLibrarySync {
    pub fn new(directory: Arc<dyn ContentDirectory>, config: ReferenceLibraryConfig) -> Self {
        Self { directory, config }
    }

    pub fn cache_path(&self, file_id: &str) -> PathBuf {
        self.config.cache_dir.join(format!("{file_id}.jpg"))
    }

    /// Fetch the collection and load every file, from cache when present.
    /// Only a failed collection lookup is an error; individual files that
    /// fail are skipped.
    pub async fn sync(&self, collection_id: &str) -> Result<SyncReport, DirectoryError> {
        ensure_dir(&self.config.cache_dir).await;

        let collection = self.directory.fetch_file_collection(collection_id).await?;
        tracing::info!(
            collection = %collection_id,
            files = collection.files.len(),
            "Fetched reference image collection"
        );

        let mut report = SyncReport::default();
        for file in &collection.files {
            let path = self.cache_path(&file.file_id);

            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    report.cache_hits += 1;
                    bytes
                }
                Err(_) => match self.directory.download_file(&file.file_id).await {
                    Ok(bytes) => {
                        if let Err(e) = tokio::fs::write(&path, &bytes).await {
                            tracing::warn!(
                                path = %path.display(),
                                error = %e,
                                "Failed to cache reference image"
                            );
                        }
                        report.downloaded += 1;
                        bytes
                    }
                    Err(e) => {
                        tracing::error!(
                            file_id = %file.file_id,
                            error = %e,
                            "Skipping reference image"
                        );
                        report.skipped.push(file.file_id.clone());
                        continue;
                    }
                },
            };

            let name = format!("{IMAGE_NAME_PREFIX}{}", report.images.len());
            report.images.push(ReferenceImage {
                name,
                file_id: file.file_id.clone(),
                cache_path: path,
                physical_width_m: self.config.physical_width_m,
                bytes,
            });
        }

        tracing::info!(
            images = report.images.len(),
            cache_hits = report.cache_hits,
            downloaded = report.downloaded,
            skipped = report.skipped.len(),
            "Reference library synced"
        );
        Ok(report)
    }
}

async fn ensure_dir(dir: &Path) {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        tracing::warn!(dir = %dir.display(), error = %e, "Failed to create image cache folder");
    }
}
