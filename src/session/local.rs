//! Local testing mode: a fixed catalogue of bundled samples served after a
//! simulated delay, with no directory calls.

use content_directory::{BundleHandle, ImageHandle, QuizPayload};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::LocalTestingConfig;
use crate::error::SessionError;
use crate::marker::{MarkerIdentity, MarkerKind};
use crate::quiz::QuizContent;
use crate::session::resolver::PreparedContent;

pub const SAMPLE_IMAGE_FILE: &str = "singapore-orchids1.jpg";
pub const SAMPLE_VIDEO_FILE: &str = "SampleVideo.mp4";
pub const SAMPLE_BUNDLE: &str = "ParentMerlionFab";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSample {
    Quiz,
    OverlayVideo,
    PopupVideo,
    Model,
}

/// Sample registered for an identity. Image names and QR codes each have
/// their own literal.
pub fn sample_for(identity: &MarkerIdentity) -> Option<LocalSample> {
    match (identity.kind(), identity.key()) {
        (MarkerKind::Image, "ParentAlienVideo") | (MarkerKind::Qr, "jSzOjv") => {
            Some(LocalSample::Quiz)
        }
        (MarkerKind::Image, "ParentFabVideo-1") | (MarkerKind::Qr, "rYb8cS") => {
            Some(LocalSample::OverlayVideo)
        }
        (MarkerKind::Image, "ParentSunPrefab") | (MarkerKind::Qr, "1V2S2S") => {
            Some(LocalSample::PopupVideo)
        }
        (MarkerKind::Image, "ParentMerlionFab") | (MarkerKind::Qr, "1FENoV") => {
            Some(LocalSample::Model)
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct LocalCatalog {
    config: LocalTestingConfig,
}

impl LocalCatalog {
    pub fn new(config: LocalTestingConfig) -> Self {
        Self { config }
    }

    pub fn delay(&self) -> Duration {
        self.config.simulated_delay()
    }

    pub fn sample_image_path(&self) -> PathBuf {
        self.config.sample_assets_dir.join(SAMPLE_IMAGE_FILE)
    }

    pub fn sample_clip_url(&self) -> String {
        file_url(&self.config.sample_assets_dir.join(SAMPLE_VIDEO_FILE))
    }

    pub fn model_bundle_path(&self) -> PathBuf {
        self.config.asset_bundle_dir.join(SAMPLE_BUNDLE)
    }

    pub fn sample_quiz(&self) -> QuizPayload {
        QuizPayload {
            id: None,
            questions: Some("what is the national flower of singapore".into()),
            answer_a: Some("Sunflower".into()),
            answer_b: Some("Epidendrum Orchid".into()),
            answer_c: Some("Vanda Miss Joaquim Orchid".into()),
            answer_d: Some("Brassavola Orchid".into()),
            correct_answer: Some("Vanda Miss Joaquim Orchid".into()),
            explanation: Some(
                "Papilionanthe Miss Joaquim, Also known as the Singapore orchid, this hybrid \
                 orchid is the national flower of Singapore. It was chosen for its resilience \
                 and vibrant colors."
                    .into(),
            ),
            image: Some(self.sample_image_path().display().to_string()),
        }
    }

    pub(crate) async fn prepare(
        &self,
        identity: &MarkerIdentity,
    ) -> Result<PreparedContent, SessionError> {
        let sample =
            sample_for(identity).ok_or_else(|| SessionError::UnknownSample(identity.to_string()))?;

        tracing::info!(%identity, ?sample, delay = ?self.delay(), "Serving local sample");
        tokio::time::sleep(self.delay()).await;

        match sample {
            LocalSample::Quiz => {
                let quiz = QuizContent::from_payload(&self.sample_quiz())?;
                let icon = self.read_icon().await;
                Ok(PreparedContent::Quiz { quiz, icon })
            }
            LocalSample::OverlayVideo => Ok(PreparedContent::OverlayVideo {
                url: self.sample_clip_url(),
            }),
            LocalSample::PopupVideo => Ok(PreparedContent::PopupVideo {
                url: self.sample_clip_url(),
            }),
            LocalSample::Model => {
                let path = self.model_bundle_path();
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| SessionError::LocalAsset {
                        path: path.clone(),
                        source,
                    })?;
                Ok(PreparedContent::Model {
                    bundle: BundleHandle {
                        location: file_url(&path),
                        bytes,
                    },
                    asset_name: SAMPLE_BUNDLE.to_string(),
                })
            }
        }
    }

    /// The quiz is still shown without its icon when the image is missing.
    async fn read_icon(&self) -> Option<ImageHandle> {
        let path = self.sample_image_path();
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(ImageHandle {
                location: file_url(&path),
                content_type: Some("image/jpeg".into()),
                bytes,
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Sample quiz image unavailable");
                None
            }
        }
    }
}

fn file_url(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    url::Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| path.display().to_string())
}
