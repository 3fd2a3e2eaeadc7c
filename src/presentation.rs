//! Presentation-side seams: the presenter that shows content, the HUD, the
//! asset loader and the error sink. The session core only talks to these
//! traits.

use async_trait::async_trait;
use content_directory::{BundleHandle, ImageHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::error::SessionError;
use crate::marker::{MarkerAnchor, PhysicalSize};
use crate::quiz::QuizContent;

/// Presentation kinds; each is a distinct UI mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Full-screen video, no anchor.
    OverlayVideo,
    /// Video anchored to the marker and scaled to its physical size.
    PopupVideo,
    Quiz,
    /// 3D model from an asset bundle, anchored to the marker.
    Model,
}

impl ContentKind {
    pub fn needs_anchor(self) -> bool {
        matches!(self, ContentKind::PopupVideo | ContentKind::Model)
    }

    /// Anchored kinds switch the HUD to preview mode instead of hiding it.
    pub fn uses_preview_mode(self) -> bool {
        self.needs_anchor()
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::OverlayVideo => "overlay video",
            ContentKind::PopupVideo => "popup video",
            ContentKind::Quiz => "quiz",
            ContentKind::Model => "model",
        };
        f.write_str(name)
    }
}

/// Opaque handle to content the presenter is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHandle(u64);

impl ContentHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayVideo {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopupVideo {
    pub url: String,
    pub anchor: MarkerAnchor,
    pub scale: PhysicalSize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizPresentation {
    pub quiz: QuizContent,
    /// Missing when the quiz has no image or the download failed.
    pub icon: Option<ImageHandle>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelPresentation {
    pub bundle: BundleHandle,
    pub asset_name: String,
    pub anchor: MarkerAnchor,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresentationError {
    #[error("media playback failed: {0}")]
    Playback(String),

    #[error("asset '{asset}' not found in bundle {bundle}")]
    AssetMissing { asset: String, bundle: String },

    #[error("presenter rejected content: {0}")]
    Rejected(String),
}

/// Shows resolved content. Each `show_*` resolves once the content is on
/// screen and returns a handle the session later passes to `destroy`.
#[async_trait]
pub trait Presenter: Send + Sync {
    async fn show_overlay_video(
        &self,
        video: OverlayVideo,
    ) -> Result<ContentHandle, PresentationError>;

    async fn show_popup_video(&self, video: PopupVideo) -> Result<ContentHandle, PresentationError>;

    async fn show_quiz(&self, quiz: QuizPresentation) -> Result<ContentHandle, PresentationError>;

    async fn show_model(
        &self,
        model: ModelPresentation,
    ) -> Result<ContentHandle, PresentationError>;

    fn destroy(&self, handle: ContentHandle);
}

pub trait Hud: Send + Sync {
    fn set_loading(&self, visible: bool);

    fn set_hud_visible(&self, visible: bool);

    /// Preview mode keeps the camera view clear around anchored content.
    fn set_preview_mode(&self, enabled: bool);
}

pub trait AssetLoader: Send + Sync {
    /// Unload every loaded bundle. Called after model content closes.
    fn release_all_bundles(&self);
}

/// Receives errors that ended a resolution.
pub trait ErrorSink: Send + Sync {
    fn report(&self, error: &SessionError);
}

/// Logs reported errors with their kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: &SessionError) {
        tracing::error!(kind = %error.kind(), "{error}");
    }
}

/// Everything the session needs on the presentation side.
#[derive(Clone)]
pub struct Collaborators {
    pub presenter: Arc<dyn Presenter>,
    pub hud: Arc<dyn Hud>,
    pub asset_loader: Arc<dyn AssetLoader>,
    pub error_sink: Arc<dyn ErrorSink>,
}

impl Collaborators {
    pub fn new(
        presenter: Arc<dyn Presenter>,
        hud: Arc<dyn Hud>,
        asset_loader: Arc<dyn AssetLoader>,
    ) -> Self {
        Self {
            presenter,
            hud,
            asset_loader,
            error_sink: Arc::new(TracingErrorSink),
        }
    }

    pub fn with_error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
