//! Turns a content descriptor into a plan: which presentation kind, and what
//! still has to be fetched before it can be shown.

use content_directory::{ContentDescriptor, ContentMetadata, ContentType};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::presentation::ContentKind;

pub const QUIZ_ID_FIELD: &str = "quiz_id";
pub const FILENAME_FIELD: &str = "filename";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoMode {
    #[default]
    Overlay,
    Popup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizSource {
    /// Metadata carried a `quiz_id`; fetch through the quiz lookup.
    ById(String),
    /// Fetch the descriptor's payload reference directly.
    Direct(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPlan {
    Video {
        mode: VideoMode,
        url: String,
        /// Metadata named no mode; the configured default was used.
        defaulted: bool,
    },
    Quiz(QuizSource),
    Model {
        bundle_ref: String,
        asset_name: String,
    },
}

impl ContentPlan {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentPlan::Video {
                mode: VideoMode::Overlay,
                ..
            } => ContentKind::OverlayVideo,
            ContentPlan::Video {
                mode: VideoMode::Popup,
                ..
            } => ContentKind::PopupVideo,
            ContentPlan::Quiz(_) => ContentKind::Quiz,
            ContentPlan::Model { .. } => ContentKind::Model,
        }
    }
}

/// Video mode named by the metadata tag, if any. `popup` wins when both
/// words appear.
pub fn video_mode_tag(metadata: &ContentMetadata) -> Option<VideoMode> {
    let tag = metadata.raw().trim().to_lowercase();
    if tag.contains("popup") {
        Some(VideoMode::Popup)
    } else if tag.contains("overlay") {
        Some(VideoMode::Overlay)
    } else {
        None
    }
}

pub fn classify(
    descriptor: &ContentDescriptor,
    default_video_mode: VideoMode,
) -> Result<ContentPlan, SessionError> {
    match &descriptor.content_type {
        ContentType::Video => {
            let url = payload_ref(descriptor)?;
            let (mode, defaulted) = match video_mode_tag(&descriptor.metadata) {
                Some(mode) => (mode, false),
                None => {
                    tracing::warn!(
                        metadata = %descriptor.metadata.raw(),
                        mode = ?default_video_mode,
                        "Video metadata names no mode, using default"
                    );
                    (default_video_mode, true)
                }
            };
            Ok(ContentPlan::Video {
                mode,
                url,
                defaulted,
            })
        }
        ContentType::Quiz => classify_quiz(descriptor).map(ContentPlan::Quiz),
        ContentType::Model => {
            let bundle_ref = payload_ref(descriptor)?;
            let asset_name = asset_name_for(descriptor).ok_or_else(|| {
                SessionError::invalid_metadata(format!(
                    "cannot derive asset name from '{bundle_ref}'"
                ))
            })?;
            Ok(ContentPlan::Model {
                bundle_ref,
                asset_name,
            })
        }
        ContentType::Unknown(raw) => Err(SessionError::UnsupportedType(raw.clone())),
    }
}

fn classify_quiz(descriptor: &ContentDescriptor) -> Result<QuizSource, SessionError> {
    let metadata = &descriptor.metadata;

    if metadata.is_blank() {
        return direct_quiz(descriptor);
    }
    if !metadata.is_structured() {
        return Err(SessionError::invalid_metadata(format!(
            "quiz metadata is not a JSON object: '{}'",
            metadata.raw()
        )));
    }

    match metadata.get(QUIZ_ID_FIELD) {
        None => direct_quiz(descriptor),
        Some(_) => metadata
            .get_str(QUIZ_ID_FIELD)
            .map(QuizSource::ById)
            .ok_or_else(|| SessionError::invalid_metadata("quiz_id is empty")),
    }
}

fn direct_quiz(descriptor: &ContentDescriptor) -> Result<QuizSource, SessionError> {
    payload_ref(descriptor).map(QuizSource::Direct)
}

fn payload_ref(descriptor: &ContentDescriptor) -> Result<String, SessionError> {
    let payload = descriptor.payload_ref.trim();
    if payload.is_empty() {
        return Err(SessionError::invalid_metadata(format!(
            "{} descriptor has no payload reference",
            descriptor.content_type
        )));
    }
    Ok(payload.to_string())
}

/// Asset to load out of a model bundle: the metadata `filename`, else the last
/// path segment of the bundle reference.
pub fn asset_name_for(descriptor: &ContentDescriptor) -> Option<String> {
    if let Some(name) = descriptor.metadata.get_str(FILENAME_FIELD) {
        return Some(name);
    }

    let payload = descriptor.payload_ref.trim();
    let path = match url::Url::parse(payload) {
        Ok(url) => url.path().to_string(),
        Err(_) => payload.to_string(),
    };
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
