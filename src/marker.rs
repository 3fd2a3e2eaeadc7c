//! Marker identities, poses and tracked trackables.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of physical marker produced an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Image,
    Qr,
    Invalid,
}

/// Lookup key into the content directory: a reference-image name or a QR
/// short code. Empty names and codes are `Invalid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerIdentity {
    kind: MarkerKind,
    key: String,
}

impl MarkerIdentity {
    pub fn image(name: impl Into<String>) -> Self {
        Self::checked(MarkerKind::Image, name.into())
    }

    pub fn short_code(code: impl Into<String>) -> Self {
        Self::checked(MarkerKind::Qr, code.into())
    }

    pub fn invalid() -> Self {
        Self {
            kind: MarkerKind::Invalid,
            key: String::new(),
        }
    }

    fn checked(kind: MarkerKind, key: String) -> Self {
        let key = key.trim().to_string();
        if key.is_empty() {
            Self::invalid()
        } else {
            Self { kind, key }
        }
    }

    pub fn kind(&self) -> MarkerKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_valid(&self) -> bool {
        self.kind != MarkerKind::Invalid
    }
}

impl fmt::Display for MarkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MarkerKind::Image => write!(f, "image:{}", self.key),
            MarkerKind::Qr => write!(f, "qr:{}", self.key),
            MarkerKind::Invalid => f.write_str("invalid"),
        }
    }
}

/// Identifier the tracking feed assigns to a trackable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackableId(pub u64);

impl fmt::Display for TrackableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trackable-{}", self.0)
    }
}

/// World-space pose; rotation is a unit quaternion `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Physical marker size in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalSize {
    pub width: f32,
    pub height: f32,
}

impl PhysicalSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for PhysicalSize {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    #[default]
    None,
    Limited,
    Tracking,
}

/// Where content triggered by a marker is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerAnchor {
    pub trackable_id: Option<TrackableId>,
    pub pose: Pose,
    pub size: PhysicalSize,
}

impl MarkerAnchor {
    pub fn new(pose: Pose, size: PhysicalSize) -> Self {
        Self {
            trackable_id: None,
            pose,
            size,
        }
    }

    /// Popup content is scaled to the marker's physical size.
    pub fn popup_scale(&self) -> PhysicalSize {
        self.size
    }
}

/// One trackable as reported by the tracking feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedMarker {
    pub trackable_id: TrackableId,
    /// Reference-image name; empty for QR-class trackables.
    #[serde(default)]
    pub reference_name: String,
    #[serde(default)]
    pub pose: Pose,
    #[serde(default)]
    pub size: PhysicalSize,
    #[serde(default)]
    pub state: TrackingState,
}

impl TrackedMarker {
    pub fn image(id: u64, name: impl Into<String>, state: TrackingState) -> Self {
        Self {
            trackable_id: TrackableId(id),
            reference_name: name.into(),
            pose: Pose::default(),
            size: PhysicalSize::default(),
            state,
        }
    }

    pub fn qr(id: u64, state: TrackingState) -> Self {
        Self::image(id, "", state)
    }

    pub fn with_size(mut self, size: PhysicalSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_pose(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    /// Image identity; `Invalid` for QR-class trackables, whose identity only
    /// becomes known once the code is decoded.
    pub fn identity(&self) -> MarkerIdentity {
        MarkerIdentity::image(self.reference_name.as_str())
    }

    pub fn is_qr_class(&self) -> bool {
        self.reference_name.trim().is_empty()
    }

    pub fn is_tracking(&self) -> bool {
        self.state == TrackingState::Tracking
    }

    pub fn anchor(&self) -> MarkerAnchor {
        MarkerAnchor {
            trackable_id: Some(self.trackable_id),
            pose: self.pose,
            size: self.size,
        }
    }
}
