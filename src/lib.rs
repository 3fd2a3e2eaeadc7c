//! Marker-triggered AR content session.
//!
//! A tracked image or decoded QR code is resolved through a
//! [`ContentDirectory`](content_directory::ContentDirectory), classified into
//! a presentation kind and handed to a [`Presenter`]. One resolution or
//! presentation is in flight at a time; the [`ScanGate`] re-opens when the
//! session returns to idle.

pub mod config;
pub mod error;
pub mod feed;
pub mod marker;
pub mod presentation;
pub mod qr;
pub mod quiz;
pub mod reference_library;
pub mod scan_gate;
pub mod session;
pub mod tracking;

pub use config::{LocalTestingConfig, ReferenceLibraryConfig, SessionConfig, SessionOptions};
pub use error::{ErrorKind, Result, SessionError};
pub use feed::{FeedEvent, SessionDriver};
pub use marker::{
    MarkerAnchor, MarkerIdentity, MarkerKind, PhysicalSize, Pose, TrackableId, TrackedMarker,
    TrackingState,
};
pub use presentation::{
    AssetLoader, Collaborators, ContentHandle, ContentKind, ErrorSink, Hud, ModelPresentation,
    OverlayVideo, PopupVideo, PresentationError, Presenter, QuizPresentation, TracingErrorSink,
};
pub use qr::{extract_short_code, QrCodeDetector, QrDecodeOutcome};
pub use quiz::{AnswerSlot, AnswerVerdict, QuizAnswerSet, QuizContent, QuizDataError};
pub use reference_library::{ReferenceImage, ReferenceLibrarySync, SyncReport};
pub use scan_gate::{ScanAffordance, ScanGate};
pub use session::{
    BehaviorResolver, IgnoreReason, LocalCatalog, RequestId, ResolutionOutcome, SessionSnapshot,
    SessionState, VideoMode,
};
pub use tracking::{CandidatePolicy, TrackablesChanged, TrackedMarkers};
