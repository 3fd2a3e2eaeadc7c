//! Marker session: classification, the resolution state machine and the
//! local testing catalogue.

mod classifier;
mod local;
mod resolver;
mod state;

pub use classifier::{
    asset_name_for, classify, video_mode_tag, ContentPlan, QuizSource, VideoMode, FILENAME_FIELD,
    QUIZ_ID_FIELD,
};
pub use local::{sample_for, LocalCatalog, LocalSample};
pub use resolver::{BehaviorResolver, IgnoreReason, ResolutionOutcome};
pub use state::{ActiveContentHandle, RequestId, SessionSnapshot, SessionState, StateTransition};
