//! Session state, request ids and the transition log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::marker::MarkerKind;
use crate::presentation::{ContentHandle, ContentKind};
use crate::tracking::TrackedMarkers;

const HISTORY_LIMIT: usize = 32;

/// Resolution lifecycle. At most one resolution or presentation is ever in
/// flight; everything outside `Idle` rejects new triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    /// A lookup and/or asset load is running.
    Pending,
    Presenting,
    /// Content is being torn down.
    Closing,
}

impl SessionState {
    pub fn is_idle(self) -> bool {
        self == SessionState::Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Pending => "pending",
            SessionState::Presenting => "presenting",
            SessionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Monotonic id of one resolution attempt. Results carrying a superseded id
/// are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// The one piece of content on screen. Not `Clone`: the session
/// owns it until teardown hands it back to the presenter.
#[derive(Debug, PartialEq, Eq)]
pub struct ActiveContentHandle {
    handle: ContentHandle,
    kind: ContentKind,
}

impl ActiveContentHandle {
    pub(crate) fn new(handle: ContentHandle, kind: ContentKind) -> Self {
        Self { handle, kind }
    }

    pub fn handle(&self) -> ContentHandle {
        self.handle
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub(crate) fn into_handle(self) -> ContentHandle {
        self.handle
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub at: DateTime<Utc>,
    pub request: Option<RequestId>,
    pub reason: String,
}

/// Read-only view of the session for the UI and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub request: Option<RequestId>,
    pub marker_kind: Option<MarkerKind>,
    pub content_kind: Option<ContentKind>,
    pub has_content: bool,
    pub tracked_markers: usize,
    pub history: Vec<StateTransition>,
}

/// Mutable session data behind the resolver's lock.
#[derive(Debug, Default)]
pub(crate) struct SessionCore {
    state: SessionState,
    next_request: u64,
    active_request: Option<RequestId>,
    marker_kind: Option<MarkerKind>,
    content_kind: Option<ContentKind>,
    content: Option<ActiveContentHandle>,
    history: VecDeque<StateTransition>,
    pub(crate) tracked: TrackedMarkers,
}

impl SessionCore {
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn content_kind(&self) -> Option<ContentKind> {
        self.content_kind
    }

    fn transition(&mut self, to: SessionState, reason: impl Into<String>) {
        let from = self.state;
        self.state = to;
        if self.history.len() == HISTORY_LIMIT {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from,
            to,
            at: Utc::now(),
            request: self.active_request,
            reason: reason.into(),
        });
    }

    /// `Idle -> Pending`. Returns the new request id, or `None` when busy.
    pub(crate) fn begin(&mut self, marker_kind: MarkerKind) -> Option<RequestId> {
        if self.state != SessionState::Idle {
            return None;
        }
        self.next_request += 1;
        let request = RequestId(self.next_request);
        self.active_request = Some(request);
        self.marker_kind = Some(marker_kind);
        self.content_kind = None;
        self.transition(SessionState::Pending, "marker detected");
        Some(request)
    }

    /// True while `request` is the pending resolution.
    pub(crate) fn is_current(&self, request: RequestId) -> bool {
        self.state == SessionState::Pending && self.active_request == Some(request)
    }

    pub(crate) fn set_content_kind(&mut self, request: RequestId, kind: ContentKind) {
        if self.is_current(request) {
            self.content_kind = Some(kind);
        }
    }

    /// `Pending -> Presenting`. A stale request gets its handle back so the
    /// caller can destroy it.
    pub(crate) fn present(
        &mut self,
        request: RequestId,
        content: ActiveContentHandle,
    ) -> Result<(), ActiveContentHandle> {
        if !self.is_current(request) {
            return Err(content);
        }
        self.content_kind = Some(content.kind());
        self.content = Some(content);
        self.transition(SessionState::Presenting, "content ready");
        Ok(())
    }

    /// `Pending -> Idle` after an error. False when `request` is stale.
    pub(crate) fn fail(&mut self, request: RequestId, reason: impl Into<String>) -> bool {
        if !self.is_current(request) {
            return false;
        }
        self.reset(reason);
        true
    }

    /// Drop the pending resolution. Its late result will be discarded.
    pub(crate) fn abandon_pending(&mut self) -> Option<RequestId> {
        if self.state != SessionState::Pending {
            return None;
        }
        let request = self.active_request;
        self.reset("abandoned");
        request
    }

    /// `Presenting -> Closing`, taking the content handle for teardown.
    pub(crate) fn begin_close(
        &mut self,
    ) -> Option<(Option<ActiveContentHandle>, Option<ContentKind>)> {
        if self.state != SessionState::Presenting {
            return None;
        }
        let content = self.content.take();
        let kind = self.content_kind;
        self.transition(SessionState::Closing, "presentation closed");
        Some((content, kind))
    }

    /// `Closing -> Idle`.
    pub(crate) fn finish_close(&mut self) -> bool {
        if self.state != SessionState::Closing {
            return false;
        }
        self.reset("teardown complete");
        true
    }

    fn reset(&mut self, reason: impl Into<String>) {
        self.transition(SessionState::Idle, reason);
        self.active_request = None;
        self.marker_kind = None;
        self.content_kind = None;
        self.content = None;
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            request: self.active_request,
            marker_kind: self.marker_kind,
            content_kind: self.content_kind,
            has_content: self.content.is_some(),
            tracked_markers: self.tracked.len(),
            history: self.history.iter().cloned().collect(),
        }
    }
}
