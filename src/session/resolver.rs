//! Behaviour resolver: the single-flight state machine that turns a detected
//! marker into on-screen content.
//!
//! All transitions happen under one short-lived lock that is never held across
//! an await point. Directory and presenter calls run outside the lock and
//! their results are committed only if their [`RequestId`] is still current.

use content_directory::{BundleHandle, ContentDirectory, DirectoryError, ImageHandle};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::{SessionConfig, SessionOptions};
use crate::error::{ErrorKind, SessionError};
use crate::marker::{MarkerAnchor, MarkerIdentity, MarkerKind};
use crate::presentation::{
    Collaborators, ContentHandle, ContentKind, ModelPresentation, OverlayVideo, PopupVideo,
    PresentationError, QuizPresentation,
};
use crate::quiz::{QuizContent, QuizDataError};
use crate::session::classifier::{classify, ContentPlan, QuizSource, VideoMode};
use crate::session::local::LocalCatalog;
use crate::session::state::{
    ActiveContentHandle, RequestId, SessionCore, SessionSnapshot, SessionState,
};
use crate::tracking::TrackablesChanged;

/// Why a trigger did not start a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Busy(SessionState),
    InvalidIdentity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionOutcome {
    Ignored(IgnoreReason),
    Presented { request: RequestId, kind: ContentKind },
    Failed { request: RequestId, kind: ErrorKind },
    /// The session moved on before the result arrived.
    Discarded { request: RequestId },
}

/// Content fetched and validated, ready for the presenter.
#[derive(Debug)]
pub(crate) enum PreparedContent {
    OverlayVideo { url: String },
    PopupVideo { url: String },
    Quiz { quiz: QuizContent, icon: Option<ImageHandle> },
    Model { bundle: BundleHandle, asset_name: String },
}

impl PreparedContent {
    fn kind(&self) -> ContentKind {
        match self {
            PreparedContent::OverlayVideo { .. } => ContentKind::OverlayVideo,
            PreparedContent::PopupVideo { .. } => ContentKind::PopupVideo,
            PreparedContent::Quiz { .. } => ContentKind::Quiz,
            PreparedContent::Model { .. } => ContentKind::Model,
        }
    }
}

#[derive(Debug)]
enum StageError {
    Stale,
    Failed(SessionError),
}

impl From<SessionError> for StageError {
    fn from(err: SessionError) -> Self {
        StageError::Failed(err)
    }
}

impl From<QuizDataError> for StageError {
    fn from(err: QuizDataError) -> Self {
        StageError::Failed(err.into())
    }
}

/// A resolution that won the `Idle -> Pending` transition.
#[derive(Debug, Clone)]
struct PendingResolution {
    request: RequestId,
    identity: MarkerIdentity,
    anchor: Option<MarkerAnchor>,
}

pub struct BehaviorResolver {
    core: Mutex<SessionCore>,
    state_tx: watch::Sender<SessionState>,
    directory: Arc<dyn ContentDirectory>,
    collaborators: Collaborators,
    options: SessionOptions,
    local: Option<LocalCatalog>,
}

impl std::fmt::Debug for BehaviorResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorResolver")
            .field("state", &self.state())
            .field("options", &self.options)
            .field("local_testing", &self.local.is_some())
            .finish_non_exhaustive()
    }
}

impl BehaviorResolver {
    pub fn new(
        directory: Arc<dyn ContentDirectory>,
        collaborators: Collaborators,
        options: SessionOptions,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            core: Mutex::new(SessionCore::default()),
            state_tx,
            directory,
            collaborators,
            options,
            local: None,
        }
    }

    /// Build from a loaded config; local testing is enabled when the config
    /// says so.
    pub fn from_config(
        directory: Arc<dyn ContentDirectory>,
        collaborators: Collaborators,
        config: &SessionConfig,
    ) -> Self {
        let resolver = Self::new(directory, collaborators, config.session.clone());
        if config.local_testing.enabled {
            tracing::warn!("Local testing mode enabled, directory lookups are bypassed");
            resolver.with_local_testing(LocalCatalog::new(config.local_testing.clone()))
        } else {
            resolver
        }
    }

    /// Serve bundled samples instead of querying the directory.
    pub fn with_local_testing(mut self, catalog: LocalCatalog) -> Self {
        self.local = Some(catalog);
        self
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        self.core.lock().state()
    }

    /// Scanning is allowed only while idle.
    pub fn can_scan(&self) -> bool {
        self.state().is_idle()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.core.lock().snapshot()
    }

    /// State changes, starting from the current state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    fn publish(&self, core: &SessionCore) {
        self.state_tx.send_replace(core.state());
    }

    // ------------------------------------------------------------------
    // Triggers
    // ------------------------------------------------------------------

    /// Resolve and present content for `identity`. Returns once the content
    /// is on screen, the attempt failed, or the trigger was ignored.
    pub async fn on_marker_detected(
        &self,
        identity: MarkerIdentity,
        anchor: Option<MarkerAnchor>,
    ) -> ResolutionOutcome {
        match self.begin(identity, anchor) {
            Ok(pending) => self.run(pending).await,
            Err(reason) => ResolutionOutcome::Ignored(reason),
        }
    }

    /// A QR code was decoded. The anchor is the tracked QR-class trackable,
    /// when there is one.
    pub async fn on_short_code_resolved(&self, short_code: &str) -> ResolutionOutcome {
        let anchor = self.qr_anchor();
        self.on_marker_detected(MarkerIdentity::short_code(short_code), anchor)
            .await
    }

    /// Start a resolution in the background. True when it was accepted.
    pub fn trigger(
        self: &Arc<Self>,
        identity: MarkerIdentity,
        anchor: Option<MarkerAnchor>,
    ) -> bool {
        match self.begin(identity, anchor) {
            Ok(pending) => {
                self.spawn(pending);
                true
            }
            Err(reason) => {
                tracing::debug!(?reason, "Trigger ignored");
                false
            }
        }
    }

    pub fn trigger_short_code(self: &Arc<Self>, short_code: &str) -> bool {
        let anchor = self.qr_anchor();
        self.trigger(MarkerIdentity::short_code(short_code), anchor)
    }

    /// Explicit scan: resolve the current candidate image marker. False when
    /// not idle or nothing is tracked.
    pub fn scan(self: &Arc<Self>) -> bool {
        let candidate = {
            let core = self.core.lock();
            if !core.state().is_idle() {
                tracing::debug!(state = %core.state(), "Scan ignored, session busy");
                return false;
            }
            core.tracked
                .image_candidate(self.options.candidate_policy)
                .map(|m| (m.identity(), m.anchor()))
        };

        match candidate {
            Some((identity, anchor)) => self.trigger(identity, Some(anchor)),
            None => {
                tracing::warn!("No tracked marker to scan");
                false
            }
        }
    }

    /// Feed tracking changes. In automatic mode a newly tracked image marker
    /// starts a resolution; returns true when one was started.
    pub fn on_trackables_changed(self: &Arc<Self>, change: &TrackablesChanged) -> bool {
        let trigger = {
            let mut core = self.core.lock();
            core.tracked.apply(change);
            if self.options.touch_to_scan || !core.state().is_idle() {
                None
            } else {
                core.tracked.next_unprocessed(self.options.candidate_policy)
            }
        };

        let Some((trackable, identity, anchor)) = trigger else {
            return false;
        };
        match self.begin(identity, Some(anchor)) {
            Ok(pending) => {
                self.core.lock().tracked.mark_processed(trackable);
                self.spawn(pending);
                true
            }
            Err(_) => false,
        }
    }

    fn qr_anchor(&self) -> Option<MarkerAnchor> {
        self.core
            .lock()
            .tracked
            .qr_anchor(self.options.candidate_policy)
    }

    fn spawn(self: &Arc<Self>, pending: PendingResolution) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run(pending).await;
        });
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// `Idle -> Pending`. Synchronous so a trigger is accepted or rejected
    /// before any await.
    fn begin(
        &self,
        identity: MarkerIdentity,
        anchor: Option<MarkerAnchor>,
    ) -> Result<PendingResolution, IgnoreReason> {
        if !identity.is_valid() {
            return Err(IgnoreReason::InvalidIdentity);
        }

        let request = {
            let mut core = self.core.lock();
            let state = core.state();
            let request = core.begin(identity.kind()).ok_or(IgnoreReason::Busy(state))?;
            self.publish(&core);
            request
        };

        self.collaborators.hud.set_loading(true);
        tracing::info!(%request, %identity, "Resolving marker");

        Ok(PendingResolution {
            request,
            identity,
            anchor,
        })
    }

    async fn run(&self, pending: PendingResolution) -> ResolutionOutcome {
        let request = pending.request;
        match self.resolve_and_present(&pending).await {
            Ok(kind) => ResolutionOutcome::Presented { request, kind },
            Err(StageError::Stale) => {
                tracing::debug!(%request, "Discarding result of superseded request");
                ResolutionOutcome::Discarded { request }
            }
            Err(StageError::Failed(err)) => self.fail(request, err),
        }
    }

    fn fail(&self, request: RequestId, err: SessionError) -> ResolutionOutcome {
        let kind = err.kind();
        let (reset, loaded_model) = {
            let mut core = self.core.lock();
            let loaded_model = core.content_kind() == Some(ContentKind::Model);
            let reset = core.fail(request, kind.to_string());
            if reset {
                self.publish(&core);
            }
            (reset, loaded_model)
        };

        if !reset {
            tracing::debug!(%request, error = %err, "Discarding error of superseded request");
            return ResolutionOutcome::Discarded { request };
        }

        // The bundle is already loaded once the content kind is known.
        if loaded_model {
            self.collaborators.asset_loader.release_all_bundles();
        }
        let hud = &self.collaborators.hud;
        hud.set_loading(false);
        hud.set_hud_visible(true);
        self.collaborators.error_sink.report(&err);
        ResolutionOutcome::Failed { request, kind }
    }

    async fn resolve_and_present(
        &self,
        pending: &PendingResolution,
    ) -> Result<ContentKind, StageError> {
        let request = pending.request;
        let prepared = match &self.local {
            Some(local) => local.prepare(&pending.identity).await?,
            None => self.prepare_remote(pending).await?,
        };
        self.ensure_current(request)?;

        let kind = prepared.kind();
        self.core.lock().set_content_kind(request, kind);

        let handle = self.show(prepared, pending).await?;
        self.commit(request, ActiveContentHandle::new(handle, kind))?;
        Ok(kind)
    }

    async fn prepare_remote(
        &self,
        pending: &PendingResolution,
    ) -> Result<PreparedContent, StageError> {
        let directory = &self.directory;
        let key = pending.identity.key();

        let descriptor = match pending.identity.kind() {
            MarkerKind::Qr => {
                self.bounded("resolve", directory.resolve_by_short_code(key))
                    .await?
            }
            _ => {
                self.bounded("resolve", directory.resolve_by_identity(key))
                    .await?
            }
        };
        self.ensure_current(pending.request)?;

        let plan = classify(&descriptor, self.options.default_video_mode)?;
        tracing::info!(
            request = %pending.request,
            content_type = %descriptor.content_type,
            kind = %plan.kind(),
            "Classified content"
        );

        match plan {
            ContentPlan::Video {
                mode: VideoMode::Overlay,
                url,
                ..
            } => Ok(PreparedContent::OverlayVideo { url }),
            ContentPlan::Video {
                mode: VideoMode::Popup,
                url,
                ..
            } => Ok(PreparedContent::PopupVideo { url }),
            ContentPlan::Quiz(source) => {
                let payload = match &source {
                    QuizSource::ById(id) => {
                        self.bounded("quiz lookup", directory.fetch_quiz_by_id(id))
                            .await?
                    }
                    QuizSource::Direct(location) => {
                        self.bounded("quiz fetch", directory.fetch_quiz_at(location))
                            .await?
                    }
                };
                self.ensure_current(pending.request)?;

                let quiz = QuizContent::from_payload(&payload)?;
                let icon = self.fetch_icon(&quiz).await;
                Ok(PreparedContent::Quiz { quiz, icon })
            }
            ContentPlan::Model {
                bundle_ref,
                asset_name,
            } => {
                if pending.anchor.is_none() {
                    return Err(SessionError::MissingAnchor(ContentKind::Model).into());
                }
                let bundle = self
                    .bounded("bundle load", directory.fetch_asset_bundle(&bundle_ref))
                    .await?;
                Ok(PreparedContent::Model { bundle, asset_name })
            }
        }
    }

    /// A missing or broken quiz image never fails the quiz.
    async fn fetch_icon(&self, quiz: &QuizContent) -> Option<ImageHandle> {
        let image_ref = quiz.image_ref.as_deref()?;
        match self
            .bounded("quiz image", self.directory.fetch_image(image_ref))
            .await
        {
            Ok(image) => Some(image),
            Err(e) => {
                tracing::warn!(
                    image = %image_ref,
                    error = %e,
                    "Quiz image unavailable, showing quiz without icon"
                );
                None
            }
        }
    }

    async fn show(
        &self,
        prepared: PreparedContent,
        pending: &PendingResolution,
    ) -> Result<ContentHandle, StageError> {
        let presenter = &self.collaborators.presenter;
        let limit = self.options.presentation_timeout();

        let handle = match prepared {
            PreparedContent::OverlayVideo { url } => {
                let video = OverlayVideo { url };
                with_timeout("presentation", limit, presenter.show_overlay_video(video)).await?
            }
            PreparedContent::PopupVideo { url } => {
                let anchor = pending
                    .anchor
                    .ok_or(SessionError::MissingAnchor(ContentKind::PopupVideo))?;
                let video = PopupVideo {
                    url,
                    scale: anchor.popup_scale(),
                    anchor,
                };
                with_timeout("presentation", limit, presenter.show_popup_video(video)).await?
            }
            PreparedContent::Quiz { quiz, icon } => {
                with_timeout(
                    "presentation",
                    limit,
                    presenter.show_quiz(QuizPresentation { quiz, icon }),
                )
                .await?
            }
            PreparedContent::Model { bundle, asset_name } => {
                let anchor = pending
                    .anchor
                    .ok_or(SessionError::MissingAnchor(ContentKind::Model))?;
                let model = ModelPresentation {
                    bundle,
                    asset_name,
                    anchor,
                };
                with_timeout("presentation", limit, presenter.show_model(model)).await?
            }
        };
        Ok(handle)
    }

    /// `Pending -> Presenting`, or tear the content straight down when the
    /// request went stale while the presenter was busy.
    fn commit(&self, request: RequestId, content: ActiveContentHandle) -> Result<(), StageError> {
        let kind = content.kind();
        let committed = {
            let mut core = self.core.lock();
            let result = core.present(request, content);
            if result.is_ok() {
                self.publish(&core);
            }
            result
        };

        match committed {
            Ok(()) => {
                let hud = &self.collaborators.hud;
                hud.set_loading(false);
                if kind.uses_preview_mode() {
                    hud.set_preview_mode(true);
                } else {
                    hud.set_hud_visible(false);
                }
                tracing::info!(%request, %kind, "Presenting content");
                Ok(())
            }
            Err(orphan) => {
                self.collaborators.presenter.destroy(orphan.into_handle());
                if kind == ContentKind::Model {
                    self.collaborators.asset_loader.release_all_bundles();
                }
                Err(StageError::Stale)
            }
        }
    }

    fn ensure_current(&self, request: RequestId) -> Result<(), StageError> {
        if self.core.lock().is_current(request) {
            Ok(())
        } else {
            Err(StageError::Stale)
        }
    }

    async fn bounded<T>(
        &self,
        stage: &'static str,
        fut: impl Future<Output = Result<T, DirectoryError>>,
    ) -> Result<T, SessionError> {
        with_timeout(stage, self.options.resolution_timeout(), fut).await
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// The user closed the content. `Presenting -> Closing -> Idle`; ignored
    /// in any other state.
    pub fn on_presentation_closed(&self) -> bool {
        let taken = {
            let mut core = self.core.lock();
            let taken = core.begin_close();
            if taken.is_some() {
                self.publish(&core);
            }
            taken
        };
        let Some((content, kind)) = taken else {
            tracing::debug!("Close ignored, nothing is presenting");
            return false;
        };

        if let Some(content) = content {
            self.collaborators.presenter.destroy(content.into_handle());
        }
        if kind == Some(ContentKind::Model) {
            self.collaborators.asset_loader.release_all_bundles();
        }
        let hud = &self.collaborators.hud;
        hud.set_preview_mode(false);
        hud.set_hud_visible(true);

        let mut core = self.core.lock();
        core.finish_close();
        self.publish(&core);
        tracing::info!(kind = ?kind, "Presentation closed");
        true
    }

    /// Playback or asset failure while presenting: report it, then tear down
    /// like a normal close.
    pub fn on_presentation_failed(&self, error: PresentationError) -> bool {
        if self.state() != SessionState::Presenting {
            tracing::debug!(error = %error, "Presentation failure outside presenting state");
            return false;
        }
        self.collaborators
            .error_sink
            .report(&SessionError::Presentation(error));
        self.on_presentation_closed()
    }

    /// Drop whatever is in flight. A pending resolution goes back to idle and
    /// its late result is discarded; presented content is closed.
    pub fn abandon(&self) -> bool {
        let abandoned = {
            let mut core = self.core.lock();
            let abandoned = core.abandon_pending();
            if abandoned.is_some() {
                self.publish(&core);
            }
            abandoned
        };

        match abandoned {
            Some(request) => {
                let hud = &self.collaborators.hud;
                hud.set_loading(false);
                hud.set_hud_visible(true);
                tracing::info!(%request, "Pending resolution abandoned");
                true
            }
            None => self.on_presentation_closed(),
        }
    }
}

async fn with_timeout<T, E>(
    stage: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, SessionError>
where
    E: Into<SessionError>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(SessionError::Timeout { stage, limit }),
    }
}
