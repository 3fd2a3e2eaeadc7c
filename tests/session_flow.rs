//! End-to-end session flows against mock collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ar_marker_session::{
    AssetLoader, BehaviorResolver, CandidatePolicy, Collaborators, ContentHandle, ContentKind,
    ErrorKind, ErrorSink, Hud, IgnoreReason, LocalCatalog, LocalTestingConfig, MarkerIdentity,
    ModelPresentation, OverlayVideo, PhysicalSize, PopupVideo, PresentationError, Presenter,
    QrDecodeOutcome, QuizPresentation, ResolutionOutcome, ScanAffordance, SessionDriver,
    SessionError, SessionOptions, SessionState, TrackableId, TrackablesChanged, TrackedMarker,
    TrackingState,
};
use content_directory::{
    BundleHandle, ContentDescriptor, ContentDirectory, ContentType, DirectoryError, FileCollection,
    ImageHandle, QuizPayload,
};

// ============================================================================
// Mocks
// ============================================================================

#[derive(Default)]
struct MockDirectory {
    objects: HashMap<String, ContentDescriptor>,
    quizzes: HashMap<String, QuizPayload>,
    fail_with: Option<DirectoryError>,
    image_fails: bool,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl MockDirectory {
    fn with_object(mut self, key: &str, descriptor: ContentDescriptor) -> Self {
        self.objects.insert(key.to_string(), descriptor);
        self
    }

    fn with_quiz(mut self, key: &str, quiz: QuizPayload) -> Self {
        self.quizzes.insert(key.to_string(), quiz);
        self
    }

    fn failing(mut self, err: DirectoryError) -> Self {
        self.fail_with = Some(err);
        self
    }

    fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    async fn lookup(&self, key: &str) -> content_directory::Result<ContentDescriptor> {
        tokio::time::sleep(self.delay).await;
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.objects.get(key).cloned().ok_or_else(|| not_found(key))
    }
}

fn not_found(key: &str) -> DirectoryError {
    DirectoryError::Status {
        url: format!("https://epy.digital/get_object?short_code={key}"),
        status: 404,
        body: "not found".into(),
    }
}

#[async_trait]
impl ContentDirectory for MockDirectory {
    async fn resolve_by_identity(
        &self,
        identity: &str,
    ) -> content_directory::Result<ContentDescriptor> {
        self.record(format!("identity:{identity}"));
        self.lookup(identity).await
    }

    async fn resolve_by_short_code(
        &self,
        code: &str,
    ) -> content_directory::Result<ContentDescriptor> {
        self.record(format!("short_code:{code}"));
        self.lookup(code).await
    }

    async fn fetch_quiz_by_id(&self, id: &str) -> content_directory::Result<QuizPayload> {
        self.record(format!("quiz_by_id:{id}"));
        self.quizzes.get(id).cloned().ok_or_else(|| not_found(id))
    }

    async fn fetch_quiz_at(&self, location: &str) -> content_directory::Result<QuizPayload> {
        self.record(format!("quiz_at:{location}"));
        self.quizzes.get(location).cloned().ok_or_else(|| not_found(location))
    }

    async fn fetch_asset_bundle(&self, location: &str) -> content_directory::Result<BundleHandle> {
        self.record(format!("bundle:{location}"));
        Ok(BundleHandle {
            location: location.to_string(),
            bytes: vec![1, 2, 3],
        })
    }

    async fn fetch_image(&self, location: &str) -> content_directory::Result<ImageHandle> {
        self.record(format!("image:{location}"));
        if self.image_fails {
            return Err(DirectoryError::Network {
                url: location.to_string(),
                message: "connection refused".into(),
            });
        }
        Ok(ImageHandle {
            location: location.to_string(),
            content_type: Some("image/jpeg".into()),
            bytes: vec![0xFF, 0xD8],
        })
    }

    async fn fetch_file_collection(&self, _: &str) -> content_directory::Result<FileCollection> {
        Ok(FileCollection::default())
    }

    async fn download_file(&self, _: &str) -> content_directory::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Shown {
    Overlay(String),
    Popup { url: String, scale: PhysicalSize },
    Quiz { question: String, has_icon: bool },
    Model { asset: String },
}

#[derive(Default)]
struct MockPresenter {
    next: AtomicU64,
    delay: Duration,
    missing_models: bool,
    shown: Mutex<Vec<Shown>>,
    destroyed: Mutex<Vec<ContentHandle>>,
}

impl MockPresenter {
    fn delayed(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    /// `show_model` reports the asset as missing from its bundle.
    fn missing_models() -> Self {
        Self {
            missing_models: true,
            ..Default::default()
        }
    }

    async fn show(&self, shown: Shown) -> Result<ContentHandle, PresentationError> {
        self.shown.lock().push(shown);
        tokio::time::sleep(self.delay).await;
        Ok(ContentHandle::new(self.next.fetch_add(1, Ordering::SeqCst) + 1))
    }

    fn shown(&self) -> Vec<Shown> {
        self.shown.lock().clone()
    }
}

#[async_trait]
impl Presenter for MockPresenter {
    async fn show_overlay_video(
        &self,
        video: OverlayVideo,
    ) -> Result<ContentHandle, PresentationError> {
        self.show(Shown::Overlay(video.url)).await
    }

    async fn show_popup_video(
        &self,
        video: PopupVideo,
    ) -> Result<ContentHandle, PresentationError> {
        self.show(Shown::Popup {
            url: video.url,
            scale: video.scale,
        })
        .await
    }

    async fn show_quiz(&self, quiz: QuizPresentation) -> Result<ContentHandle, PresentationError> {
        self.show(Shown::Quiz {
            question: quiz.quiz.question,
            has_icon: quiz.icon.is_some(),
        })
        .await
    }

    async fn show_model(
        &self,
        model: ModelPresentation,
    ) -> Result<ContentHandle, PresentationError> {
        if self.missing_models {
            return Err(PresentationError::AssetMissing {
                asset: model.asset_name,
                bundle: model.bundle.location,
            });
        }
        self.show(Shown::Model {
            asset: model.asset_name,
        })
        .await
    }

    fn destroy(&self, handle: ContentHandle) {
        self.destroyed.lock().push(handle);
    }
}

#[derive(Default)]
struct MockHud {
    events: Mutex<Vec<String>>,
}

impl MockHud {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl Hud for MockHud {
    fn set_loading(&self, visible: bool) {
        self.events.lock().push(format!("loading:{visible}"));
    }

    fn set_hud_visible(&self, visible: bool) {
        self.events.lock().push(format!("hud:{visible}"));
    }

    fn set_preview_mode(&self, enabled: bool) {
        self.events.lock().push(format!("preview:{enabled}"));
    }
}

#[derive(Default)]
struct MockAssetLoader {
    releases: AtomicUsize,
}

impl AssetLoader for MockAssetLoader {
    fn release_all_bundles(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingSink {
    kinds: Mutex<Vec<ErrorKind>>,
}

impl ErrorSink for RecordingSink {
    fn report(&self, error: &SessionError) {
        self.kinds.lock().push(error.kind());
    }
}

struct MockAffordance {
    icon_visible: AtomicBool,
    animations: AtomicUsize,
}

impl Default for MockAffordance {
    fn default() -> Self {
        Self {
            icon_visible: AtomicBool::new(true),
            animations: AtomicUsize::new(0),
        }
    }
}

impl ScanAffordance for MockAffordance {
    fn play_scan_animation(&self) {
        self.animations.fetch_add(1, Ordering::SeqCst);
    }

    fn set_scan_icon_visible(&self, visible: bool) {
        self.icon_visible.store(visible, Ordering::SeqCst);
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    resolver: Arc<BehaviorResolver>,
    directory: Arc<MockDirectory>,
    presenter: Arc<MockPresenter>,
    hud: Arc<MockHud>,
    assets: Arc<MockAssetLoader>,
    errors: Arc<RecordingSink>,
}

fn harness(directory: MockDirectory, options: SessionOptions) -> Harness {
    build(directory, MockPresenter::default(), options, None)
}

fn build(
    directory: MockDirectory,
    presenter: MockPresenter,
    options: SessionOptions,
    local: Option<LocalCatalog>,
) -> Harness {
    let directory = Arc::new(directory);
    let presenter = Arc::new(presenter);
    let hud = Arc::new(MockHud::default());
    let assets = Arc::new(MockAssetLoader::default());
    let errors = Arc::new(RecordingSink::default());

    let collaborators = Collaborators::new(presenter.clone(), hud.clone(), assets.clone())
        .with_error_sink(errors.clone());
    let mut resolver = BehaviorResolver::new(directory.clone(), collaborators, options);
    if let Some(catalog) = local {
        resolver = resolver.with_local_testing(catalog);
    }

    Harness {
        resolver: Arc::new(resolver),
        directory,
        presenter,
        hud,
        assets,
        errors,
    }
}

fn descriptor(kind: &str, payload: &str, metadata: &str) -> ContentDescriptor {
    ContentDescriptor::new(ContentType::from_wire(kind), payload, metadata)
}

fn overlay_clip() -> ContentDescriptor {
    descriptor("video", "https://cdn.example.com/clip.mp4", "overlay")
}

fn sample_quiz() -> QuizPayload {
    QuizPayload {
        id: Some(42),
        questions: Some("what is the national flower of singapore".into()),
        answer_a: Some("Sunflower".into()),
        answer_b: Some("Epidendrum Orchid".into()),
        answer_c: Some("Vanda Miss Joaquim Orchid".into()),
        answer_d: Some("Brassavola Orchid".into()),
        correct_answer: Some("Vanda Miss Joaquim Orchid".into()),
        image: Some("https://cdn.example.com/orchid.jpg".into()),
        ..Default::default()
    }
}

fn tracking(id: u64, name: &str) -> TrackedMarker {
    TrackedMarker::image(id, name, TrackingState::Tracking)
}

async fn wait_for(resolver: &BehaviorResolver, want: SessionState) {
    let mut rx = resolver.subscribe();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|state| *state == want))
        .await
        .expect("timed out waiting for session state")
        .expect("state channel closed");
}

// ============================================================================
// Re-entrancy
// ============================================================================

#[tokio::test]
async fn detection_while_pending_is_ignored() {
    let h = harness(
        MockDirectory::default()
            .with_object("ParentFabVideo-1", overlay_clip())
            .delayed(Duration::from_millis(100)),
        SessionOptions::default(),
    );

    let resolver = h.resolver.clone();
    let first = tokio::spawn(async move {
        resolver
            .on_marker_detected(MarkerIdentity::image("ParentFabVideo-1"), None)
            .await
    });
    wait_for(&h.resolver, SessionState::Pending).await;

    let second = h
        .resolver
        .on_marker_detected(MarkerIdentity::image("ParentSunPrefab"), None)
        .await;
    assert_eq!(
        second,
        ResolutionOutcome::Ignored(IgnoreReason::Busy(SessionState::Pending))
    );

    let first = first.await.unwrap();
    assert!(matches!(
        first,
        ResolutionOutcome::Presented {
            kind: ContentKind::OverlayVideo,
            ..
        }
    ));
    assert_eq!(h.directory.calls(), vec!["identity:ParentFabVideo-1"]);

    // Presenting also rejects new triggers.
    let third = h
        .resolver
        .on_short_code_resolved("rYb8cS")
        .await;
    assert_eq!(
        third,
        ResolutionOutcome::Ignored(IgnoreReason::Busy(SessionState::Presenting))
    );
    assert_eq!(h.presenter.shown().len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn detections_while_busy_never_fetch_or_transition(
        keys in proptest::collection::vec(
            prop_oneof![
                Just(String::new()),
                Just("ParentFabVideo-1".to_string()),
                Just("rYb8cS".to_string()),
                "[A-Za-z0-9-]{1,10}",
            ],
            1..12,
        )
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        rt.block_on(async {
            let h = harness(
                MockDirectory::default()
                    .with_object("first", overlay_clip())
                    .delayed(Duration::from_millis(20)),
                SessionOptions::default(),
            );

            prop_assert!(h.resolver.trigger(MarkerIdentity::image("first"), None));

            for key in &keys {
                let by_image = h
                    .resolver
                    .on_marker_detected(MarkerIdentity::image(key.as_str()), None)
                    .await;
                prop_assert!(matches!(by_image, ResolutionOutcome::Ignored(_)));

                let by_code = h.resolver.on_short_code_resolved(key).await;
                prop_assert!(matches!(by_code, ResolutionOutcome::Ignored(_)));
            }

            prop_assert_eq!(h.resolver.state(), SessionState::Pending);
            prop_assert_eq!(h.resolver.snapshot().history.len(), 1);

            wait_for(&h.resolver, SessionState::Presenting).await;
            prop_assert_eq!(h.directory.calls(), vec!["identity:first".to_string()]);
            prop_assert_eq!(h.presenter.shown().len(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// ============================================================================
// Scan
// ============================================================================

#[tokio::test]
async fn scan_without_tracked_marker_has_no_effect() {
    let h = harness(MockDirectory::default(), SessionOptions::default().touch_to_scan(true));

    assert!(!h.resolver.scan());
    assert_eq!(h.resolver.state(), SessionState::Idle);
    assert!(h.directory.calls().is_empty());
    assert!(h.hud.events().is_empty());

    // Limited markers are not candidates either.
    h.resolver.on_trackables_changed(&TrackablesChanged::added(vec![TrackedMarker::image(
        1,
        "ParentFabVideo-1",
        TrackingState::Limited,
    )]));
    assert!(!h.resolver.scan());
    assert!(h.directory.calls().is_empty());
}

#[tokio::test]
async fn scan_while_busy_has_no_effect() {
    let h = harness(
        MockDirectory::default()
            .with_object("ParentFabVideo-1", overlay_clip())
            .delayed(Duration::from_millis(50)),
        SessionOptions::default().touch_to_scan(true),
    );
    h.resolver
        .on_trackables_changed(&TrackablesChanged::added(vec![tracking(1, "ParentFabVideo-1")]));

    assert!(h.resolver.scan());
    assert_eq!(h.resolver.state(), SessionState::Pending);
    assert!(!h.resolver.scan());
    assert!(!h.resolver.can_scan());

    wait_for(&h.resolver, SessionState::Presenting).await;
    assert_eq!(h.directory.calls().len(), 1);
}

#[tokio::test]
async fn popup_video_is_scaled_to_the_marker() {
    let h = harness(
        MockDirectory::default().with_object(
            "ParentSunPrefab",
            descriptor("video", "https://cdn.example.com/sun.mp4", "popup"),
        ),
        SessionOptions::default().touch_to_scan(true),
    );

    let marker = tracking(7, "ParentSunPrefab").with_size(PhysicalSize::new(0.21, 0.297));
    // Touch-to-scan: tracking alone does not resolve.
    assert!(!h.resolver.on_trackables_changed(&TrackablesChanged::added(vec![marker])));
    assert!(h.directory.calls().is_empty());

    assert!(h.resolver.scan());
    wait_for(&h.resolver, SessionState::Presenting).await;

    assert_eq!(
        h.presenter.shown(),
        vec![Shown::Popup {
            url: "https://cdn.example.com/sun.mp4".into(),
            scale: PhysicalSize::new(0.21, 0.297),
        }]
    );
    let events = h.hud.events();
    assert_eq!(events.first().map(String::as_str), Some("loading:true"));
    assert!(events.contains(&"preview:true".to_string()));
    assert!(!events.contains(&"hud:false".to_string()));
}

#[tokio::test]
async fn candidate_policy_picks_most_recent_marker() {
    let h = harness(
        MockDirectory::default()
            .with_object("A", overlay_clip())
            .with_object("B", overlay_clip()),
        SessionOptions::default()
            .touch_to_scan(true)
            .candidate_policy(CandidatePolicy::MostRecentlyUpdated),
    );
    h.resolver
        .on_trackables_changed(&TrackablesChanged::added(vec![tracking(1, "A"), tracking(2, "B")]));
    h.resolver
        .on_trackables_changed(&TrackablesChanged::updated(vec![tracking(1, "A")]));

    assert!(h.resolver.scan());
    wait_for(&h.resolver, SessionState::Presenting).await;
    assert_eq!(h.directory.calls(), vec!["identity:A"]);
}

// ============================================================================
// Content kinds
// ============================================================================

#[tokio::test]
async fn quiz_id_uses_single_lookup() {
    let h = harness(
        MockDirectory::default()
            .with_object(
                "jSzOjv",
                descriptor("quiz", "https://epy.digital/quiz/direct", r#"{"quiz_id": "42"}"#),
            )
            .with_quiz("42", sample_quiz()),
        SessionOptions::default(),
    );

    let outcome = h.resolver.on_short_code_resolved("jSzOjv").await;
    assert!(matches!(
        outcome,
        ResolutionOutcome::Presented {
            kind: ContentKind::Quiz,
            ..
        }
    ));

    let calls = h.directory.calls();
    assert_eq!(calls.iter().filter(|c| *c == "quiz_by_id:42").count(), 1);
    assert!(!calls.iter().any(|c| c.starts_with("quiz_at:")));
    assert_eq!(
        h.presenter.shown(),
        vec![Shown::Quiz {
            question: "what is the national flower of singapore".into(),
            has_icon: true,
        }]
    );
    assert!(h.hud.events().contains(&"hud:false".to_string()));
}

#[tokio::test]
async fn quiz_without_metadata_is_fetched_directly() {
    let h = harness(
        MockDirectory::default()
            .with_object("q", descriptor("quiz", "https://epy.digital/quiz/7", ""))
            .with_quiz("https://epy.digital/quiz/7", sample_quiz()),
        SessionOptions::default(),
    );

    h.resolver.on_short_code_resolved("q").await;
    let calls = h.directory.calls();
    assert!(calls.contains(&"quiz_at:https://epy.digital/quiz/7".to_string()));
    assert!(!calls.iter().any(|c| c.starts_with("quiz_by_id:")));
}

#[tokio::test]
async fn quiz_image_failure_still_shows_quiz() {
    let mut directory = MockDirectory::default()
        .with_object("q", descriptor("quiz", "", r#"{"quiz_id": 42}"#))
        .with_quiz("42", sample_quiz());
    directory.image_fails = true;
    let h = harness(directory, SessionOptions::default());

    let outcome = h.resolver.on_short_code_resolved("q").await;
    assert!(matches!(outcome, ResolutionOutcome::Presented { .. }));
    assert_eq!(
        h.presenter.shown(),
        vec![Shown::Quiz {
            question: "what is the national flower of singapore".into(),
            has_icon: false,
        }]
    );
    assert!(h.errors.kinds.lock().is_empty());
}

#[tokio::test]
async fn quiz_with_unmatched_answer_resets() {
    let mut quiz = sample_quiz();
    quiz.correct_answer = Some("Rose".into());
    let h = harness(
        MockDirectory::default()
            .with_object("q", descriptor("quiz", "", r#"{"quiz_id": 42}"#))
            .with_quiz("42", quiz),
        SessionOptions::default(),
    );

    let outcome = h.resolver.on_short_code_resolved("q").await;
    assert!(matches!(
        outcome,
        ResolutionOutcome::Failed {
            kind: ErrorKind::InvalidMetadata,
            ..
        }
    ));
    assert!(h.resolver.can_scan());
    assert!(h.presenter.shown().is_empty());
}

#[tokio::test]
async fn unsupported_type_never_reaches_presenter() {
    let h = harness(
        MockDirectory::default().with_object("x", descriptor("hologram", "https://h", "")),
        SessionOptions::default(),
    );

    let outcome = h.resolver.on_short_code_resolved("x").await;
    assert!(matches!(
        outcome,
        ResolutionOutcome::Failed {
            kind: ErrorKind::UnsupportedType,
            ..
        }
    ));
    assert!(h.presenter.shown().is_empty());
    assert_eq!(*h.errors.kinds.lock(), vec![ErrorKind::UnsupportedType]);
}

#[tokio::test]
async fn model_without_anchor_is_a_presentation_error() {
    let h = harness(
        MockDirectory::default().with_object(
            "1FENoV",
            descriptor("3d", "https://cdn.example.com/bundles/merlion", ""),
        ),
        SessionOptions::default(),
    );

    // No QR-class trackable is tracked, so there is nothing to anchor to.
    let outcome = h.resolver.on_short_code_resolved("1FENoV").await;
    assert!(matches!(
        outcome,
        ResolutionOutcome::Failed {
            kind: ErrorKind::Presentation,
            ..
        }
    ));
    assert!(h.presenter.shown().is_empty());
    assert_eq!(h.directory.calls(), vec!["short_code:1FENoV"]);
    assert_eq!(h.assets.releases.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_model_presentation_releases_bundles() {
    let h = build(
        MockDirectory::default().with_object(
            "ParentMerlionFab",
            descriptor("3d", "https://cdn.example.com/bundles/merlion", ""),
        ),
        MockPresenter::missing_models(),
        SessionOptions::default(),
        None,
    );

    let anchor = tracking(3, "ParentMerlionFab").anchor();
    let outcome = h
        .resolver
        .on_marker_detected(MarkerIdentity::image("ParentMerlionFab"), Some(anchor))
        .await;

    assert!(matches!(
        outcome,
        ResolutionOutcome::Failed {
            kind: ErrorKind::AssetLoad,
            ..
        }
    ));
    assert_eq!(h.resolver.state(), SessionState::Idle);
    assert_eq!(h.assets.releases.load(Ordering::SeqCst), 1);
    assert!(h.resolver.can_scan());

    // Non-model failures leave bundles alone.
    let h = harness(
        MockDirectory::default().failing(DirectoryError::Network {
            url: "https://epy.digital/get_object?short_code=abc".into(),
            message: "connection refused".into(),
        }),
        SessionOptions::default(),
    );
    h.resolver.on_short_code_resolved("abc").await;
    assert_eq!(h.assets.releases.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Failure and teardown
// ============================================================================

#[tokio::test]
async fn network_error_returns_to_idle() {
    let h = harness(
        MockDirectory::default().failing(DirectoryError::Network {
            url: "https://epy.digital/get_object?short_code=abc".into(),
            message: "connection refused".into(),
        }),
        SessionOptions::default(),
    );

    let outcome = h.resolver.on_short_code_resolved("abc").await;
    assert!(matches!(
        outcome,
        ResolutionOutcome::Failed {
            kind: ErrorKind::Network,
            ..
        }
    ));
    assert_eq!(h.resolver.state(), SessionState::Idle);
    assert!(h.resolver.can_scan());
    assert!(h.presenter.shown().is_empty());
    assert_eq!(*h.errors.kinds.lock(), vec![ErrorKind::Network]);
    assert_eq!(
        h.hud.events(),
        vec!["loading:true", "loading:false", "hud:true"]
    );
}

#[tokio::test]
async fn slow_directory_times_out() {
    let h = harness(
        MockDirectory::default()
            .with_object("slow", overlay_clip())
            .delayed(Duration::from_secs(3)),
        SessionOptions::default().resolution_timeout_secs(1),
    );

    let outcome = h.resolver.on_short_code_resolved("slow").await;
    assert!(matches!(
        outcome,
        ResolutionOutcome::Failed {
            kind: ErrorKind::Network,
            ..
        }
    ));
    assert!(h.resolver.can_scan());
}

#[tokio::test]
async fn close_resets_session() {
    let h = harness(
        MockDirectory::default().with_object("rYb8cS", overlay_clip()),
        SessionOptions::default(),
    );

    h.resolver.on_short_code_resolved("rYb8cS").await;
    assert_eq!(h.resolver.state(), SessionState::Presenting);
    assert!(h.resolver.snapshot().has_content);

    assert!(h.resolver.on_presentation_closed());
    let snapshot = h.resolver.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.has_content);
    assert!(h.resolver.can_scan());
    assert_eq!(h.presenter.destroyed.lock().len(), 1);
    assert_eq!(h.assets.releases.load(Ordering::SeqCst), 0);

    let states: Vec<_> = snapshot.history.iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        vec![
            SessionState::Pending,
            SessionState::Presenting,
            SessionState::Closing,
            SessionState::Idle,
        ]
    );

    // A second close is ignored.
    assert!(!h.resolver.on_presentation_closed());
}

#[tokio::test]
async fn closing_a_model_releases_bundles() {
    let h = harness(
        MockDirectory::default().with_object(
            "ParentMerlionFab",
            descriptor(
                "3d",
                "https://cdn.example.com/bundles/merlion",
                r#"{"filename": "ParentMerlionFab"}"#,
            ),
        ),
        SessionOptions::default(),
    );

    h.resolver
        .on_trackables_changed(&TrackablesChanged::added(vec![tracking(3, "ParentMerlionFab")]));
    wait_for(&h.resolver, SessionState::Presenting).await;
    assert_eq!(
        h.presenter.shown(),
        vec![Shown::Model {
            asset: "ParentMerlionFab".into()
        }]
    );

    assert!(h.resolver.on_presentation_closed());
    assert_eq!(h.assets.releases.load(Ordering::SeqCst), 1);
    let events = h.hud.events();
    assert_eq!(
        &events[events.len() - 2..],
        &["preview:false".to_string(), "hud:true".to_string()]
    );
}

#[tokio::test]
async fn presentation_failure_is_reported_and_closed() {
    let h = harness(
        MockDirectory::default().with_object("rYb8cS", overlay_clip()),
        SessionOptions::default(),
    );
    assert!(!h
        .resolver
        .on_presentation_failed(PresentationError::Playback("decoder stalled".into())));

    h.resolver.on_short_code_resolved("rYb8cS").await;
    assert!(h
        .resolver
        .on_presentation_failed(PresentationError::Playback("decoder stalled".into())));

    assert_eq!(h.resolver.state(), SessionState::Idle);
    assert_eq!(*h.errors.kinds.lock(), vec![ErrorKind::Presentation]);
    assert_eq!(h.presenter.destroyed.lock().len(), 1);
}

#[tokio::test]
async fn automatic_mode_triggers_once_per_sighting() {
    let h = harness(
        MockDirectory::default().with_object("ParentFabVideo-1", overlay_clip()),
        SessionOptions::default(),
    );

    assert!(h
        .resolver
        .on_trackables_changed(&TrackablesChanged::added(vec![tracking(1, "ParentFabVideo-1")])));
    wait_for(&h.resolver, SessionState::Presenting).await;
    h.resolver.on_presentation_closed();

    // Still tracked and already processed: no new resolution.
    assert!(!h
        .resolver
        .on_trackables_changed(&TrackablesChanged::updated(vec![tracking(1, "ParentFabVideo-1")])));

    // Lost and found again: resolves again.
    h.resolver
        .on_trackables_changed(&TrackablesChanged::removed(vec![TrackableId(1)]));
    assert!(h
        .resolver
        .on_trackables_changed(&TrackablesChanged::added(vec![tracking(1, "ParentFabVideo-1")])));
    wait_for(&h.resolver, SessionState::Presenting).await;
    assert_eq!(h.directory.calls().len(), 2);
}

// ============================================================================
// Stale results
// ============================================================================

#[tokio::test]
async fn late_fetch_after_abandon_is_discarded() {
    let h = harness(
        MockDirectory::default()
            .with_object("first", overlay_clip())
            .with_object(
                "second",
                descriptor("video", "https://cdn.example.com/second.mp4", "overlay"),
            )
            .delayed(Duration::from_millis(100)),
        SessionOptions::default(),
    );

    let resolver = h.resolver.clone();
    let first = tokio::spawn(async move {
        resolver
            .on_marker_detected(MarkerIdentity::image("first"), None)
            .await
    });
    wait_for(&h.resolver, SessionState::Pending).await;

    assert!(h.resolver.abandon());
    assert_eq!(h.resolver.state(), SessionState::Idle);

    let second = h
        .resolver
        .on_marker_detected(MarkerIdentity::image("second"), None)
        .await;
    assert!(matches!(second, ResolutionOutcome::Presented { .. }));

    assert!(matches!(
        first.await.unwrap(),
        ResolutionOutcome::Discarded { .. }
    ));
    assert_eq!(
        h.presenter.shown(),
        vec![Shown::Overlay("https://cdn.example.com/second.mp4".into())]
    );
    assert!(h.errors.kinds.lock().is_empty());
}

#[tokio::test]
async fn late_presenter_result_is_destroyed() {
    let h = build(
        MockDirectory::default().with_object("rYb8cS", overlay_clip()),
        MockPresenter::delayed(Duration::from_millis(200)),
        SessionOptions::default(),
        None,
    );

    let resolver = h.resolver.clone();
    let task = tokio::spawn(async move { resolver.on_short_code_resolved("rYb8cS").await });

    // Let the lookup finish and the presenter start.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.presenter.shown().len(), 1);
    assert!(h.resolver.abandon());

    assert!(matches!(
        task.await.unwrap(),
        ResolutionOutcome::Discarded { .. }
    ));
    assert_eq!(h.presenter.destroyed.lock().len(), 1);
    assert_eq!(h.resolver.state(), SessionState::Idle);
    assert!(!h.resolver.snapshot().has_content);
}

// ============================================================================
// Local testing
// ============================================================================

#[tokio::test]
async fn local_sample_quiz_skips_directory() {
    let dir = tempfile::tempdir().unwrap();
    let catalog = LocalCatalog::new(
        LocalTestingConfig::default()
            .enabled(true)
            .simulated_delay_ms(20)
            .sample_assets_dir(dir.path()),
    );
    let h = build(
        MockDirectory::default(),
        MockPresenter::default(),
        SessionOptions::default(),
        Some(catalog),
    );

    let started = std::time::Instant::now();
    let outcome = h
        .resolver
        .on_marker_detected(MarkerIdentity::image("ParentAlienVideo"), None)
        .await;

    assert!(started.elapsed() >= Duration::from_millis(20));
    assert!(matches!(
        outcome,
        ResolutionOutcome::Presented {
            kind: ContentKind::Quiz,
            ..
        }
    ));
    assert!(h.directory.calls().is_empty());
    assert_eq!(
        h.presenter.shown(),
        vec![Shown::Quiz {
            question: "what is the national flower of singapore".into(),
            has_icon: false,
        }]
    );
}

#[tokio::test]
async fn local_unknown_literal_is_reported() {
    let catalog =
        LocalCatalog::new(LocalTestingConfig::default().enabled(true).simulated_delay_ms(0));
    let h = build(
        MockDirectory::default(),
        MockPresenter::default(),
        SessionOptions::default(),
        Some(catalog),
    );

    let outcome = h.resolver.on_short_code_resolved("zzzzzz").await;
    assert!(matches!(
        outcome,
        ResolutionOutcome::Failed {
            kind: ErrorKind::UnsupportedType,
            ..
        }
    ));
    assert!(h.directory.calls().is_empty());
}

// ============================================================================
// Scan gate and QR
// ============================================================================

#[tokio::test]
async fn touch_to_scan_executes_cached_qr_code() {
    let h = harness(
        MockDirectory::default().with_object("rYb8cS", overlay_clip()),
        SessionOptions::default().touch_to_scan(true),
    );
    let affordance = Arc::new(MockAffordance::default());
    let driver = SessionDriver::new(h.resolver.clone(), affordance.clone());
    let listener = driver.gate().spawn_state_listener();

    let outcome = driver.qr().on_decoded("https://epy.digital/rYb8cS");
    assert_eq!(outcome, QrDecodeOutcome::Cached("rYb8cS".into()));
    assert!(h.directory.calls().is_empty());

    assert!(driver.gate().start_scan());
    assert!(!driver.gate().start_scan());
    assert_eq!(affordance.animations.load(Ordering::SeqCst), 1);

    assert!(driver.gate().finish_scan());
    assert!(!driver.gate().is_scanning());
    assert!(!affordance.icon_visible.load(Ordering::SeqCst));
    assert!(!driver.qr().has_cached_result());

    wait_for(&h.resolver, SessionState::Presenting).await;
    assert_eq!(h.directory.calls(), vec!["short_code:rYb8cS"]);
    assert!(!driver.gate().start_scan());

    h.resolver.on_presentation_closed();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(affordance.icon_visible.load(Ordering::SeqCst));
    assert!(driver.gate().can_scan());
    listener.abort();
}

#[tokio::test]
async fn scan_with_nothing_found_keeps_icon() {
    let h = harness(MockDirectory::default(), SessionOptions::default().touch_to_scan(true));
    let affordance = Arc::new(MockAffordance::default());
    let driver = SessionDriver::new(h.resolver.clone(), affordance.clone());

    assert!(driver.gate().start_scan());
    assert!(!driver.gate().finish_scan());
    assert!(affordance.icon_visible.load(Ordering::SeqCst));
    assert!(!driver.gate().is_scanning());
    assert_eq!(h.resolver.state(), SessionState::Idle);
}

#[tokio::test]
async fn automatic_qr_dispatches_immediately() {
    let h = harness(
        MockDirectory::default().with_object("rYb8cS", overlay_clip()),
        SessionOptions::default(),
    );
    let driver = SessionDriver::new(h.resolver.clone(), Arc::new(MockAffordance::default()));

    assert_eq!(
        driver.qr().on_decoded("not a url"),
        QrDecodeOutcome::Rejected
    );
    assert_eq!(
        driver.qr().on_decoded("https://epy.digital/rYb8cS"),
        QrDecodeOutcome::Dispatched {
            short_code: "rYb8cS".into(),
            accepted: true,
        }
    );
    wait_for(&h.resolver, SessionState::Presenting).await;
    assert_eq!(h.presenter.shown().len(), 1);
}
