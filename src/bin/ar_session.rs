//! ar-session: drive the marker session from the command line.
//!
//! Usage:
//!   ar-session resolve rYb8cS                 # Look up a short code and classify it
//!   ar-session resolve ParentSunPrefab --image
//!   ar-session replay demos/replay.yaml       # Replay a scripted tracking feed
//!   ar-session replay demos/replay.yaml --local
//!   ar-session sync-library --collection <id> # Fill the reference image cache
//!   ar-session quizzes                        # List quiz questions

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ar_marker_session::session::classify;
use ar_marker_session::{
    AssetLoader, BehaviorResolver, Collaborators, ContentHandle, FeedEvent, Hud,
    ModelPresentation, OverlayVideo, PopupVideo, PresentationError, Presenter, QuizPresentation,
    ReferenceLibrarySync, ScanAffordance, SessionConfig, SessionDriver,
};
use content_directory::{ContentDirectory, HttpDirectoryClient};

#[derive(Parser)]
#[command(name = "ar-session")]
#[command(about = "Resolve AR markers and replay marker sessions")]
struct Args {
    /// Path to a YAML session config (falls back to AR_SESSION_CONFIG)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a short code (or image name) and print the classified content
    Resolve {
        key: String,

        /// Treat KEY as a reference-image name instead of a short code
        #[arg(long)]
        image: bool,
    },

    /// Replay a YAML script of feed events through the session
    Replay {
        script: PathBuf,

        /// Serve bundled samples instead of calling the backend
        #[arg(long)]
        local: bool,

        /// Require a scan press before resolving
        #[arg(long)]
        touch_to_scan: bool,
    },

    /// Download the reference image collection into the local cache
    SyncLibrary {
        #[arg(long, env = "AR_SESSION_COLLECTION")]
        collection: Option<String>,
    },

    /// List quiz questions known to the backend
    Quizzes,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ar_marker_session=info,content_directory=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = SessionConfig::load(args.config.as_deref())?;
    tracing::info!(base_url = %config.directory.base_url, "Configuration loaded");

    let client = HttpDirectoryClient::new(&config.directory)
        .context("Failed to build content directory client")?;

    match args.command {
        Command::Resolve { key, image } => resolve(&client, &config, &key, image).await,
        Command::Replay {
            script,
            local,
            touch_to_scan,
        } => {
            let local = local || config.local_testing.enabled;
            let touch_to_scan = touch_to_scan || config.session.touch_to_scan;
            let config = config.local_testing(local).touch_to_scan(touch_to_scan);
            replay(Arc::new(client), &config, &script).await
        }
        Command::SyncLibrary { collection } => {
            let collection = collection
                .or_else(|| config.reference_library.collection_id.clone())
                .context("No collection id given and none configured")?;
            let sync =
                ReferenceLibrarySync::new(Arc::new(client), config.reference_library.clone());
            let report = sync.sync(&collection).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Quizzes => {
            for (i, card) in client.quiz_questions().await?.iter().enumerate() {
                println!("{}. {}", i + 1, card.question);
                println!("   A: {}  B: {}  C: {}  D: {}", card.a, card.b, card.c, card.d);
                println!("   Answer: {}", card.answer);
            }
            Ok(())
        }
    }
}

async fn resolve(
    client: &HttpDirectoryClient,
    config: &SessionConfig,
    key: &str,
    image: bool,
) -> Result<()> {
    let descriptor = if image {
        client.resolve_by_identity(key).await?
    } else {
        client.resolve_by_short_code(key).await?
    };

    let plan = classify(&descriptor, config.session.default_video_mode);
    let summary = serde_json::json!({
        "key": key,
        "content_type": descriptor.content_type.to_string(),
        "payload_ref": descriptor.payload_ref,
        "metadata": descriptor.metadata.raw(),
        "plan": match &plan {
            Ok(plan) => serde_json::json!({ "kind": plan.kind(), "detail": format!("{plan:?}") }),
            Err(e) => serde_json::json!({ "error": e.to_string(), "kind": e.kind() }),
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn replay(
    directory: Arc<dyn ContentDirectory>,
    config: &SessionConfig,
    script: &Path,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(script)
        .await
        .with_context(|| format!("Failed to read replay script {}", script.display()))?;
    let events: Vec<FeedEvent> = serde_yaml::from_str(&raw)
        .with_context(|| format!("Invalid replay script {}", script.display()))?;

    let presenter = Arc::new(ConsolePresenter::default());
    let collaborators =
        Collaborators::new(presenter, Arc::new(ConsoleHud), Arc::new(ConsoleAssetLoader));
    let resolver = Arc::new(BehaviorResolver::from_config(directory, collaborators, config));
    let driver = SessionDriver::new(resolver.clone(), Arc::new(ConsoleAffordance));

    let (tx, rx) = tokio::sync::mpsc::channel(events.len().max(1));
    for event in events {
        tx.send(event).await.context("Replay channel closed")?;
    }
    drop(tx);
    driver.run(rx).await;

    println!("{}", serde_json::to_string_pretty(&resolver.snapshot())?);
    Ok(())
}

// ============================================================================
// Console collaborators
// ============================================================================

#[derive(Default)]
struct ConsolePresenter {
    next: AtomicU64,
}

impl ConsolePresenter {
    fn handle(&self) -> ContentHandle {
        ContentHandle::new(self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl Presenter for ConsolePresenter {
    async fn show_overlay_video(
        &self,
        video: OverlayVideo,
    ) -> Result<ContentHandle, PresentationError> {
        println!("[overlay] {}", video.url);
        Ok(self.handle())
    }

    async fn show_popup_video(
        &self,
        video: PopupVideo,
    ) -> Result<ContentHandle, PresentationError> {
        println!(
            "[popup] {} at {:?} scaled {}x{}",
            video.url, video.anchor.pose.position, video.scale.width, video.scale.height
        );
        Ok(self.handle())
    }

    async fn show_quiz(&self, quiz: QuizPresentation) -> Result<ContentHandle, PresentationError> {
        println!("[quiz] {}", quiz.quiz.question);
        for (slot, answer) in quiz.quiz.answers.visible() {
            println!("  {slot}: {answer}");
        }
        if quiz.icon.is_none() {
            println!("  (no image)");
        }
        Ok(self.handle())
    }

    async fn show_model(
        &self,
        model: ModelPresentation,
    ) -> Result<ContentHandle, PresentationError> {
        println!(
            "[model] {} from {} ({} bytes)",
            model.asset_name,
            model.bundle.location,
            model.bundle.bytes.len()
        );
        Ok(self.handle())
    }

    fn destroy(&self, handle: ContentHandle) {
        println!("[destroy] content {}", handle.id());
    }
}

struct ConsoleHud;

impl Hud for ConsoleHud {
    fn set_loading(&self, visible: bool) {
        tracing::debug!(visible, "Loading indicator");
    }

    fn set_hud_visible(&self, visible: bool) {
        tracing::debug!(visible, "HUD");
    }

    fn set_preview_mode(&self, enabled: bool) {
        tracing::debug!(enabled, "Preview mode");
    }
}

struct ConsoleAssetLoader;

impl AssetLoader for ConsoleAssetLoader {
    fn release_all_bundles(&self) {
        println!("[assets] released all bundles");
    }
}

struct ConsoleAffordance;

impl ScanAffordance for ConsoleAffordance {
    fn play_scan_animation(&self) {
        tracing::debug!("Scan animation");
    }

    fn set_scan_icon_visible(&self, visible: bool) {
        tracing::debug!(visible, "Scan icon");
    }
}
