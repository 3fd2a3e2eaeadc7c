//! Scan gate: the user-facing scan button and its animation/icon affordance.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::qr::QrCodeDetector;
use crate::session::{BehaviorResolver, SessionState};

/// Scan button visuals.
pub trait ScanAffordance: Send + Sync {
    fn play_scan_animation(&self);

    fn set_scan_icon_visible(&self, visible: bool);
}

pub struct ScanGate {
    resolver: Arc<BehaviorResolver>,
    qr: Option<Arc<QrCodeDetector>>,
    affordance: Arc<dyn ScanAffordance>,
    scanning: AtomicBool,
    last_state: Mutex<SessionState>,
}

impl std::fmt::Debug for ScanGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanGate")
            .field("scanning", &self.scanning.load(Ordering::Relaxed))
            .field("last_state", &*self.last_state.lock())
            .finish_non_exhaustive()
    }
}

impl ScanGate {
    pub fn new(resolver: Arc<BehaviorResolver>, affordance: Arc<dyn ScanAffordance>) -> Self {
        let state = resolver.state();
        Self {
            resolver,
            qr: None,
            affordance,
            scanning: AtomicBool::new(false),
            last_state: Mutex::new(state),
        }
    }

    /// Scans prefer a QR code cached by the detector over tracked images.
    pub fn with_qr_detector(mut self, qr: Arc<QrCodeDetector>) -> Self {
        self.qr = Some(qr);
        self
    }

    pub fn can_scan(&self) -> bool {
        self.resolver.can_scan()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Scan button pressed: start the scan animation. Ignored while a scan
    /// animation is running or the session is busy.
    pub fn start_scan(&self) -> bool {
        if !self.can_scan() {
            tracing::debug!("Scan button ignored, session busy");
            return false;
        }
        if self
            .scanning
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.affordance.play_scan_animation();
        true
    }

    /// Scan animation finished: run the cached QR result if there is one,
    /// otherwise scan the tracked images. Returns whether a resolution started.
    pub fn finish_scan(&self) -> bool {
        let found = match &self.qr {
            Some(qr) if qr.has_cached_result() => qr.execute_cached_result(),
            _ => self.resolver.scan(),
        };
        self.scan_completed(found);
        found
    }

    /// The scan icon stays hidden while found content resolves.
    pub fn scan_completed(&self, found: bool) {
        self.scanning.store(false, Ordering::SeqCst);
        self.affordance.set_scan_icon_visible(!found);
    }

    /// Re-show the scan icon whenever the session returns to idle.
    pub fn sync_affordance(&self, state: SessionState) {
        let mut last = self.last_state.lock();
        if state.is_idle() && !last.is_idle() {
            self.affordance.set_scan_icon_visible(true);
        }
        *last = state;
    }

    pub fn spawn_state_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let gate = Arc::clone(self);
        let mut rx = self.resolver.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                gate.sync_affordance(state);
            }
        })
    }
}
