//! Event driver wiring tracking, QR and UI events into the session.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::presentation::PresentationError;
use crate::qr::QrCodeDetector;
use crate::scan_gate::{ScanAffordance, ScanGate};
use crate::session::{BehaviorResolver, SessionState};
use crate::tracking::TrackablesChanged;

/// Inputs from the tracking feed, the camera's QR decoder and the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedEvent {
    Trackables(TrackablesChanged),
    QrDecoded(String),
    /// Scan button pressed and its animation played to the end.
    ScanPressed,
    PresentationClosed,
    PresentationFailed(String),
    Abandon,
    Wait { ms: u64 },
}

#[derive(Debug, Clone)]
pub struct SessionDriver {
    resolver: Arc<BehaviorResolver>,
    qr: Arc<QrCodeDetector>,
    gate: Arc<ScanGate>,
}

impl SessionDriver {
    pub fn new(resolver: Arc<BehaviorResolver>, affordance: Arc<dyn ScanAffordance>) -> Self {
        let qr = Arc::new(QrCodeDetector::new(resolver.clone()));
        let gate =
            Arc::new(ScanGate::new(resolver.clone(), affordance).with_qr_detector(qr.clone()));
        Self { resolver, qr, gate }
    }

    pub fn resolver(&self) -> &Arc<BehaviorResolver> {
        &self.resolver
    }

    pub fn qr(&self) -> &Arc<QrCodeDetector> {
        &self.qr
    }

    pub fn gate(&self) -> &Arc<ScanGate> {
        &self.gate
    }

    pub async fn dispatch(&self, event: FeedEvent) {
        tracing::debug!(?event, "Dispatching feed event");
        match event {
            FeedEvent::Trackables(change) => {
                self.resolver.on_trackables_changed(&change);
            }
            FeedEvent::QrDecoded(payload) => {
                let outcome = self.qr.on_decoded(&payload);
                tracing::debug!(?outcome, "QR decoded");
            }
            FeedEvent::ScanPressed => {
                if self.gate.start_scan() {
                    self.gate.finish_scan();
                }
            }
            FeedEvent::PresentationClosed => {
                self.resolver.on_presentation_closed();
            }
            FeedEvent::PresentationFailed(message) => {
                self.resolver
                    .on_presentation_failed(PresentationError::Playback(message));
            }
            FeedEvent::Abandon => {
                self.resolver.abandon();
            }
            FeedEvent::Wait { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
        }
    }

    /// Wait until no resolution or teardown is in flight.
    pub async fn settle(&self) {
        let mut rx = self.resolver.subscribe();
        let _ = rx
            .wait_for(|state| matches!(state, SessionState::Idle | SessionState::Presenting))
            .await;
    }

    /// Dispatch events in order until the channel closes. Each event is
    /// handled after the previous one settled.
    pub async fn run(&self, mut events: mpsc::Receiver<FeedEvent>) {
        let listener = self.gate.spawn_state_listener();
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
            self.settle().await;
        }
        listener.abort();
    }
}
