//! Tracked-marker set fed by the tracking feed's added/updated/removed
//! notifications.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::marker::{MarkerAnchor, MarkerIdentity, TrackableId, TrackedMarker, TrackingState};

/// One notification from the tracking feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackablesChanged {
    pub added: Vec<TrackedMarker>,
    pub updated: Vec<TrackedMarker>,
    pub removed: Vec<TrackableId>,
}

impl TrackablesChanged {
    pub fn added(markers: Vec<TrackedMarker>) -> Self {
        Self {
            added: markers,
            ..Default::default()
        }
    }

    pub fn updated(markers: Vec<TrackedMarker>) -> Self {
        Self {
            updated: markers,
            ..Default::default()
        }
    }

    pub fn removed(ids: Vec<TrackableId>) -> Self {
        Self {
            removed: ids,
            ..Default::default()
        }
    }
}

/// Order in which tracked markers are considered when picking a scan
/// candidate or a QR anchor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePolicy {
    /// Earliest-added trackable first.
    #[default]
    FirstDetected,
    /// Trackable with the latest added/updated notification first.
    MostRecentlyUpdated,
}

#[derive(Debug, Clone)]
struct Entry {
    marker: TrackedMarker,
    updated_seq: u64,
}

/// Currently tracked markers, kept in detection order.
#[derive(Debug, Default)]
pub struct TrackedMarkers {
    entries: IndexMap<TrackableId, Entry>,
    /// Markers that already triggered a resolution; cleared on removal.
    processed: HashSet<TrackableId>,
    seq: u64,
}

impl TrackedMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, change: &TrackablesChanged) {
        for id in &change.removed {
            if self.entries.shift_remove(id).is_some() {
                tracing::debug!(trackable = %id, "Trackable removed");
            }
            self.processed.remove(id);
        }

        for marker in change.added.iter().chain(change.updated.iter()) {
            self.seq += 1;
            match marker.state {
                TrackingState::Limited => tracing::debug!(
                    trackable = %marker.trackable_id,
                    name = %marker.reference_name,
                    "Trackable is limited, waiting for full tracking"
                ),
                TrackingState::None => tracing::debug!(
                    trackable = %marker.trackable_id,
                    "Trackable has no tracking"
                ),
                TrackingState::Tracking => {}
            }
            // Re-inserting an existing key keeps its detection position.
            self.entries.insert(
                marker.trackable_id,
                Entry {
                    marker: marker.clone(),
                    updated_seq: self.seq,
                },
            );
        }
    }

    pub fn get(&self, id: TrackableId) -> Option<&TrackedMarker> {
        self.entries.get(&id).map(|e| &e.marker)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_processed(&self, id: TrackableId) -> bool {
        self.processed.contains(&id)
    }

    pub fn mark_processed(&mut self, id: TrackableId) {
        self.processed.insert(id);
    }

    /// Markers in `Tracking` state, ordered by `policy`.
    pub fn tracking(&self, policy: CandidatePolicy) -> Vec<&TrackedMarker> {
        let mut entries: Vec<&Entry> = self
            .entries
            .values()
            .filter(|e| e.marker.is_tracking())
            .collect();
        if policy == CandidatePolicy::MostRecentlyUpdated {
            entries.sort_by(|a, b| b.updated_seq.cmp(&a.updated_seq));
        }
        entries.into_iter().map(|e| &e.marker).collect()
    }

    /// Scan candidate: the first tracking image marker with a valid identity.
    pub fn image_candidate(&self, policy: CandidatePolicy) -> Option<&TrackedMarker> {
        self.tracking(policy)
            .into_iter()
            .find(|m| m.identity().is_valid())
    }

    /// Next tracking image marker that has not triggered a resolution yet.
    pub fn next_unprocessed(
        &self,
        policy: CandidatePolicy,
    ) -> Option<(TrackableId, MarkerIdentity, MarkerAnchor)> {
        self.tracking(policy)
            .into_iter()
            .filter(|m| !self.processed.contains(&m.trackable_id))
            .find(|m| m.identity().is_valid())
            .map(|m| (m.trackable_id, m.identity(), m.anchor()))
    }

    /// Anchor for a decoded QR code: the first QR-class trackable in
    /// `Tracking` state.
    pub fn qr_anchor(&self, policy: CandidatePolicy) -> Option<MarkerAnchor> {
        self.tracking(policy)
            .into_iter()
            .find(|m| m.is_qr_class())
            .map(TrackedMarker::anchor)
    }
}
