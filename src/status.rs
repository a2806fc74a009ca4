//! Navigation status snapshots and listener plumbing.
//!
//! The worker publishes immutable [`NavigationStatus`] values; listeners
//! implement [`StatusSink`]. [`StatusMailbox`] is a ready-made sink holding
//! only the latest snapshot: a slow consumer never queues stale updates,
//! it simply observes the most recent state when it gets around to looking.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::FollowError;
use crate::offtrack::TrackStatus;
use crate::resolver::LandmarkFlags;
use crate::route::TurnKind;
use crate::snap::Pose;
use crate::GeoPoint;

/// The upcoming turn, as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextWaypoint {
    /// Index into the route's waypoint list.
    pub index: u16,
    pub turn: TurnKind,
}

/// One published navigation state. Immutable; shared via `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationStatus {
    pub route_id: String,
    /// False only in the terminal snapshot published on shutdown.
    pub following: bool,
    pub track_status: TrackStatus,
    /// One-shot: true in exactly one snapshot per route.
    pub destination_reached: bool,
    /// The raw fix position this cycle evaluated.
    pub position: GeoPoint,
    pub speed_mps: f64,
    /// Position snapped onto the road, when snapping is engaged.
    pub snapped: Option<Pose>,
    /// Latency-compensated look-ahead pose.
    pub predicted: Pose,
    pub next_waypoint: Option<NextWaypoint>,
    pub distance_to_waypoint_m: Option<f64>,
    pub time_to_waypoint_s: Option<f64>,
    pub distance_to_end_m: Option<f64>,
    pub time_to_end_s: Option<f64>,
    pub street: Option<String>,
    pub speed_limit_kmh: Option<u8>,
    pub landmarks: LandmarkFlags,
    /// Producer timestamp of the evaluated fix, millis.
    pub timestamp_ms: i64,
}

impl NavigationStatus {
    /// Serialize for a host shell that consumes JSON.
    pub fn to_json(&self) -> crate::error::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| FollowError::internal(format!("status serialization: {}", e)))
    }
}

/// Receiver of published snapshots. Implementations must not block: they
/// run on the worker thread.
pub trait StatusSink: Send + Sync {
    fn on_status(&self, status: Arc<NavigationStatus>);

    /// Called at most once, right before an abnormal worker exit.
    fn on_error(&self, _error: &FollowError) {}
}

#[derive(Default)]
struct MailboxSlot {
    latest: Option<Arc<NavigationStatus>>,
    error: Option<FollowError>,
}

/// A coalescing single-slot status receiver.
///
/// Every publication overwrites the previous one, so `take_latest` always
/// yields the newest snapshot and never a backlog.
#[derive(Default)]
pub struct StatusMailbox {
    slot: Mutex<MailboxSlot>,
    signal: Condvar,
}

impl StatusMailbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Remove and return the latest snapshot, if one arrived.
    pub fn take_latest(&self) -> Option<Arc<NavigationStatus>> {
        match self.slot.lock() {
            Ok(mut slot) => slot.latest.take(),
            Err(poisoned) => poisoned.into_inner().latest.take(),
        }
    }

    /// Block until a snapshot arrives, up to `timeout`.
    pub fn wait_latest(&self, timeout: Duration) -> Option<Arc<NavigationStatus>> {
        let deadline = Instant::now() + timeout;
        let mut slot = match self.slot.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if let Some(status) = slot.latest.take() {
                return Some(status);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            // Wakeups without a snapshot (spurious, or an error-only
            // notification) go back to waiting out the remaining time.
            let (guard, _) = match self.signal.wait_timeout(slot, deadline - now) {
                Ok(r) => r,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot = guard;
        }
    }

    /// The error delivered before an abnormal worker exit, if any.
    pub fn last_error(&self) -> Option<FollowError> {
        match self.slot.lock() {
            Ok(slot) => slot.error.clone(),
            Err(poisoned) => poisoned.into_inner().error.clone(),
        }
    }
}

impl StatusSink for StatusMailbox {
    fn on_status(&self, status: Arc<NavigationStatus>) {
        let mut slot = match self.slot.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.latest = Some(status);
        self.signal.notify_all();
    }

    fn on_error(&self, error: &FollowError) {
        let mut slot = match self.slot.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.error = Some(error.clone());
        self.signal.notify_all();
    }
}
