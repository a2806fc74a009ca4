//! The route follower state machine and its worker thread.
//!
//! One follower is created per route and is single-use. A producer thread
//! (the location subsystem) hands in fixes through [`RouteFollower::update_fix`];
//! a dedicated worker consumes the latest fix, runs the
//! search/detect/snap/predict/resolve pipeline, and publishes one
//! [`NavigationStatus`] per cycle. The producer call is O(1): copy the fix,
//! set a flag, signal the worker. If several fixes arrive before the worker
//! wakes, only the newest is processed (latest-wins, no queueing).
//!
//! All tracking state lives inside the worker; the only shared data is the
//! latest-fix slot and the lifecycle flags, under a single monitor.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::error::{FollowError, Result};
use crate::geometry::RouteCursor;
use crate::location::FixListener;
use crate::offtrack::{OffTrackDetector, OffTrackSample, TrackStatus};
use crate::resolver::{active_landmarks, resolve_next_waypoint, LandmarkFlags};
use crate::route::Route;
use crate::search::{find_closest_segment, SearchOutcome, SearchResult};
use crate::snap::{predict_position, snap_course, snap_position, Pose};
use crate::status::{NavigationStatus, NextWaypoint, StatusSink};
use crate::{Fix, FollowerConfig, RouteSettings, TransportMode};

/// Lifecycle of a follower instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowerState {
    /// Created, worker not yet started.
    WaitingInitialPosition,
    /// Worker running, no position established on the route yet.
    CalculatingInitialPosition,
    Following,
    Paused,
    /// Terminal; reached on stop, destination or fatal error.
    Stopped,
}

/// Why a reroute was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerouteReason {
    OffTrack,
}

/// An asynchronous request for a replacement route.
#[derive(Debug, Clone)]
pub struct RerouteRequest {
    pub reason: RerouteReason,
    pub last_fix: Fix,
    /// Identifier of the route being abandoned.
    pub route_id: String,
    pub settings: RouteSettings,
}

/// Routing collaborator. Requests are fire-and-forget: the follower keeps
/// running on the old route until the host swaps in a new follower.
pub trait RerouteRequester: Send + Sync {
    fn request_reroute(&self, request: RerouteRequest);
}

struct Monitor {
    latest_fix: Option<Fix>,
    fix_pending: bool,
    running: bool,
    paused: bool,
    state: FollowerState,
}

struct Shared {
    route: Arc<Route>,
    settings: RouteSettings,
    config: FollowerConfig,
    monitor: Mutex<Monitor>,
    signal: Condvar,
    sinks: Mutex<Vec<Arc<dyn StatusSink>>>,
    requester: Mutex<Option<Arc<dyn RerouteRequester>>>,
}

impl Shared {
    fn lock_monitor(&self) -> MutexGuard<'_, Monitor> {
        match self.monitor.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Producer-side fix submission: copy, flag, signal. Never blocks on
    /// geometry work.
    fn submit_fix(&self, fix: &Fix) {
        let mut m = self.lock_monitor();
        if !m.running {
            return;
        }
        m.latest_fix = Some(*fix);
        m.fix_pending = true;
        // A paused follower accepts the fix but stays asleep; resume
        // delivers it.
        if !m.paused {
            self.signal.notify_all();
        }
    }

    fn request_stop(&self) {
        let mut m = self.lock_monitor();
        if !m.running {
            // Second and later calls are no-ops.
            return;
        }
        m.running = false;
        m.fix_pending = false;
        self.signal.notify_all();
    }

    fn publish(&self, status: Arc<NavigationStatus>) {
        let sinks = match self.sinks.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        for sink in sinks.iter() {
            sink.on_status(Arc::clone(&status));
        }
    }

    fn notify_error(&self, error: &FollowError) {
        let sinks = match self.sinks.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        for sink in sinks.iter() {
            sink.on_error(error);
        }
    }
}

struct FollowerFixListener(Arc<Shared>);

impl FixListener for FollowerFixListener {
    fn on_fix(&self, fix: &Fix) {
        self.0.submit_fix(fix);
    }
}

/// Follows one route. See the crate docs for the full lifecycle.
pub struct RouteFollower {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RouteFollower {
    pub fn new(route: Route, settings: RouteSettings, config: FollowerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                route: Arc::new(route),
                settings,
                config,
                monitor: Mutex::new(Monitor {
                    latest_fix: None,
                    fix_pending: false,
                    running: false,
                    paused: false,
                    state: FollowerState::WaitingInitialPosition,
                }),
                signal: Condvar::new(),
                sinks: Mutex::new(Vec::new()),
                requester: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn add_listener(&self, sink: Arc<dyn StatusSink>) {
        let mut sinks = match self.shared.sinks.lock() {
            Ok(s) => s,
            Err(poisoned) => poisoned.into_inner(),
        };
        sinks.push(sink);
    }

    pub fn set_reroute_requester(&self, requester: Arc<dyn RerouteRequester>) {
        let mut slot = match self.shared.requester.lock() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(requester);
    }

    /// Start the worker. Fails on anything but a fresh follower: instances
    /// are single-use and cannot be restarted.
    pub fn initialize(&self) -> Result<()> {
        {
            let mut m = self.shared.lock_monitor();
            if m.state != FollowerState::WaitingInitialPosition {
                return Err(FollowError::Lifecycle {
                    message: format!("initialize() in state {:?}", m.state),
                });
            }
            m.running = true;
            m.state = FollowerState::CalculatingInitialPosition;
        }

        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("route-follower".into())
            .spawn(move || Worker::new(shared).run())
            .map_err(|e| FollowError::Worker {
                message: format!("spawning worker: {}", e),
            })?;

        let mut worker = match self.worker.lock() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        };
        *worker = Some(handle);
        log::info!(
            "following route {} ({:?})",
            self.shared.route.route_id(),
            self.shared.settings.transport
        );
        Ok(())
    }

    /// Submit a fix. Safe from any thread; O(1); latest-wins.
    pub fn update_fix(&self, fix: &Fix) {
        self.shared.submit_fix(fix);
    }

    /// Adapter for wiring this follower into a [`LocationSource`].
    ///
    /// [`LocationSource`]: crate::location::LocationSource
    pub fn fix_listener(&self) -> Arc<dyn FixListener> {
        Arc::new(FollowerFixListener(Arc::clone(&self.shared)))
    }

    /// Suspend processing. Fixes are still accepted (latest-wins) but the
    /// worker stays asleep until [`resume`](Self::resume).
    pub fn pause(&self) {
        let mut m = self.shared.lock_monitor();
        if m.running {
            m.paused = true;
        }
    }

    pub fn resume(&self) {
        let mut m = self.shared.lock_monitor();
        if m.running && m.paused {
            m.paused = false;
            if m.fix_pending {
                self.shared.signal.notify_all();
            }
        }
    }

    /// Stop the follower. Idempotent, safe from any thread, wakes a blocked
    /// worker so it exits promptly.
    pub fn stop(&self) {
        self.shared.request_stop();
        let handle = {
            let mut worker = match self.worker.lock() {
                Ok(w) => w,
                Err(poisoned) => poisoned.into_inner(),
            };
            worker.take()
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.join() {
                log::error!("worker panicked: {:?}", e);
            }
        }
    }

    pub fn state(&self) -> FollowerState {
        let m = self.shared.lock_monitor();
        if m.running && m.paused {
            FollowerState::Paused
        } else {
            m.state
        }
    }
}

impl Drop for RouteFollower {
    fn drop(&mut self) {
        self.stop();
    }
}

enum CycleOutcome {
    Continue,
    DestinationReached,
}

/// Worker-owned tracking state. Never visible outside the worker thread;
/// external observers only see published snapshots.
struct Worker {
    shared: Arc<Shared>,
    cursor: RouteCursor,
    detector: OffTrackDetector,
    reroute_requested: bool,
    last_status: Option<Arc<NavigationStatus>>,
}

impl Worker {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            cursor: RouteCursor::start(),
            detector: OffTrackDetector::new(),
            reroute_requested: false,
            last_status: None,
        }
    }

    fn run(mut self) {
        loop {
            let fix = {
                let mut m = self.shared.lock_monitor();
                loop {
                    if !m.running {
                        drop(m);
                        self.publish_terminal();
                        self.set_stopped();
                        return;
                    }
                    if m.fix_pending && !m.paused {
                        m.fix_pending = false;
                        break m.latest_fix;
                    }
                    m = match self.shared.signal.wait(m) {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                }
            };
            let fix = match fix {
                Some(fix) => fix,
                None => continue,
            };

            match self.cycle(&fix) {
                Ok(CycleOutcome::Continue) => {}
                Ok(CycleOutcome::DestinationReached) => {
                    log::info!("destination reached on route {}", self.shared.route.route_id());
                    self.shared.request_stop();
                    self.set_stopped();
                    return;
                }
                Err(e) => {
                    // Fatal (malformed route data or an internal fault):
                    // exactly one error notification, then exit.
                    log::error!("route following failed: {}", e);
                    self.shared.notify_error(&e);
                    self.shared.request_stop();
                    self.publish_terminal();
                    self.set_stopped();
                    return;
                }
            }
        }
    }

    fn set_stopped(&self) {
        let mut m = self.shared.lock_monitor();
        m.state = FollowerState::Stopped;
    }

    /// One final "not following" snapshot if we were actively following.
    fn publish_terminal(&self) {
        if let Some(last) = &self.last_status {
            let mut terminal = (**last).clone();
            terminal.following = false;
            terminal.destination_reached = false;
            self.shared.publish(Arc::new(terminal));
        }
    }

    fn cycle(&mut self, fix: &Fix) -> Result<CycleOutcome> {
        let shared = Arc::clone(&self.shared);
        let route = shared.route.as_ref();
        let config = &shared.config;
        let pedestrian = shared.settings.transport == TransportMode::Pedestrian;

        let result = self.search(fix)?;
        let closest = match result.closest() {
            Some(c) => *c,
            None => {
                self.cycle_without_position(fix, result.outcome());
                return Ok(CycleOutcome::Continue);
            }
        };
        self.cursor = closest.cursor;

        let info = resolve_next_waypoint(route, &closest, fix, pedestrian, config)?;

        // Off-track detection is a car concern; a pedestrian wandering off
        // the sidewalk polyline is normal.
        let track_status = if pedestrian {
            TrackStatus::OnTrack
        } else {
            let sample = OffTrackSample {
                perp_distance_m: closest.distance_m,
                total_distance_left_m: info.distance_to_end_m,
                heading_rad: fix.course_rad,
                segment_course_rad: closest.segment.course(),
                speed_mps: fix.speed_mps,
            };
            self.detector.detect(&sample, config);
            self.detector.status()
        };
        let off_track = track_status.is_off_track();

        if off_track {
            log::debug!(
                "off-track for {} consecutive samples",
                self.detector.consecutive_off_samples()
            );
            self.maybe_request_reroute(fix);
        } else {
            self.reroute_requested = false;
        }

        let destination_reached = !off_track
            && info.turn.is_destination()
            && info.waypoint_index == route.final_waypoint_index()
            && info.distance_to_waypoint_m < config.destination_threshold_m;

        let snapped = if pedestrian || off_track {
            None
        } else if self.detector.position_snap_enabled() {
            Some(snap_position(route, &closest, fix)?)
        } else if self.detector.course_snap_enabled() {
            // Too far off the geometry for position snapping, but the
            // course still locks to the road.
            Some(snap_course(route, &closest, fix)?)
        } else {
            None
        };
        let predicted =
            predict_position(route, Some(&closest), fix, off_track, pedestrian, config)?;
        let landmarks = active_landmarks(route, info.waypoint_index, info.distance_to_waypoint_m);

        // Exit ramps are announced early: the published distance-to-go is
        // pulled forward, floored at zero. The landmark scan above keys on
        // the geometric distance, so it runs before this adjustment.
        let reported_to_waypoint_m = if info.turn.is_exit_ramp() {
            (info.distance_to_waypoint_m - config.ramp_adjust_m).max(0.0)
        } else {
            info.distance_to_waypoint_m
        };

        let point = route.point(closest.cursor.index() as usize)?;
        let status = self.build_status(fix, track_status, destination_reached, snapped, predicted);
        let status = NavigationStatus {
            next_waypoint: Some(NextWaypoint {
                index: info.waypoint_index,
                turn: info.turn,
            }),
            distance_to_waypoint_m: Some(reported_to_waypoint_m),
            time_to_waypoint_s: Some(info.time_to_waypoint_s),
            distance_to_end_m: Some(info.distance_to_end_m),
            time_to_end_s: Some(info.time_to_end_s),
            street: route.street_name(point).map(str::to_owned),
            speed_limit_kmh: Some(closest.segment.speed_limit_kmh),
            landmarks,
            following: !destination_reached,
            ..status
        };
        self.publish(status);

        if destination_reached {
            return Ok(CycleOutcome::DestinationReached);
        }
        self.promote_to_following();
        Ok(CycleOutcome::Continue)
    }

    /// Search with the strategy the current track status demands.
    fn search(&self, fix: &Fix) -> Result<SearchResult> {
        let route = &self.shared.route;
        let config = &self.shared.config;

        if self.detector.status().needs_full_search() {
            return find_closest_segment(route, RouteCursor::start(), fix, f64::INFINITY, config);
        }
        let forward =
            find_closest_segment(route, self.cursor, fix, config.max_forward_search_m, config)?;
        match forward.outcome() {
            SearchOutcome::Found => Ok(forward),
            // Nothing in forward range: rescan the whole route before
            // concluding anything.
            _ => find_closest_segment(route, RouteCursor::start(), fix, f64::INFINITY, config),
        }
    }

    /// Publish a cycle in which no route position could be established.
    fn cycle_without_position(&mut self, fix: &Fix, outcome: SearchOutcome) {
        let config = &self.shared.config;
        let pedestrian = self.shared.settings.transport == TransportMode::Pedestrian;

        let track_status = if pedestrian {
            TrackStatus::OnTrack
        } else {
            self.detector.note_search_failure(config);
            self.detector.status()
        };
        log::debug!("closest-segment search: {:?}", outcome);

        if track_status.is_off_track() {
            self.maybe_request_reroute(fix);
        }

        let status = self.build_status(fix, track_status, false, None, Pose::from_fix(fix));
        self.publish(status);
    }

    fn maybe_request_reroute(&mut self, fix: &Fix) {
        if self.reroute_requested || !self.shared.settings.auto_reroute {
            return;
        }
        let requester = {
            let slot = match self.shared.requester.lock() {
                Ok(r) => r,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot.clone()
        };
        if let Some(requester) = requester {
            log::info!("off-track: requesting reroute");
            requester.request_reroute(RerouteRequest {
                reason: RerouteReason::OffTrack,
                last_fix: *fix,
                route_id: self.shared.route.route_id().to_owned(),
                settings: self.shared.settings,
            });
            self.reroute_requested = true;
        }
    }

    /// Snapshot skeleton with the per-fix fields filled in; waypoint and
    /// street fields default to empty.
    fn build_status(
        &self,
        fix: &Fix,
        track_status: TrackStatus,
        destination_reached: bool,
        snapped: Option<Pose>,
        predicted: Pose,
    ) -> NavigationStatus {
        NavigationStatus {
            route_id: self.shared.route.route_id().to_owned(),
            following: true,
            track_status,
            destination_reached,
            position: fix.position,
            speed_mps: fix.speed_mps,
            snapped,
            predicted,
            next_waypoint: None,
            distance_to_waypoint_m: None,
            time_to_waypoint_s: None,
            distance_to_end_m: None,
            time_to_end_s: None,
            street: None,
            speed_limit_kmh: None,
            landmarks: LandmarkFlags::default(),
            timestamp_ms: fix.timestamp_ms,
        }
    }

    fn publish(&mut self, status: NavigationStatus) {
        let status = Arc::new(status);
        self.last_status = Some(Arc::clone(&status));
        self.shared.publish(status);
    }

    fn promote_to_following(&self) {
        let mut m = self.shared.lock_monitor();
        if m.state == FollowerState::CalculatingInitialPosition {
            m.state = FollowerState::Following;
        }
    }
}
