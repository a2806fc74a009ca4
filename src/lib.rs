//! # Route Follower
//!
//! Route-following core for a mobile navigation client.
//!
//! This library consumes a pre-computed [`Route`] and a stream of raw
//! location fixes, and produces one [`NavigationStatus`] snapshot per fix:
//! where the vehicle or pedestrian is relative to the route, whether it has
//! departed the route, a position snapped onto the road geometry for clean
//! map display, a short-horizon predicted position compensating for
//! rendering latency, and turn-by-turn distance/time-to-go plus landmark
//! (speed camera / detour) proximity.
//!
//! Rendering, tile caching, persistence and search protocols are
//! collaborators behind narrow interfaces, not part of this crate.
//!
//! ## Quick Start
//!
//! ```rust
//! use route_follower::{
//!     FollowerConfig, GeoPoint, Route, RouteFollower, RouteSettings, StatusMailbox, TurnKind,
//! };
//! use std::sync::Arc;
//!
//! // A 200 m straight test route in a single grid
//! let mut builder = Route::builder("demo");
//! let grid = builder.add_minimap(GeoPoint::new(47.0, 8.0));
//! builder.add_point(grid, 0, 0, 50, None);
//! builder.add_point(grid, 100, 0, 50, None);
//! builder.add_point(grid, 200, 0, 50, None);
//! builder.add_waypoint(2, TurnKind::Finally, 0.0, 0.0);
//! let route = builder.build().unwrap();
//!
//! let mailbox = StatusMailbox::new();
//! let follower = RouteFollower::new(route, RouteSettings::default(), FollowerConfig::default());
//! follower.add_listener(mailbox.clone());
//! follower.initialize().unwrap();
//! // feed fixes via follower.update_fix(..), read snapshots from the mailbox
//! follower.stop();
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{FollowError, OptionExt, Result};

// Geographic utilities (distance, course, local grid transforms)
pub mod geo_utils;

// Immutable route data model (mini-maps, waypoints, landmarks)
pub mod route;
pub use route::{Landmark, LandmarkKind, MiniMap, Route, RouteBuilder, RoutePoint, TurnKind, Waypoint};

// Route geometry iteration and projection math
pub mod geometry;
pub use geometry::{point_to_segment, Projection, RouteCursor, Segment};

// Closest-segment search
pub mod search;
pub use search::{find_closest_segment, ClosestSegment, SearchOutcome, SearchResult};

// Off-track detection state machine
pub mod offtrack;
pub use offtrack::{OffTrackDetector, TrackStatus};

// Position snapping and short-horizon prediction
pub mod snap;
pub use snap::{predict_position, snap_course, snap_position, Pose};

// Next-waypoint and landmark resolution
pub mod resolver;
pub use resolver::{active_landmarks, resolve_next_waypoint, LandmarkFlags, WaypointInfo};

// Navigation status snapshots and listener sinks
pub mod status;
pub use status::{NavigationStatus, NextWaypoint, StatusMailbox, StatusSink};

// Location source collaborators (GPS/network/simulated)
pub mod location;
pub use location::{
    FixCriteria, FixListener, ListenerId, LocationSource, ProviderKind, SimulatedLocationSource,
};

// The route follower state machine and its worker
pub mod follower;
pub use follower::{
    FollowerState, RerouteReason, RerouteRequest, RerouteRequester, RouteFollower,
};

/// Initialize logging for Android builds.
#[cfg(target_os = "android")]
pub fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("RouteFollowerRust"),
    );
}

/// Initialize logging (no-op on non-Android platforms).
#[cfg(not(target_os = "android"))]
pub fn init_logging() {}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use route_follower::GeoPoint;
/// let point = GeoPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A raw location fix as delivered by a location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub position: GeoPoint,
    /// Ground speed, m/s.
    pub speed_mps: f64,
    /// Course over ground, radians clockwise from north.
    pub course_rad: f64,
    /// Altitude above sea level, meters.
    pub altitude_m: f64,
    /// Estimated horizontal accuracy, meters (lower is better).
    pub accuracy_m: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
}

impl Fix {
    pub fn new(position: GeoPoint, speed_mps: f64, course_rad: f64) -> Self {
        Self {
            position,
            speed_mps,
            course_rad,
            altitude_m: 0.0,
            accuracy_m: 0.0,
            timestamp_ms: 0,
        }
    }
}

/// Transport mode the route was calculated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportMode {
    Car,
    Pedestrian,
}

/// Route-level settings, read-only from the follower's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteSettings {
    pub transport: TransportMode,
    /// Request a new route automatically on confirmed off-track.
    pub auto_reroute: bool,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            transport: TransportMode::Car,
            auto_reroute: true,
        }
    }
}

/// Tuning thresholds for the route follower.
///
/// All the heuristics are driven by this one struct, passed in at
/// construction. There are no global tunables; tests construct a config and
/// adjust individual fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerConfig {
    /// Forward search budget when on-track. Default: 500.0 meters
    pub max_forward_search_m: f64,

    /// Largest distance at which a searched segment is accepted as "the"
    /// closest segment; beyond this a forward search reports NotFound and
    /// the follower falls back to a full-route search. Default: 250.0 meters
    pub search_accept_distance_m: f64,

    /// Segments closer than this get a heading-mismatch penalty added to
    /// their distance, to break ties between parallel roads.
    /// Default: 50.0 meters
    pub angle_penalty_radius_m: f64,

    /// Cap for the heading-mismatch penalty. Default: 30.0 meters
    pub max_angle_penalty_m: f64,

    /// Perpendicular-distance jump above which a sample is rejected as a
    /// sensor glitch (the off-track accumulator is kept, not reset).
    /// Default: 200.0 meters
    pub max_perp_jump_m: f64,

    /// Heading disagreement with the upcoming segment treated as driving
    /// the wrong way. Default: 2.1 radians (~120 degrees)
    pub wrong_way_angle_rad: f64,

    /// Minimum speed for the wrong-way test and the snap gates.
    /// Default: 2.0 m/s
    pub min_moving_speed_mps: f64,

    /// Smallest perpendicular-distance change that counts as moving away
    /// from the route. Default: 5.0 meters
    pub min_perp_change_m: f64,

    /// Distance from the route still considered "close"; beyond it the
    /// per-sample penalty grows superlinearly. Default: 30.0 meters
    pub close_distance_m: f64,

    /// Cap for a single sample's off-track penalty. Default: 40.0
    pub per_sample_penalty_cap: f64,

    /// Accumulated penalty that confirms off-track; half of it already
    /// triggers a full-route rescan. Default: 100.0
    pub max_penalty: f64,

    /// Course error below which snapping engages. Default: 0.44 rad (~25°)
    pub snap_start_angle_rad: f64,

    /// Course error above which snapping breaks (at speed).
    /// Default: 1.05 rad (~60°)
    pub snap_break_angle_rad: f64,

    /// Minimum speed for the snap gates. Default: 1.5 m/s
    pub snap_min_speed_mps: f64,

    /// Maximum route distance for course snapping. Default: 40.0 meters
    pub snap_max_distance_m: f64,

    /// Maximum route distance for position snapping. Default: 20.0 meters
    pub snap_position_max_distance_m: f64,

    /// Look-ahead horizon of the predicted position. Default: 1.0 seconds
    pub prediction_horizon_s: f64,

    /// Speed clamp margin over the segment speed limit, guarding against
    /// GPS speed spikes. Default: 20.0 km/h
    pub speed_clamp_margin_kmh: f64,

    /// Fixed walking speed for pedestrian time estimates.
    /// Default: 6.0 km/h
    pub walking_speed_kmh: f64,

    /// Distance to a Finally waypoint at which the destination counts as
    /// reached. Default: 30.0 meters
    pub destination_threshold_m: f64,

    /// Fixed amount subtracted from distance-to-go for exit-ramp waypoints
    /// (floored at zero) to move the instruction earlier.
    /// Default: 100.0 meters
    pub ramp_adjust_m: f64,

    /// Heading disagreement on the route's first segment above which a
    /// leading U-turn waypoint reports zero distance/time (the user is
    /// still maneuvering). Default: 1.4 radians (~80 degrees)
    pub uturn_angle_rad: f64,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            max_forward_search_m: 500.0,
            search_accept_distance_m: 250.0,
            angle_penalty_radius_m: 50.0,
            max_angle_penalty_m: 30.0,
            max_perp_jump_m: 200.0,
            wrong_way_angle_rad: 2.1,
            min_moving_speed_mps: 2.0,
            min_perp_change_m: 5.0,
            close_distance_m: 30.0,
            per_sample_penalty_cap: 40.0,
            max_penalty: 100.0,
            snap_start_angle_rad: 0.44,
            snap_break_angle_rad: 1.05,
            snap_min_speed_mps: 1.5,
            snap_max_distance_m: 40.0,
            snap_position_max_distance_m: 20.0,
            prediction_horizon_s: 1.0,
            speed_clamp_margin_kmh: 20.0,
            walking_speed_kmh: 6.0,
            destination_threshold_m: 30.0,
            ramp_adjust_m: 100.0,
            uturn_angle_rad: 1.4,
        }
    }
}

impl FollowerConfig {
    /// Speed clamp margin in m/s.
    pub fn speed_clamp_margin_mps(&self) -> f64 {
        self.speed_clamp_margin_kmh / 3.6
    }
}

// ============================================================================
// Tests
// ============================================================================
