//! Immutable route data model.
//!
//! A route is an ordered polyline whose points live in local "mini-map"
//! grids: fixed-precision coordinate frames with their own geographic
//! origin, sized so that coordinate deltas stay inside a safe numeric
//! range. Each inter-point segment carries a speed limit and a street
//! reference. A subset of points are turn waypoints (with cumulative
//! distance/time to the route end) and some are distance-threshold markers
//! carrying precomputed remaining totals. Landmarks (speed cameras,
//! detours) are active over a window expressed in waypoint-index /
//! approach-distance terms.
//!
//! Routes are built once through [`RouteBuilder`], validated, and never
//! mutated afterwards. A [`RouteFollower`](crate::RouteFollower) owns
//! exactly one route for its whole life.

use serde::{Deserialize, Serialize};

use crate::error::{FollowError, Result};
use crate::geo_utils::{local_offset_m, offset_to_geo};
use crate::GeoPoint;

/// Safe bound for local grid coordinates, in meters from the grid origin.
///
/// Products of coordinate deltas are computed in i64, so values up to this
/// bound can never overflow the projection math.
pub const MAX_LOCAL_COORD: i32 = 30_000;

/// A local fixed-precision coordinate grid covering part of the route.
///
/// Local coordinates are meters east (x) and north (y) of the origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MiniMap {
    pub origin: GeoPoint,
}

impl MiniMap {
    pub fn new(origin: GeoPoint) -> Self {
        Self { origin }
    }

    /// Convert a geographic point into this grid's local frame (meters).
    pub fn to_local(&self, p: &GeoPoint) -> (f64, f64) {
        local_offset_m(&self.origin, p)
    }

    /// Convert a geographic point into this grid, or `None` if it falls
    /// outside the safe coordinate bound.
    pub fn to_local_checked(&self, p: &GeoPoint) -> Option<(i32, i32)> {
        let (x, y) = self.to_local(p);
        let max = MAX_LOCAL_COORD as f64;
        if x.abs() > max || y.abs() > max {
            return None;
        }
        Some((x.round() as i32, y.round() as i32))
    }

    /// Convert local coordinates back to a geographic point.
    pub fn to_geo(&self, x: f64, y: f64) -> GeoPoint {
        offset_to_geo(&self.origin, x, y)
    }

    /// Offset in meters (east, north) of `other`'s origin relative to this
    /// grid's origin. Used to re-anchor points across grid boundaries.
    pub fn offset_of(&self, other: &MiniMap) -> (f64, f64) {
        local_offset_m(&self.origin, &other.origin)
    }
}

/// Turn type carried by a waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnKind {
    Straight,
    Left,
    Right,
    HardLeft,
    HardRight,
    UTurn,
    ExitLeft,
    ExitRight,
    /// Destination waypoint; every route ends with exactly one.
    Finally,
}

impl TurnKind {
    /// Exit-ramp turns get their announcement distance pulled forward.
    pub fn is_exit_ramp(&self) -> bool {
        matches!(self, TurnKind::ExitLeft | TurnKind::ExitRight)
    }

    pub fn is_destination(&self) -> bool {
        matches!(self, TurnKind::Finally)
    }
}

/// A turn waypoint with precomputed totals to the route end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Index of the route point this waypoint sits on.
    pub point_index: u32,
    pub turn: TurnKind,
    /// Remaining distance from this waypoint to the route end, meters.
    pub distance_to_end_m: f64,
    /// Remaining time from this waypoint to the route end, seconds.
    pub time_to_end_s: f64,
}

/// A distance-threshold marker with precomputed remaining totals.
///
/// Threshold markers let the waypoint resolver stop a forward walk early:
/// the accumulated prefix is combined with these totals instead of walking
/// all the way to the next waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub point_index: u32,
    pub distance_to_end_m: f64,
    pub time_to_end_s: f64,
}

/// Kind of route-attached warning landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandmarkKind {
    SpeedCamera,
    Detour,
}

/// A warning landmark, active over a waypoint/approach-distance window.
///
/// The window boundaries are expressed as "within `distance_m` meters of
/// waypoint `waypoint`": the start boundary has been passed once the
/// tracked entity is that close to (or beyond) the start waypoint, and the
/// landmark deactivates once the end boundary is passed the same way.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub kind: LandmarkKind,
    pub start_waypoint: u16,
    pub start_distance_m: f64,
    pub end_waypoint: u16,
    pub end_distance_m: f64,
}

/// One route point. Segment `i` runs from point `i` to point `i + 1` and
/// carries point `i`'s speed limit and street.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    /// Meters east of the owning grid's origin.
    pub x: i32,
    /// Meters north of the owning grid's origin.
    pub y: i32,
    /// Index into the route's mini-map list.
    pub minimap: u16,
    /// Speed limit of the outgoing segment, km/h.
    pub speed_limit_kmh: u8,
    /// Index into the route's street-name table, if known.
    pub street: Option<u16>,
    /// Back-reference into the waypoint list, if this point is a waypoint.
    pub waypoint: Option<u16>,
    /// Back-reference into the threshold list, if this point is a marker.
    pub threshold: Option<u16>,
}

/// An immutable, validated route.
#[derive(Debug, Clone)]
pub struct Route {
    route_id: String,
    minimaps: Vec<MiniMap>,
    points: Vec<RoutePoint>,
    waypoints: Vec<Waypoint>,
    thresholds: Vec<Threshold>,
    landmarks: Vec<Landmark>,
    streets: Vec<String>,
}

impl Route {
    pub fn builder(route_id: impl Into<String>) -> RouteBuilder {
        RouteBuilder::new(route_id)
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Fetch a route point, failing with a route-data error past the end.
    ///
    /// Stepping past the end of a truncated route surfaces here, which is
    /// what makes malformed routes fatal to the follower.
    pub fn point(&self, index: usize) -> Result<&RoutePoint> {
        self.points.get(index).ok_or_else(|| FollowError::RouteData {
            message: format!("point index {} past route end ({})", index, self.points.len()),
        })
    }

    pub fn minimap(&self, grid: u16) -> Result<&MiniMap> {
        self.minimaps
            .get(grid as usize)
            .ok_or_else(|| FollowError::RouteData {
                message: format!("mini-map {} missing ({} grids)", grid, self.minimaps.len()),
            })
    }

    pub fn waypoint(&self, index: u16) -> Result<&Waypoint> {
        self.waypoints
            .get(index as usize)
            .ok_or_else(|| FollowError::RouteData {
                message: format!("waypoint {} missing", index),
            })
    }

    pub fn threshold(&self, index: u16) -> Result<&Threshold> {
        self.thresholds
            .get(index as usize)
            .ok_or_else(|| FollowError::RouteData {
                message: format!("threshold {} missing", index),
            })
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn first_waypoint(&self) -> &Waypoint {
        // Non-empty by construction
        &self.waypoints[0]
    }

    pub fn final_waypoint_index(&self) -> u16 {
        (self.waypoints.len() - 1) as u16
    }

    pub fn street_name(&self, point: &RoutePoint) -> Option<&str> {
        point
            .street
            .and_then(|s| self.streets.get(s as usize))
            .map(String::as_str)
    }

    /// First waypoint whose point index is strictly after `point_index`.
    pub fn waypoint_after(&self, point_index: u32) -> Option<(u16, &Waypoint)> {
        self.waypoints
            .iter()
            .enumerate()
            .find(|(_, w)| w.point_index > point_index)
            .map(|(i, w)| (i as u16, w))
    }
}

/// Builder that validates route data before freezing it into a [`Route`].
#[derive(Debug, Default)]
pub struct RouteBuilder {
    route_id: String,
    minimaps: Vec<MiniMap>,
    points: Vec<RoutePoint>,
    waypoints: Vec<Waypoint>,
    thresholds: Vec<Threshold>,
    landmarks: Vec<Landmark>,
    streets: Vec<String>,
}

impl RouteBuilder {
    pub fn new(route_id: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            ..Default::default()
        }
    }

    /// Register a mini-map grid and return its index.
    pub fn add_minimap(&mut self, origin: GeoPoint) -> u16 {
        self.minimaps.push(MiniMap::new(origin));
        (self.minimaps.len() - 1) as u16
    }

    /// Register a street name and return its index.
    pub fn add_street(&mut self, name: impl Into<String>) -> u16 {
        self.streets.push(name.into());
        (self.streets.len() - 1) as u16
    }

    /// Append a route point; returns its index.
    pub fn add_point(
        &mut self,
        minimap: u16,
        x: i32,
        y: i32,
        speed_limit_kmh: u8,
        street: Option<u16>,
    ) -> u32 {
        self.points.push(RoutePoint {
            x,
            y,
            minimap,
            speed_limit_kmh,
            street,
            waypoint: None,
            threshold: None,
        });
        (self.points.len() - 1) as u32
    }

    /// Mark an existing point as a turn waypoint.
    pub fn add_waypoint(
        &mut self,
        point_index: u32,
        turn: TurnKind,
        distance_to_end_m: f64,
        time_to_end_s: f64,
    ) -> &mut Self {
        self.waypoints.push(Waypoint {
            point_index,
            turn,
            distance_to_end_m,
            time_to_end_s,
        });
        self
    }

    /// Mark an existing point as a distance-threshold marker.
    pub fn add_threshold(
        &mut self,
        point_index: u32,
        distance_to_end_m: f64,
        time_to_end_s: f64,
    ) -> &mut Self {
        self.thresholds.push(Threshold {
            point_index,
            distance_to_end_m,
            time_to_end_s,
        });
        self
    }

    pub fn add_landmark(&mut self, landmark: Landmark) -> &mut Self {
        self.landmarks.push(landmark);
        self
    }

    /// Validate and freeze the route.
    pub fn build(mut self) -> Result<Route> {
        if self.points.len() < 2 {
            return Err(FollowError::InsufficientPoints {
                point_count: self.points.len(),
                minimum_required: 2,
            });
        }

        for (i, p) in self.points.iter().enumerate() {
            if p.minimap as usize >= self.minimaps.len() {
                return Err(FollowError::InvalidGrid {
                    point_index: i,
                    grid: p.minimap,
                });
            }
            if p.x.abs() > MAX_LOCAL_COORD || p.y.abs() > MAX_LOCAL_COORD {
                return Err(FollowError::CoordinateRange {
                    message: format!("point {} at ({}, {}) exceeds grid bound", i, p.x, p.y),
                });
            }
            if let Some(s) = p.street {
                if s as usize >= self.streets.len() {
                    return Err(FollowError::route_data(format!(
                        "point {} references unknown street {}",
                        i, s
                    )));
                }
            }
        }

        self.waypoints.sort_by_key(|w| w.point_index);
        self.thresholds.sort_by_key(|t| t.point_index);

        let last_index = (self.points.len() - 1) as u32;
        match self.waypoints.last() {
            Some(w) if w.turn == TurnKind::Finally && w.point_index == last_index => {}
            _ => {
                return Err(FollowError::route_data(
                    "route must end with a Finally waypoint on its last point",
                ));
            }
        }

        for w in &self.waypoints {
            if w.point_index as usize >= self.points.len() {
                return Err(FollowError::route_data(format!(
                    "waypoint on missing point {}",
                    w.point_index
                )));
            }
        }
        for t in &self.thresholds {
            if t.point_index as usize >= self.points.len() {
                return Err(FollowError::route_data(format!(
                    "threshold on missing point {}",
                    t.point_index
                )));
            }
        }
        let waypoint_count = self.waypoints.len() as u16;
        for l in &self.landmarks {
            if l.start_waypoint >= waypoint_count || l.end_waypoint >= waypoint_count {
                return Err(FollowError::route_data(
                    "landmark references a missing waypoint",
                ));
            }
        }

        // Wire back-references so the iterator can answer point queries
        // without searching the side tables.
        for (wi, w) in self.waypoints.iter().enumerate() {
            self.points[w.point_index as usize].waypoint = Some(wi as u16);
        }
        for (ti, t) in self.thresholds.iter().enumerate() {
            self.points[t.point_index as usize].threshold = Some(ti as u16);
        }

        Ok(Route {
            route_id: self.route_id,
            minimaps: self.minimaps,
            points: self.points,
            waypoints: self.waypoints,
            thresholds: self.thresholds,
            landmarks: self.landmarks,
            streets: self.streets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_route() -> Route {
        let mut b = Route::builder("test-route");
        let grid = b.add_minimap(GeoPoint::new(47.0, 8.0));
        let street = b.add_street("Main Street");
        b.add_point(grid, 0, 0, 50, Some(street));
        b.add_point(grid, 100, 0, 50, Some(street));
        b.add_point(grid, 200, 0, 50, Some(street));
        b.add_waypoint(2, TurnKind::Finally, 0.0, 0.0);
        b.build().unwrap()
    }

    #[test]
    fn test_build_valid_route() {
        let route = straight_route();
        assert_eq!(route.point_count(), 3);
        assert_eq!(route.first_waypoint().turn, TurnKind::Finally);
        assert_eq!(route.point(2).unwrap().waypoint, Some(0));
        assert_eq!(
            route.street_name(route.point(0).unwrap()),
            Some("Main Street")
        );
    }

    #[test]
    fn test_build_rejects_too_few_points() {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(GeoPoint::new(47.0, 8.0));
        b.add_point(grid, 0, 0, 50, None);
        assert!(matches!(
            b.build(),
            Err(FollowError::InsufficientPoints { .. })
        ));
    }

    #[test]
    fn test_build_rejects_bad_grid() {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(GeoPoint::new(47.0, 8.0));
        b.add_point(grid, 0, 0, 50, None);
        b.add_point(9, 100, 0, 50, None); // grid 9 doesn't exist
        b.add_waypoint(1, TurnKind::Finally, 0.0, 0.0);
        assert!(matches!(b.build(), Err(FollowError::InvalidGrid { .. })));
    }

    #[test]
    fn test_build_requires_finally() {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(GeoPoint::new(47.0, 8.0));
        b.add_point(grid, 0, 0, 50, None);
        b.add_point(grid, 100, 0, 50, None);
        assert!(b.build().is_err());

        let mut b = Route::builder("r");
        let grid = b.add_minimap(GeoPoint::new(47.0, 8.0));
        b.add_point(grid, 0, 0, 50, None);
        b.add_point(grid, 100, 0, 50, None);
        b.add_waypoint(0, TurnKind::Finally, 100.0, 7.2); // not on last point
        assert!(b.build().is_err());
    }

    #[test]
    fn test_build_rejects_out_of_bound_coords() {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(GeoPoint::new(47.0, 8.0));
        b.add_point(grid, 0, 0, 50, None);
        b.add_point(grid, MAX_LOCAL_COORD + 1, 0, 50, None);
        b.add_waypoint(1, TurnKind::Finally, 0.0, 0.0);
        assert!(matches!(
            b.build(),
            Err(FollowError::CoordinateRange { .. })
        ));
    }

    #[test]
    fn test_minimap_round_trip() {
        let grid = MiniMap::new(GeoPoint::new(47.0, 8.0));
        let geo = grid.to_geo(1200.0, -300.0);
        let (x, y) = grid.to_local_checked(&geo).unwrap();
        assert_eq!(x, 1200);
        assert_eq!(y, -300);
    }

    #[test]
    fn test_minimap_bound_check() {
        let grid = MiniMap::new(GeoPoint::new(47.0, 8.0));
        let far = grid.to_geo(40_000.0, 0.0);
        assert!(grid.to_local_checked(&far).is_none());
    }

    #[test]
    fn test_waypoint_after() {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(GeoPoint::new(47.0, 8.0));
        b.add_point(grid, 0, 0, 50, None);
        b.add_point(grid, 100, 0, 50, None);
        b.add_point(grid, 200, 0, 50, None);
        b.add_waypoint(1, TurnKind::Right, 100.0, 7.2);
        b.add_waypoint(2, TurnKind::Finally, 0.0, 0.0);
        let route = b.build().unwrap();

        let (i, w) = route.waypoint_after(0).unwrap();
        assert_eq!(i, 0);
        assert_eq!(w.point_index, 1);

        let (i, w) = route.waypoint_after(1).unwrap();
        assert_eq!(i, 1);
        assert_eq!(w.point_index, 2);

        assert!(route.waypoint_after(2).is_none());
    }
}
