//! Next-waypoint and landmark resolution.
//!
//! From the closest-segment cursor the resolver walks forward accumulating
//! distance and time until it hits either a turn waypoint (stop, report the
//! accumulated values) or a distance-threshold marker (stop early and
//! combine the marker's precomputed remaining totals with the accumulated
//! prefix). Time accumulates per segment from its speed limit; pedestrian
//! mode substitutes a fixed walking speed throughout.

use serde::{Deserialize, Serialize};

use crate::error::{FollowError, OptionExt, Result};
use crate::geo_utils::course_difference;
use crate::route::{LandmarkKind, Route, TurnKind};
use crate::search::ClosestSegment;
use crate::{Fix, FollowerConfig};

/// Resolved next-waypoint figures for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaypointInfo {
    /// Index into the route's waypoint list.
    pub waypoint_index: u16,
    pub turn: TurnKind,
    pub distance_to_waypoint_m: f64,
    pub time_to_waypoint_s: f64,
    pub distance_to_end_m: f64,
    pub time_to_end_s: f64,
}

/// Which landmark warnings are active this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LandmarkFlags {
    pub speed_camera: bool,
    pub detour: bool,
}

/// Travel time for a stretch of road, hours-per-km arithmetic.
fn travel_time_s(
    distance_m: f64,
    speed_limit_kmh: u8,
    pedestrian: bool,
    config: &FollowerConfig,
) -> f64 {
    let kmh = if pedestrian {
        config.walking_speed_kmh
    } else {
        speed_limit_kmh.max(1) as f64
    };
    distance_m * 3600.0 / (kmh * 1000.0)
}

/// Resolve the next waypoint ahead of the closest segment.
///
/// Special case: when the closest segment is the route's very first segment
/// and the route begins with a U-turn the user hasn't completed yet
/// (heading disagrees with the segment course beyond the U-turn gate), the
/// immediate waypoint is reported at zero distance/time instead of walking
/// forward — the user is still maneuvering.
pub fn resolve_next_waypoint(
    route: &Route,
    closest: &ClosestSegment,
    fix: &Fix,
    pedestrian: bool,
    config: &FollowerConfig,
) -> Result<WaypointInfo> {
    if closest.cursor.index() == 0 {
        let first = route.first_waypoint();
        if first.turn == TurnKind::UTurn {
            if let Some(course) = closest.segment.course() {
                if course_difference(fix.course_rad, course) > config.uturn_angle_rad {
                    return Ok(WaypointInfo {
                        waypoint_index: 0,
                        turn: TurnKind::UTurn,
                        distance_to_waypoint_m: 0.0,
                        time_to_waypoint_s: 0.0,
                        distance_to_end_m: first.distance_to_end_m,
                        time_to_end_s: first.time_to_end_s,
                    });
                }
            }
        }
    }

    let mut acc_m = closest.projection.remaining_m;
    let mut acc_s = travel_time_s(acc_m, closest.segment.speed_limit_kmh, pedestrian, config);
    let mut cursor = closest.cursor.advance(route, false)?;

    loop {
        let point = route.point(cursor.index() as usize)?;

        if let Some(wi) = point.waypoint {
            let wp = route.waypoint(wi)?;
            return Ok(WaypointInfo {
                waypoint_index: wi,
                turn: wp.turn,
                distance_to_waypoint_m: acc_m,
                time_to_waypoint_s: acc_s,
                distance_to_end_m: wp.distance_to_end_m + acc_m,
                time_to_end_s: wp.time_to_end_s + acc_s,
            });
        }

        if let Some(ti) = point.threshold {
            // The marker carries precomputed totals to the route end;
            // combine them with the accumulated prefix, then locate its
            // associated waypoint for the per-turn figures.
            let thr = route.threshold(ti)?;
            let distance_to_end_m = thr.distance_to_end_m + acc_m;
            let time_to_end_s = thr.time_to_end_s + acc_s;
            let (wi, wp) = route
                .waypoint_after(thr.point_index)
                .ok_or_route_data("distance threshold with no waypoint after it")?;
            return Ok(WaypointInfo {
                waypoint_index: wi,
                turn: wp.turn,
                distance_to_waypoint_m: (distance_to_end_m - wp.distance_to_end_m).max(0.0),
                time_to_waypoint_s: (time_to_end_s - wp.time_to_end_s).max(0.0),
                distance_to_end_m,
                time_to_end_s,
            });
        }

        if !cursor.is_valid(route) {
            return Err(FollowError::route_data(
                "route ends without a terminating waypoint",
            ));
        }
        let segment = cursor.segment(route)?;
        let length = segment.length_m();
        acc_m += length;
        acc_s += travel_time_s(length, segment.speed_limit_kmh, pedestrian, config);
        cursor = cursor.advance(route, false)?;
    }
}

/// Scan the route's landmarks for ones active at the current position.
///
/// A landmark is active once its start boundary has been passed and its
/// end boundary has not; both boundaries are "within N meters of waypoint
/// W" comparisons against the resolved next waypoint.
pub fn active_landmarks(
    route: &Route,
    waypoint_index: u16,
    distance_to_waypoint_m: f64,
) -> LandmarkFlags {
    let passed = |wp: u16, dist: f64| {
        waypoint_index > wp || (waypoint_index == wp && distance_to_waypoint_m <= dist)
    };

    let mut flags = LandmarkFlags::default();
    for lm in route.landmarks() {
        let started = passed(lm.start_waypoint, lm.start_distance_m);
        let ended = passed(lm.end_waypoint, lm.end_distance_m);
        if started && !ended {
            match lm.kind {
                LandmarkKind::SpeedCamera => flags.speed_camera = true,
                LandmarkKind::Detour => flags.detour = true,
            }
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::offset_to_geo;
    use crate::geometry::RouteCursor;
    use crate::route::Landmark;
    use crate::search::find_closest_segment;
    use crate::GeoPoint;

    const EAST: f64 = std::f64::consts::FRAC_PI_2;
    const WEST: f64 = 3.0 * std::f64::consts::FRAC_PI_2;

    fn origin() -> GeoPoint {
        GeoPoint::new(47.0, 8.0)
    }

    fn fix_at(east_m: f64, course: f64) -> Fix {
        Fix::new(offset_to_geo(&origin(), east_m, 0.0), 10.0, course)
    }

    fn closest_for(route: &Route, fix: &Fix) -> ClosestSegment {
        let config = FollowerConfig::default();
        *find_closest_segment(route, RouteCursor::start(), fix, f64::INFINITY, &config)
            .unwrap()
            .closest()
            .unwrap()
    }

    /// 300 m eastbound, turn at 200 m, destination at 300 m. 50 km/h.
    fn route_with_turn() -> Route {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(origin());
        b.add_point(grid, 0, 0, 50, None);
        b.add_point(grid, 100, 0, 50, None);
        b.add_point(grid, 200, 0, 50, None);
        b.add_point(grid, 300, 0, 50, None);
        // 100 m to go from the turn: 7.2 s at 50 km/h
        b.add_waypoint(2, TurnKind::Right, 100.0, 7.2);
        b.add_waypoint(3, TurnKind::Finally, 0.0, 0.0);
        b.build().unwrap()
    }

    #[test]
    fn test_distance_decreases_toward_waypoint() {
        let route = route_with_turn();
        let config = FollowerConfig::default();

        let mut last = f64::INFINITY;
        for east in [0.0, 50.0, 120.0, 180.0] {
            let fix = fix_at(east, EAST);
            let closest = closest_for(&route, &fix);
            let info =
                resolve_next_waypoint(&route, &closest, &fix, false, &config).unwrap();
            assert_eq!(info.waypoint_index, 0);
            assert_eq!(info.turn, TurnKind::Right);
            assert!((info.distance_to_waypoint_m - (200.0 - east)).abs() < 1.5);
            assert!(info.distance_to_waypoint_m < last);
            last = info.distance_to_waypoint_m;
        }

        // Past the turn the destination takes over.
        let fix = fix_at(210.0, EAST);
        let closest = closest_for(&route, &fix);
        let info = resolve_next_waypoint(&route, &closest, &fix, false, &config).unwrap();
        assert_eq!(info.turn, TurnKind::Finally);
        assert!((info.distance_to_waypoint_m - 90.0).abs() < 1.5);
    }

    #[test]
    fn test_time_accumulates_from_speed_limits() {
        let route = route_with_turn();
        let config = FollowerConfig::default();

        let fix = fix_at(0.0, EAST);
        let closest = closest_for(&route, &fix);
        let info = resolve_next_waypoint(&route, &closest, &fix, false, &config).unwrap();
        // 200 m at 50 km/h = 14.4 s to the turn; 300 m total = 21.6 s
        assert!((info.time_to_waypoint_s - 14.4).abs() < 0.2);
        assert!((info.distance_to_end_m - 300.0).abs() < 1.5);
        assert!((info.time_to_end_s - 21.6).abs() < 0.2);
    }

    #[test]
    fn test_pedestrian_uses_walking_speed() {
        let route = route_with_turn();
        let config = FollowerConfig::default();

        let fix = fix_at(0.0, EAST);
        let closest = closest_for(&route, &fix);
        let info = resolve_next_waypoint(&route, &closest, &fix, true, &config).unwrap();
        // 200 m at 6 km/h = 120 s
        assert!((info.time_to_waypoint_s - 120.0).abs() < 1.0);
    }

    #[test]
    fn test_threshold_combines_precomputed_totals() {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(origin());
        b.add_point(grid, 0, 0, 50, None);
        b.add_point(grid, 100, 0, 50, None); // threshold marker
        b.add_point(grid, 200, 0, 50, None);
        b.add_point(grid, 300, 0, 50, None);
        // 200 m and 14.4 s remain at the marker
        b.add_threshold(1, 200.0, 14.4);
        b.add_waypoint(3, TurnKind::Finally, 0.0, 0.0);
        let route = b.build().unwrap();
        let config = FollowerConfig::default();

        let fix = fix_at(40.0, EAST);
        let closest = closest_for(&route, &fix);
        let info = resolve_next_waypoint(&route, &closest, &fix, false, &config).unwrap();
        // 60 m prefix + 200 m precomputed
        assert!((info.distance_to_end_m - 260.0).abs() < 1.5);
        assert_eq!(info.turn, TurnKind::Finally);
        assert!((info.distance_to_waypoint_m - 260.0).abs() < 1.5);
    }

    #[test]
    fn test_first_segment_uturn_reports_zero() {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(origin());
        b.add_point(grid, 0, 0, 50, None);
        b.add_point(grid, 100, 0, 50, None);
        b.add_point(grid, 200, 0, 50, None);
        b.add_waypoint(1, TurnKind::UTurn, 100.0, 7.2);
        b.add_waypoint(2, TurnKind::Finally, 0.0, 0.0);
        let route = b.build().unwrap();
        let config = FollowerConfig::default();

        // Driving against the first segment: still maneuvering.
        let fix = fix_at(30.0, WEST);
        let closest = closest_for(&route, &fix);
        let info = resolve_next_waypoint(&route, &closest, &fix, false, &config).unwrap();
        assert_eq!(info.turn, TurnKind::UTurn);
        assert_eq!(info.distance_to_waypoint_m, 0.0);
        assert_eq!(info.time_to_waypoint_s, 0.0);

        // Once aligned with the segment, normal resolution resumes.
        let fix = fix_at(30.0, EAST);
        let closest = closest_for(&route, &fix);
        let info = resolve_next_waypoint(&route, &closest, &fix, false, &config).unwrap();
        assert!((info.distance_to_waypoint_m - 70.0).abs() < 1.5);
    }

    #[test]
    fn test_exit_ramp_distance_stays_geometric() {
        // The early-announcement adjustment for exit ramps is a display
        // concern applied by the follower; the resolver reports the real
        // geometric distance so landmark windows stay anchored.
        let mut b = Route::builder("r");
        let grid = b.add_minimap(origin());
        b.add_point(grid, 0, 0, 100, None);
        b.add_point(grid, 300, 0, 100, None);
        b.add_point(grid, 400, 0, 100, None);
        b.add_waypoint(1, TurnKind::ExitRight, 100.0, 3.6);
        b.add_waypoint(2, TurnKind::Finally, 0.0, 0.0);
        let route = b.build().unwrap();
        let config = FollowerConfig::default();

        let fix = fix_at(50.0, EAST);
        let closest = closest_for(&route, &fix);
        let info = resolve_next_waypoint(&route, &closest, &fix, false, &config).unwrap();
        assert_eq!(info.turn, TurnKind::ExitRight);
        assert!((info.distance_to_waypoint_m - 250.0).abs() < 1.5);
        assert!((info.distance_to_end_m - 350.0).abs() < 1.5);
    }

    #[test]
    fn test_landmark_window_activation() {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(origin());
        b.add_point(grid, 0, 0, 50, None);
        b.add_point(grid, 200, 0, 50, None);
        b.add_point(grid, 400, 0, 50, None);
        b.add_waypoint(1, TurnKind::Right, 200.0, 14.4);
        b.add_waypoint(2, TurnKind::Finally, 0.0, 0.0);
        // Camera active from 150 m before waypoint 0 until 50 m before it.
        b.add_landmark(Landmark {
            kind: LandmarkKind::SpeedCamera,
            start_waypoint: 0,
            start_distance_m: 150.0,
            end_waypoint: 0,
            end_distance_m: 50.0,
        });
        let route = b.build().unwrap();

        // Too early
        assert!(!active_landmarks(&route, 0, 180.0).speed_camera);
        // Inside the window
        assert!(active_landmarks(&route, 0, 100.0).speed_camera);
        // Past the end boundary
        assert!(!active_landmarks(&route, 0, 40.0).speed_camera);
        // Past the waypoint entirely
        assert!(!active_landmarks(&route, 1, 180.0).speed_camera);
    }

    #[test]
    fn test_landmark_spanning_waypoints() {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(origin());
        b.add_point(grid, 0, 0, 50, None);
        b.add_point(grid, 200, 0, 50, None);
        b.add_point(grid, 400, 0, 50, None);
        b.add_waypoint(1, TurnKind::Left, 200.0, 14.4);
        b.add_waypoint(2, TurnKind::Finally, 0.0, 0.0);
        // Detour stretch from 100 m before the turn to 100 m before the end.
        b.add_landmark(Landmark {
            kind: LandmarkKind::Detour,
            start_waypoint: 0,
            start_distance_m: 100.0,
            end_waypoint: 1,
            end_distance_m: 100.0,
        });
        let route = b.build().unwrap();

        assert!(!active_landmarks(&route, 0, 150.0).detour);
        assert!(active_landmarks(&route, 0, 80.0).detour);
        // Past the turn, still more than 100 m from the end boundary
        assert!(active_landmarks(&route, 1, 150.0).detour);
        assert!(!active_landmarks(&route, 1, 80.0).detour);
    }
}
