//! Position snapping and short-horizon prediction.
//!
//! The snapper projects the fix onto the closest segment and reports the
//! road point with the upcoming segment's course, so the map can draw the
//! marker cleanly on the street. The predictor ("faked position") walks a
//! speed-dependent look-ahead distance down the route to compensate for
//! rendering/network latency; it passes the raw fix through unchanged
//! whenever snapping to the route would be a lie (pedestrian mode,
//! off-track, failed search).

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::RouteCursor;
use crate::route::Route;
use crate::search::ClosestSegment;
use crate::{Fix, FollowerConfig, GeoPoint};

/// A displayable position/course pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: GeoPoint,
    /// Radians clockwise from north.
    pub course_rad: f64,
}

impl Pose {
    pub fn new(position: GeoPoint, course_rad: f64) -> Self {
        Self {
            position,
            course_rad,
        }
    }

    /// The raw, unsnapped pose of a fix.
    pub fn from_fix(fix: &Fix) -> Self {
        Self {
            position: fix.position,
            course_rad: fix.course_rad,
        }
    }
}

/// Step (x, y) by `distance_m` along a compass course.
fn extrapolate(x: f64, y: f64, course_rad: f64, distance_m: f64) -> (f64, f64) {
    (
        x + distance_m * course_rad.sin(),
        y + distance_m * course_rad.cos(),
    )
}

/// Course of the first non-degenerate segment at or after `cursor`.
fn upcoming_course(route: &Route, cursor: RouteCursor) -> Result<Option<f64>> {
    let mut c = cursor;
    while c.is_valid(route) {
        if let Some(course) = c.segment(route)?.course() {
            return Ok(Some(course));
        }
        c = c.advance(route, true)?;
    }
    Ok(None)
}

/// Snap the fix onto the road geometry.
///
/// Returns the projection of the fix onto the closest segment, converted
/// back to a geographic position through the segment's mini-map, with the
/// upcoming segment's course. Only meaningful when on-track and not in
/// pedestrian mode; the follower gates calls accordingly.
pub fn snap_position(route: &Route, closest: &ClosestSegment, fix: &Fix) -> Result<Pose> {
    let grid = route.minimap(closest.segment.grid)?;
    let position = grid.to_geo(closest.projection.px, closest.projection.py);
    let course = upcoming_course(route, closest.cursor)?.unwrap_or(fix.course_rad);
    Ok(Pose::new(position, course))
}

/// Snap only the displayed course onto the road, keeping the raw position.
///
/// Used in the band where course snapping is engaged but the fix is too far
/// from the geometry for position snapping.
pub fn snap_course(route: &Route, closest: &ClosestSegment, fix: &Fix) -> Result<Pose> {
    let course = upcoming_course(route, closest.cursor)?.unwrap_or(fix.course_rad);
    Ok(Pose::new(fix.position, course))
}

/// Compute the predicted ("faked") pose one look-ahead horizon ahead.
///
/// Disabled (raw pass-through) in pedestrian mode, when off-track, or when
/// the closest-segment search failed this cycle. Otherwise the current
/// speed — clamped to the speed limit plus a spike margin — times the
/// horizon is walked forward across as many segments as needed; if the
/// route runs out first the prediction freezes at the route end.
pub fn predict_position(
    route: &Route,
    closest: Option<&ClosestSegment>,
    fix: &Fix,
    off_track: bool,
    pedestrian: bool,
    config: &FollowerConfig,
) -> Result<Pose> {
    let closest = match closest {
        Some(c) if !off_track && !pedestrian => c,
        _ => return Ok(Pose::from_fix(fix)),
    };

    let limit_mps = closest.segment.speed_limit_kmh as f64 / 3.6;
    let speed = fix
        .speed_mps
        .min(limit_mps + config.speed_clamp_margin_mps());
    let mut remaining = speed * config.prediction_horizon_s;

    // First hop: from the projection point to the closest segment's end.
    if remaining <= closest.projection.remaining_m {
        let course = closest
            .segment
            .course()
            .unwrap_or(fix.course_rad);
        let (x, y) = extrapolate(closest.projection.px, closest.projection.py, course, remaining);
        let grid = route.minimap(closest.segment.grid)?;
        return Ok(Pose::new(grid.to_geo(x, y), course));
    }
    remaining -= closest.projection.remaining_m;

    let mut cursor = closest.cursor.advance(route, true)?;
    let mut last_course = closest.segment.course().unwrap_or(fix.course_rad);
    loop {
        if !cursor.is_valid(route) {
            // Route exhausted: freeze at the final point.
            let p = route.point(cursor.index() as usize)?;
            let grid = route.minimap(p.minimap)?;
            return Ok(Pose::new(grid.to_geo(p.x as f64, p.y as f64), last_course));
        }
        let segment = cursor.segment(route)?;
        let length = segment.length_m();
        if let Some(course) = segment.course() {
            last_course = course;
        }
        if remaining <= length {
            // Extrapolate the residual from this segment's start point.
            let (x, y) = extrapolate(segment.ax as f64, segment.ay as f64, last_course, remaining);
            let grid = route.minimap(segment.grid)?;
            return Ok(Pose::new(grid.to_geo(x, y), last_course));
        }
        remaining -= length;
        cursor = cursor.advance(route, true)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::{haversine_distance, offset_to_geo};
    use crate::route::TurnKind;
    use crate::search::find_closest_segment;

    const EAST: f64 = std::f64::consts::FRAC_PI_2;

    fn origin() -> GeoPoint {
        GeoPoint::new(47.0, 8.0)
    }

    /// Eastbound route: three 100 m segments.
    fn straight_route() -> Route {
        let mut b = Route::builder("r");
        let grid = b.add_minimap(origin());
        for i in 0..4 {
            b.add_point(grid, i * 100, 0, 50, None);
        }
        b.add_waypoint(3, TurnKind::Finally, 0.0, 0.0);
        b.build().unwrap()
    }

    fn closest_for(route: &Route, fix: &Fix) -> ClosestSegment {
        let config = FollowerConfig::default();
        *find_closest_segment(route, RouteCursor::start(), fix, f64::INFINITY, &config)
            .unwrap()
            .closest()
            .expect("fix should be on the route")
    }

    fn fix_at(east_m: f64, north_m: f64, speed: f64) -> Fix {
        Fix::new(offset_to_geo(&origin(), east_m, north_m), speed, EAST)
    }

    #[test]
    fn test_snap_projects_onto_road() {
        let route = straight_route();
        let fix = fix_at(50.0, 12.0, 10.0);
        let closest = closest_for(&route, &fix);

        let pose = snap_position(&route, &closest, &fix).unwrap();
        let on_road = offset_to_geo(&origin(), 50.0, 0.0);
        assert!(haversine_distance(&pose.position, &on_road) < 2.0);
        assert!((pose.course_rad - EAST).abs() < 1e-6);
    }

    #[test]
    fn test_course_snap_keeps_raw_position() {
        let route = straight_route();
        // 25 m off the road, angling slightly north of east.
        let fix = Fix::new(offset_to_geo(&origin(), 50.0, 25.0), 10.0, EAST + 0.2);
        let closest = closest_for(&route, &fix);

        let pose = snap_course(&route, &closest, &fix).unwrap();
        assert_eq!(pose.position, fix.position);
        assert!((pose.course_rad - EAST).abs() < 1e-6);
    }

    #[test]
    fn test_predictor_walks_one_second_ahead() {
        let route = straight_route();
        let fix = fix_at(50.0, 0.0, 10.0);
        let closest = closest_for(&route, &fix);
        let config = FollowerConfig::default();

        let pose =
            predict_position(&route, Some(&closest), &fix, false, false, &config).unwrap();
        let expected = offset_to_geo(&origin(), 60.0, 0.0);
        assert!(haversine_distance(&pose.position, &expected) < 2.0);
    }

    #[test]
    fn test_predictor_crosses_segments() {
        let route = straight_route();
        // 95 m along, 10 m/s: prediction lands 5 m into the second segment.
        let fix = fix_at(95.0, 0.0, 10.0);
        let closest = closest_for(&route, &fix);
        let config = FollowerConfig::default();

        let pose =
            predict_position(&route, Some(&closest), &fix, false, false, &config).unwrap();
        let expected = offset_to_geo(&origin(), 105.0, 0.0);
        assert!(haversine_distance(&pose.position, &expected) < 2.0);
    }

    #[test]
    fn test_predictor_clamps_speed_spikes() {
        let route = straight_route();
        // 50 km/h limit + 20 km/h margin = 19.44 m/s, despite the 80 m/s fix.
        let fix = fix_at(0.0, 0.0, 80.0);
        let closest = closest_for(&route, &fix);
        let config = FollowerConfig::default();

        let pose =
            predict_position(&route, Some(&closest), &fix, false, false, &config).unwrap();
        let expected = offset_to_geo(&origin(), 19.44, 0.0);
        assert!(haversine_distance(&pose.position, &expected) < 2.0);
    }

    #[test]
    fn test_predictor_freezes_at_route_end() {
        let route = straight_route();
        let fix = fix_at(295.0, 0.0, 15.0);
        let closest = closest_for(&route, &fix);
        let config = FollowerConfig::default();

        let pose =
            predict_position(&route, Some(&closest), &fix, false, false, &config).unwrap();
        let end = offset_to_geo(&origin(), 300.0, 0.0);
        assert!(haversine_distance(&pose.position, &end) < 2.0);
    }

    #[test]
    fn test_predictor_pass_through_when_disabled() {
        let route = straight_route();
        let fix = fix_at(50.0, 0.0, 10.0);
        let closest = closest_for(&route, &fix);
        let config = FollowerConfig::default();
        let raw = Pose::from_fix(&fix);

        // Pedestrian mode
        let pose =
            predict_position(&route, Some(&closest), &fix, false, true, &config).unwrap();
        assert_eq!(pose, raw);

        // Off-track
        let pose =
            predict_position(&route, Some(&closest), &fix, true, false, &config).unwrap();
        assert_eq!(pose, raw);

        // Failed search
        let pose = predict_position(&route, None, &fix, false, false, &config).unwrap();
        assert_eq!(pose, raw);
    }
}
