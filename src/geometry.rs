//! Route geometry iteration and projection math.
//!
//! [`RouteCursor`] is a tiny Copy value indexing into the route's point
//! array. Saving a cursor and restarting a forward scan from it is a plain
//! copy, so the search and resolver can re-walk from a known point without
//! shared mutable cursor objects.
//!
//! Segment geometry is always resolved into a single mini-map frame: when a
//! segment crosses a grid boundary its start point is re-anchored into the
//! grid being entered, so all projection math happens in one local frame.
//!
//! Local coordinates are bounded by [`MAX_LOCAL_COORD`](crate::route::MAX_LOCAL_COORD);
//! every product in the projection math is computed in i64 so the bounded
//! domain can never overflow.

use crate::error::Result;
use crate::route::Route;

/// A segment of the route resolved into a single grid frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Index of the segment's start point.
    pub start_index: u32,
    /// Grid frame both endpoints are expressed in (the end point's grid).
    pub grid: u16,
    pub ax: i32,
    pub ay: i32,
    pub bx: i32,
    pub by: i32,
    /// Speed limit carried by this segment, km/h.
    pub speed_limit_kmh: u8,
}

impl Segment {
    pub fn length_m(&self) -> f64 {
        let dx = self.bx as i64 - self.ax as i64;
        let dy = self.by as i64 - self.ay as i64;
        ((dx * dx + dy * dy) as f64).sqrt()
    }

    /// Compass course of the segment in radians clockwise from north.
    ///
    /// `None` for a degenerate (zero-length) segment: the target equals the
    /// anchor, so the course is undefined and callers fall back to plain
    /// point distance.
    pub fn course(&self) -> Option<f64> {
        let dx = (self.bx as i64 - self.ax as i64) as f64;
        let dy = (self.by as i64 - self.ay as i64) as f64;
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        Some(crate::geo_utils::normalize_course(dx.atan2(dy)))
    }
}

/// Result of projecting a point onto a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Distance from the point to the segment (perpendicular if the
    /// projection falls inside the segment, endpoint distance otherwise).
    pub distance_m: f64,
    /// Distance from the segment start to the projection point.
    pub along_m: f64,
    /// Distance from the projection point to the segment's far end.
    pub remaining_m: f64,
    /// Projection point, local frame.
    pub px: f64,
    pub py: f64,
}

/// Project point (px, py) onto the segment (ax, ay)-(bx, by).
///
/// Classic vector projection with the parameter clamped to the segment.
/// All products are computed in i64; inputs within the local coordinate
/// bound can never overflow.
pub fn point_to_segment(ax: i32, ay: i32, bx: i32, by: i32, px: i32, py: i32) -> Projection {
    let dx = bx as i64 - ax as i64;
    let dy = by as i64 - ay as i64;
    let len2 = dx * dx + dy * dy;

    if len2 == 0 {
        // Degenerate segment: plain point-to-point distance to the anchor.
        let wx = px as i64 - ax as i64;
        let wy = py as i64 - ay as i64;
        return Projection {
            distance_m: ((wx * wx + wy * wy) as f64).sqrt(),
            along_m: 0.0,
            remaining_m: 0.0,
            px: ax as f64,
            py: ay as f64,
        };
    }

    let wx = px as i64 - ax as i64;
    let wy = py as i64 - ay as i64;
    let dot = dx * wx + dy * wy;

    let length = (len2 as f64).sqrt();
    let t = (dot as f64 / len2 as f64).clamp(0.0, 1.0);

    let proj_x = ax as f64 + t * dx as f64;
    let proj_y = ay as f64 + t * dy as f64;
    let ox = px as f64 - proj_x;
    let oy = py as f64 - proj_y;

    Projection {
        distance_m: (ox * ox + oy * oy).sqrt(),
        along_m: t * length,
        remaining_m: (1.0 - t) * length,
        px: proj_x,
        py: proj_y,
    }
}

/// Cursor over the route's point array.
///
/// The cursor sits *on* a point; its outgoing segment runs to the next
/// point. It is a plain Copy value: saving and restoring a scan position is
/// an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteCursor {
    index: u32,
}

impl RouteCursor {
    /// Cursor at the route start.
    pub fn start() -> Self {
        Self { index: 0 }
    }

    pub fn at(index: u32) -> Self {
        Self { index }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// False once the cursor has no outgoing segment (past the route end).
    pub fn is_valid(&self, route: &Route) -> bool {
        (self.index as usize) + 1 < route.point_count()
    }

    /// Move to the next point, crossing mini-map boundaries transparently.
    ///
    /// With `allow_threshold_skip`, distance-threshold marker points are
    /// stepped over. Markers are co-located duplicates of their geometry
    /// point (zero-length segments), so skipping them never skips geometry;
    /// the waypoint resolver passes `false` because it must stop on them.
    pub fn advance(&self, route: &Route, allow_threshold_skip: bool) -> Result<RouteCursor> {
        let mut next = self.index + 1;
        if allow_threshold_skip {
            loop {
                let p = route.point(next as usize)?;
                let is_plain_marker = p.threshold.is_some() && p.waypoint.is_none();
                if is_plain_marker && (next as usize) + 1 < route.point_count() {
                    next += 1;
                } else {
                    break;
                }
            }
        } else {
            route.point(next as usize)?;
        }
        Ok(RouteCursor { index: next })
    }

    /// Resolve the outgoing segment into a single grid frame.
    ///
    /// When the segment crosses into a new mini-map, the start point is
    /// translated into the new grid's frame using the grid-origin offset
    /// (the "previous-point anchor").
    pub fn segment(&self, route: &Route) -> Result<Segment> {
        let a = route.point(self.index as usize)?;
        let b = route.point(self.index as usize + 1)?;

        let (ax, ay) = if a.minimap == b.minimap {
            (a.x, a.y)
        } else {
            let to_grid = route.minimap(b.minimap)?;
            let from_grid = route.minimap(a.minimap)?;
            let (ox, oy) = to_grid.offset_of(from_grid);
            (
                (a.x as f64 + ox).round() as i32,
                (a.y as f64 + oy).round() as i32,
            )
        };

        Ok(Segment {
            start_index: self.index,
            grid: b.minimap,
            ax,
            ay,
            bx: b.x,
            by: b.y,
            speed_limit_kmh: a.speed_limit_kmh,
        })
    }

    /// Convenience accessors mirroring the iterator contract.
    pub fn segment_length_m(&self, route: &Route) -> Result<f64> {
        Ok(self.segment(route)?.length_m())
    }

    pub fn segment_course(&self, route: &Route) -> Result<Option<f64>> {
        Ok(self.segment(route)?.course())
    }

    pub fn speed_limit_kmh(&self, route: &Route) -> Result<u8> {
        Ok(route.point(self.index as usize)?.speed_limit_kmh)
    }

    /// True if the point under the cursor is a turn waypoint.
    pub fn is_waypoint(&self, route: &Route) -> Result<bool> {
        Ok(route.point(self.index as usize)?.waypoint.is_some())
    }

    /// True if the point under the cursor is a distance-threshold marker.
    pub fn is_distance_threshold(&self, route: &Route) -> Result<bool> {
        Ok(route.point(self.index as usize)?.threshold.is_some())
    }
}
