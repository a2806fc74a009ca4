//! Closest-segment search.
//!
//! Given a geographic fix and a starting cursor, walks the route forward
//! evaluating point-to-segment distance for each segment. Nearby segments
//! get a heading-mismatch penalty added to their distance so that nearly
//! equidistant candidates (parallel roads, the opposite carriageway) break
//! ties toward the one matching the direction of travel.
//!
//! The walk stops once the accumulated segment length exceeds the search
//! budget, but always evaluates at least two segments so a just-passed long
//! segment cannot pin the cursor in place. Segments whose mini-map grid
//! does not contain the fix are hopped over (the "mini-map scan") until a
//! grid contains it or the route is exhausted.

use crate::error::Result;
use crate::geo_utils::course_difference;
use crate::geometry::{point_to_segment, Projection, RouteCursor, Segment};
use crate::route::Route;
use crate::{Fix, FollowerConfig};

/// Outcome classification of a closest-segment search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A segment within the acceptance distance was found.
    Found,
    /// The walk completed but no segment was close enough.
    NotFound,
    /// No searched mini-map grid contains the fix at all.
    OutOfRange,
}

/// The winning candidate of a successful search.
#[derive(Debug, Clone, Copy)]
pub struct ClosestSegment {
    /// Cursor positioned on the winning segment's start point.
    pub cursor: RouteCursor,
    /// The winning segment, resolved into a single grid frame.
    pub segment: Segment,
    /// Projection of the fix onto the segment (same frame).
    pub projection: Projection,
    /// Plain geometric distance from the fix to the segment, meters.
    pub distance_m: f64,
    /// Distance plus angle penalty; the quantity that was minimized.
    pub score_m: f64,
    /// Fix coordinates in the winning segment's grid frame.
    pub fix_local: (i32, i32),
}

impl ClosestSegment {
    /// Distance from the projection point to the segment's far end.
    pub fn remaining_on_segment_m(&self) -> f64 {
        self.projection.remaining_m
    }
}

/// Result of a closest-segment search.
#[derive(Debug, Clone, Copy)]
pub enum SearchResult {
    Found(ClosestSegment),
    NotFound,
    OutOfRange,
}

impl SearchResult {
    pub fn outcome(&self) -> SearchOutcome {
        match self {
            SearchResult::Found(_) => SearchOutcome::Found,
            SearchResult::NotFound => SearchOutcome::NotFound,
            SearchResult::OutOfRange => SearchOutcome::OutOfRange,
        }
    }

    pub fn closest(&self) -> Option<&ClosestSegment> {
        match self {
            SearchResult::Found(c) => Some(c),
            _ => None,
        }
    }
}

/// Find the route segment closest to `fix`, walking forward from `from`.
///
/// `max_search_m` bounds the accumulated segment length of the walk; pass
/// `f64::INFINITY` for a full-route search. Tie-break rule: strictly lower
/// (distance + angle penalty) wins, so on equal scores the earlier (more
/// forward) segment is kept.
pub fn find_closest_segment(
    route: &Route,
    from: RouteCursor,
    fix: &Fix,
    max_search_m: f64,
    config: &FollowerConfig,
) -> Result<SearchResult> {
    let mut cursor = from;
    let mut best: Option<ClosestSegment> = None;
    let mut searched_m = 0.0;
    let mut evaluated = 0usize;
    let mut any_grid_contains_fix = false;

    while cursor.is_valid(route) {
        let segment = cursor.segment(route)?;
        let grid = route.minimap(segment.grid)?;

        let (px, py) = match grid.to_local_checked(&fix.position) {
            Some(local) => local,
            None => {
                // Mini-map scan: this grid cannot express the fix, hop to
                // the next segment until a grid contains it or the route
                // runs out. The scan is not bounded by the search budget.
                cursor = cursor.advance(route, true)?;
                continue;
            }
        };
        any_grid_contains_fix = true;

        let projection = point_to_segment(
            segment.ax, segment.ay, segment.bx, segment.by, px, py,
        );

        let mut score = projection.distance_m;
        if projection.distance_m < config.angle_penalty_radius_m {
            if let Some(course) = segment.course() {
                let mismatch = course_difference(fix.course_rad, course);
                score += mismatch / std::f64::consts::PI * config.max_angle_penalty_m;
            }
        }

        let better = match &best {
            Some(b) => score < b.score_m,
            None => true,
        };
        if better {
            best = Some(ClosestSegment {
                cursor,
                segment,
                projection,
                distance_m: projection.distance_m,
                score_m: score,
                fix_local: (px, py),
            });
        }

        evaluated += 1;
        searched_m += segment.length_m();
        // Always look at two segments minimum, otherwise a long segment we
        // just left keeps winning forever.
        if evaluated >= 2 && searched_m > max_search_m {
            break;
        }
        cursor = cursor.advance(route, true)?;
    }

    match best {
        Some(b) if b.distance_m <= config.search_accept_distance_m => {
            log::debug!(
                "closest segment {} at {:.1} m (score {:.1})",
                b.cursor.index(),
                b.distance_m,
                b.score_m
            );
            Ok(SearchResult::Found(b))
        }
        Some(_) => Ok(SearchResult::NotFound),
        None if !any_grid_contains_fix => Ok(SearchResult::OutOfRange),
        None => Ok(SearchResult::NotFound),
    }
}
