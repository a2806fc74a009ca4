//! Off-track detection.
//!
//! A penalty-accumulation heuristic decides, from consecutive
//! distance/angle samples, whether the tracked entity has departed the
//! route. Single bad samples never flip the status: penalties accumulate
//! across samples and only a sustained departure crosses the confirmation
//! threshold. Any clean sample resets the accumulator.
//!
//! The detector also maintains the course/position snap eligibility gates
//! used by the snapper. Those are independent of the penalty accumulator
//! and never themselves trigger off-track.

use serde::{Deserialize, Serialize};

use crate::geo_utils::course_difference;
use crate::FollowerConfig;

/// Track status, driving which search strategy the follower uses next
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    OnTrack,
    /// On the route geometry but heading against it.
    OnTrackWrongWay,
    /// Accumulated penalty crossed half the confirmation threshold: rescan
    /// the whole route next cycle, but don't tell the user yet.
    OffTrackFew,
    /// Confirmed off-track.
    OffTrack,
}

impl TrackStatus {
    pub fn is_off_track(&self) -> bool {
        matches!(self, TrackStatus::OffTrack)
    }

    /// Whether the next closest-segment search should scan the full route.
    pub fn needs_full_search(&self) -> bool {
        matches!(self, TrackStatus::OffTrack | TrackStatus::OffTrackFew)
    }
}

/// One cycle's worth of detector input, produced by the search/resolver.
#[derive(Debug, Clone, Copy)]
pub struct OffTrackSample {
    /// Distance from the fix to the closest segment, meters.
    pub perp_distance_m: f64,
    /// Total remaining distance along the route, meters.
    pub total_distance_left_m: f64,
    /// Fix course, radians clockwise from north.
    pub heading_rad: f64,
    /// Course of the upcoming segment; `None` for a degenerate segment.
    pub segment_course_rad: Option<f64>,
    /// Fix speed, m/s.
    pub speed_mps: f64,
}

/// Stateful off-track detector. Owned and mutated by the follower's worker
/// thread only.
#[derive(Debug)]
pub struct OffTrackDetector {
    penalty: f64,
    last_perp_m: Option<f64>,
    last_total_left_m: f64,
    consecutive_off: u32,
    status: TrackStatus,
    course_snap: bool,
    position_snap: bool,
}

impl Default for OffTrackDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl OffTrackDetector {
    pub fn new() -> Self {
        Self {
            penalty: 0.0,
            last_perp_m: None,
            last_total_left_m: 0.0,
            consecutive_off: 0,
            status: TrackStatus::OnTrack,
            course_snap: false,
            position_snap: false,
        }
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    pub fn consecutive_off_samples(&self) -> u32 {
        self.consecutive_off
    }

    /// Whether the displayed course may be snapped to the route.
    pub fn course_snap_enabled(&self) -> bool {
        self.course_snap
    }

    /// Whether the displayed position may be snapped to the route.
    pub fn position_snap_enabled(&self) -> bool {
        self.position_snap
    }

    /// Feed a cycle where the closest-segment search failed entirely.
    ///
    /// The fix is demonstrably far from the route, so this counts as a
    /// maximum-penalty sample; confirmation still goes through the normal
    /// accumulator so a single search hiccup cannot flip the status.
    pub fn note_search_failure(&mut self, config: &FollowerConfig) -> bool {
        self.penalty += config.per_sample_penalty_cap;
        self.update_status(false, config);
        self.status.is_off_track()
    }

    /// Evaluate one sample. Returns true when off-track is confirmed.
    pub fn detect(&mut self, sample: &OffTrackSample, config: &FollowerConfig) -> bool {
        let perp = sample.perp_distance_m;

        let last_perp = match self.last_perp_m {
            Some(d) => d,
            None => {
                // First sample only establishes the baselines.
                self.last_perp_m = Some(perp);
                self.last_total_left_m = sample.total_distance_left_m;
                self.update_snap_gates(sample, config);
                return self.status.is_off_track();
            }
        };

        let perp_delta = perp - last_perp;
        if perp_delta > config.max_perp_jump_m {
            // Sensor glitch: reject the sample, keep accumulator and
            // baselines so the next sample is judged against solid state.
            log::warn!(
                "rejecting {:.0} m perpendicular jump as sensor glitch",
                perp_delta
            );
            return self.status.is_off_track();
        }

        let along_delta = (self.last_total_left_m - sample.total_distance_left_m).max(0.0);
        // Normalized moving-away rate: meters drifted per meter advanced.
        let rate = 1000.0 * perp_delta / (along_delta + 1.0);

        let wrong_way = match sample.segment_course_rad {
            Some(course) => {
                course_difference(sample.heading_rad, course) > config.wrong_way_angle_rad
                    && sample.speed_mps > config.min_moving_speed_mps
            }
            None => false,
        };

        let mut penalized = false;
        if wrong_way {
            self.penalty += config.per_sample_penalty_cap;
            penalized = true;
        } else if perp_delta >= config.min_perp_change_m || perp > config.close_distance_m {
            let mut sample_penalty = (rate / 1000.0).max(0.0);
            if perp > config.close_distance_m {
                // Heavier punishment the further away: superlinear in the
                // distance beyond the "close" envelope.
                let extra = perp - config.close_distance_m;
                sample_penalty += extra * extra / 2.0;
            }
            self.penalty += sample_penalty.min(config.per_sample_penalty_cap);
            penalized = true;
        }

        if !penalized {
            // Clean sample: back inside the minimum-change/minimum-distance
            // envelope, the accumulator starts over.
            self.penalty = 0.0;
            self.consecutive_off = 0;
            self.status = TrackStatus::OnTrack;
        } else {
            self.update_status(wrong_way, config);
        }

        self.last_perp_m = Some(perp);
        self.last_total_left_m = sample.total_distance_left_m;
        self.update_snap_gates(sample, config);

        self.status.is_off_track()
    }

    fn update_status(&mut self, wrong_way: bool, config: &FollowerConfig) {
        if self.penalty >= config.max_penalty {
            if !self.status.is_off_track() {
                log::info!("off-track confirmed (penalty {:.0})", self.penalty);
            }
            self.status = TrackStatus::OffTrack;
            self.consecutive_off += 1;
        } else if self.penalty >= config.max_penalty / 2.0 {
            self.status = TrackStatus::OffTrackFew;
        } else if wrong_way {
            self.status = TrackStatus::OnTrackWrongWay;
        } else {
            self.status = TrackStatus::OnTrack;
        }
    }

    fn update_snap_gates(&mut self, sample: &OffTrackSample, config: &FollowerConfig) {
        let angle_error = match sample.segment_course_rad {
            Some(course) => course_difference(sample.heading_rad, course),
            None => {
                // No course to compare against; keep the gates as they are.
                self.position_snap =
                    self.course_snap && sample.perp_distance_m < config.snap_position_max_distance_m;
                return;
            }
        };

        if !self.course_snap {
            if angle_error < config.snap_start_angle_rad
                && sample.speed_mps > config.snap_min_speed_mps
                && sample.perp_distance_m < config.snap_max_distance_m
            {
                self.course_snap = true;
            }
        } else if angle_error > config.snap_break_angle_rad
            && sample.speed_mps > config.snap_min_speed_mps
        {
            self.course_snap = false;
        }

        self.position_snap =
            self.course_snap && sample.perp_distance_m < config.snap_position_max_distance_m;
    }
}
