//! Unified error handling for the route-follower library.
//!
//! This module provides a consistent error type for all follower operations.
//! Off-track is deliberately *not* an error: it is a first-class status
//! reported through [`NavigationStatus`](crate::NavigationStatus). Errors here
//! cover route-data faults (fatal to the current follower), worker failures,
//! and misuse of the follower lifecycle.

use std::fmt;

/// Unified error type for route-follower operations.
#[derive(Debug, Clone)]
pub enum FollowError {
    /// Route data is malformed or truncated (bad grid reference, missing
    /// final waypoint, point index out of range). Fatal to the current
    /// follower; a new route must be fetched.
    RouteData { message: String },
    /// A route point references a mini-map grid that does not exist.
    InvalidGrid { point_index: usize, grid: u16 },
    /// The route has too few points to follow.
    InsufficientPoints {
        point_count: usize,
        minimum_required: usize,
    },
    /// A fix or coordinate is out of the representable local range.
    CoordinateRange { message: String },
    /// The follower was used after it stopped, or started twice.
    Lifecycle { message: String },
    /// The worker thread failed unexpectedly.
    Worker { message: String },
    /// Generic internal error
    Internal { message: String },
}

impl fmt::Display for FollowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FollowError::RouteData { message } => {
                write!(f, "Route data error: {}", message)
            }
            FollowError::InvalidGrid { point_index, grid } => {
                write!(
                    f,
                    "Route point {} references unknown mini-map grid {}",
                    point_index, grid
                )
            }
            FollowError::InsufficientPoints {
                point_count,
                minimum_required,
            } => {
                write!(
                    f,
                    "Route has {} points, minimum {} required",
                    point_count, minimum_required
                )
            }
            FollowError::CoordinateRange { message } => {
                write!(f, "Coordinate out of range: {}", message)
            }
            FollowError::Lifecycle { message } => {
                write!(f, "Follower lifecycle error: {}", message)
            }
            FollowError::Worker { message } => {
                write!(f, "Worker error: {}", message)
            }
            FollowError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for FollowError {}

impl FollowError {
    /// Shorthand for a route-data fault.
    pub fn route_data(message: impl Into<String>) -> Self {
        FollowError::RouteData {
            message: message.into(),
        }
    }

    /// Shorthand for an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        FollowError::Internal {
            message: message.into(),
        }
    }
}

/// Result type alias for route-follower operations.
pub type Result<T> = std::result::Result<T, FollowError>;

/// Extension trait for converting Option to FollowError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a route-data error.
    fn ok_or_route_data(self, message: &str) -> Result<T>;

    /// Convert Option to Result with a generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_route_data(self, message: &str) -> Result<T> {
        self.ok_or_else(|| FollowError::RouteData {
            message: message.to_string(),
        })
    }

    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| FollowError::Internal {
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FollowError::InsufficientPoints {
            point_count: 1,
            minimum_required: 2,
        };
        assert!(err.to_string().contains("1 points"));
        assert!(err.to_string().contains("minimum 2"));

        let err = FollowError::InvalidGrid {
            point_index: 7,
            grid: 3,
        };
        assert!(err.to_string().contains("point 7"));
        assert!(err.to_string().contains("grid 3"));
    }

    #[test]
    fn test_option_ext() {
        let none: Option<i32> = None;
        let result = none.ok_or_route_data("truncated point array");
        assert!(matches!(result, Err(FollowError::RouteData { .. })));

        let some = Some(5).ok_or_internal("unreachable");
        assert_eq!(some.unwrap(), 5);
    }
}
