use chrono::TimeDelta;
use serde::Serialize;

use crate::model::{Timestamp, as_secs_f64};
use crate::pairing::Ad;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Within,
    Outside,
}

/// `|delta| < tolerance` is within; the boundary itself is outside.
pub fn classify(delta: TimeDelta, tolerance: TimeDelta) -> Classification {
    if delta.abs() < tolerance {
        Classification::Within
    } else {
        Classification::Outside
    }
}

/// Signaled against observed time for one boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundaryDelta {
    pub signaled: Timestamp,
    pub actual: Timestamp,
    /// `signaled - actual` in seconds
    pub delta: f64,
    pub classification: Classification,
}

impl BoundaryDelta {
    pub fn new(signaled: Timestamp, actual: Timestamp, tolerance: TimeDelta) -> Self {
        let delta = signaled - actual;
        Self {
            signaled,
            actual,
            delta: as_secs_f64(delta),
            classification: classify(delta, tolerance),
        }
    }

    pub fn is_within(&self) -> bool {
        self.classification == Classification::Within
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Conformance {
    Measured {
        start: BoundaryDelta,
        end: BoundaryDelta,
    },
    /// No segments (or no end marker) to measure against
    Incomplete,
}

impl Conformance {
    pub fn is_within(&self) -> bool {
        match self {
            Conformance::Measured { start, end } => start.is_within() && end.is_within(),
            Conformance::Incomplete => false,
        }
    }
}

/// Compare an ad's signaled boundaries with its first and last segments.
pub fn measure(ad: &Ad, tolerance: TimeDelta) -> Conformance {
    let (Some(marker_end), Some(actual_start), Some(actual_end)) =
        (ad.marker_end, ad.actual_start(), ad.actual_end())
    else {
        return Conformance::Incomplete;
    };
    Conformance::Measured {
        start: BoundaryDelta::new(ad.marker_start, actual_start, tolerance),
        end: BoundaryDelta::new(marker_end, actual_end, tolerance),
    }
}
