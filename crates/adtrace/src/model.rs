//! Snapshot data handed to the engine: segments, their markers, and the
//! capture-time snapshot wrapping one manifest window.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

pub type Timestamp = DateTime<Utc>;

/// Fractional seconds as a microsecond-precision delta.
///
/// `None` for negative, non-finite or out-of-range input.
pub fn seconds(secs: f64) -> Option<TimeDelta> {
    let micros = (secs * 1_000_000.0).round();
    if !micros.is_finite() || micros < 0.0 || micros >= i64::MAX as f64 {
        return None;
    }
    Some(TimeDelta::microseconds(micros as i64))
}

/// `at + secs`, or `None` when the duration is unusable or the sum overflows.
pub fn offset_by(at: Timestamp, secs: f64) -> Option<Timestamp> {
    at.checked_add_signed(seconds(secs)?)
}

/// Delta as fractional seconds.
pub fn as_secs_f64(delta: TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// `EXT-X-DATERANGE` attributes relevant to correlation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRangeInfo {
    pub id: String,
    pub class: Option<String>,
    pub start_date: Timestamp,
    pub end_date: Option<Timestamp>,
    pub planned_duration: Option<f64>,
}

impl DateRangeInfo {
    pub fn new(id: impl Into<String>, start_date: Timestamp) -> Self {
        Self {
            id: id.into(),
            class: None,
            start_date,
            end_date: None,
            planned_duration: None,
        }
    }
}

/// A raw marker payload, optionally carried by a date range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub payload: String,
    pub date_range: Option<DateRangeInfo>,
}

impl Marker {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            date_range: None,
        }
    }

    pub fn in_date_range(payload: impl Into<String>, date_range: DateRangeInfo) -> Self {
        Self {
            payload: payload.into(),
            date_range: Some(date_range),
        }
    }
}

/// Live cue flag on a segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CueTag {
    Out { duration: Option<f64> },
    In,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub uri: String,
    pub program_date_time: Option<Timestamp>,
    pub duration: f64,
    pub media_sequence: u64,
    pub discontinuity: bool,
    pub cue: Option<CueTag>,
    pub markers: Vec<Marker>,
}

impl Segment {
    pub fn new(uri: impl Into<String>, media_sequence: u64) -> Self {
        Self {
            uri: uri.into(),
            program_date_time: None,
            duration: 0.0,
            media_sequence,
            discontinuity: false,
            cue: None,
            markers: Vec::new(),
        }
    }

    pub fn at(mut self, pdt: Timestamp) -> Self {
        self.program_date_time = Some(pdt);
        self
    }

    pub fn lasting(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_discontinuity(mut self) -> Self {
        self.discontinuity = true;
        self
    }

    pub fn with_cue(mut self, cue: CueTag) -> Self {
        self.cue = Some(cue);
        self
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn is_cue_out(&self) -> bool {
        matches!(self.cue, Some(CueTag::Out { .. }))
    }

    pub fn is_cue_in(&self) -> bool {
        matches!(self.cue, Some(CueTag::In))
    }

    pub fn first_payload(&self) -> Option<&str> {
        self.markers.first().map(|m| m.payload.as_str())
    }

    /// `program_date_time + duration`
    pub fn end_time(&self) -> Option<Timestamp> {
        offset_by(self.program_date_time?, self.duration)
    }
}

/// One poll of a live manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub captured_at: Timestamp,
    pub segments: Vec<Segment>,
}

impl Snapshot {
    pub fn new(captured_at: Timestamp, segments: Vec<Segment>) -> Self {
        Self {
            captured_at,
            segments,
        }
    }

    pub fn segment_by_sequence(&self, media_sequence: u64) -> Option<&Segment> {
        self.segments
            .iter()
            .find(|s| s.media_sequence == media_sequence)
    }

    /// Segments whose media sequence lies in `first..=last`.
    pub fn segments_in(&self, first: u64, last: u64) -> impl Iterator<Item = &Segment> {
        self.segments
            .iter()
            .filter(move |s| s.media_sequence >= first && s.media_sequence <= last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[test]
    fn seconds_round_trip_through_delta() {
        assert_eq!(seconds(0.05), Some(TimeDelta::milliseconds(50)));
        assert_eq!(seconds(6.006).map(as_secs_f64), Some(6.006));
        assert_eq!(as_secs_f64(TimeDelta::milliseconds(-200)), -0.2);
    }

    #[rstest]
    #[case::negative(-1.0)]
    #[case::nan(f64::NAN)]
    #[case::infinite(f64::INFINITY)]
    #[case::beyond_i64_micros(1e13)]
    fn unusable_durations_have_no_delta(#[case] secs: f64) {
        assert_eq!(seconds(secs), None);
    }

    #[test]
    fn end_time_overflow_is_none() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        // fits a delta, but not the calendar
        let seg = Segment::new("a.ts", 1).at(t0).lasting(9e12);
        assert!(seconds(9e12).is_some());
        assert_eq!(seg.end_time(), None);
        assert_eq!(offset_by(t0, 9e12), None);
    }

    #[test]
    fn segment_end_time_adds_duration() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let seg = Segment::new("a.ts", 1).at(t0).lasting(2.5);
        assert_eq!(seg.end_time(), Some(t0 + TimeDelta::milliseconds(2500)));
        assert_eq!(Segment::new("b.ts", 2).end_time(), None);
    }

    #[test]
    fn segments_in_is_inclusive() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let snapshot = Snapshot::new(
            t0,
            (10..15).map(|n| Segment::new(format!("{n}.ts"), n)).collect(),
        );
        let seqs: Vec<u64> = snapshot.segments_in(11, 13).map(|s| s.media_sequence).collect();
        assert_eq!(seqs, vec![11, 12, 13]);
        assert!(snapshot.segment_by_sequence(20).is_none());
    }
}
