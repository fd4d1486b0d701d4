use std::collections::BTreeSet;

use serde::Serialize;

use crate::model::{Segment, Timestamp};
use crate::{AdTraceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Process,
    Skip,
}

/// Monotonic per-stream gate over overlapping manifest windows.
///
/// A segment is processed once: anything older than the watermark is
/// skipped, and so is any segment already admitted at the watermark when a
/// later window delivers it again. Several segments may share a timestamp
/// (zero-length `EXTINF`, repeated `EXT-X-PROGRAM-DATE-TIME`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotCursor {
    watermark: Option<Timestamp>,
    at_watermark: BTreeSet<String>,
}

impl SnapshotCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watermark(&self) -> Option<Timestamp> {
        self.watermark
    }

    pub fn admit(&mut self, segment: &Segment) -> Result<Admission> {
        let pdt = segment
            .program_date_time
            .ok_or_else(|| AdTraceError::missing_pdt(&segment.uri))?;

        if let Some(watermark) = self.watermark {
            if pdt < watermark {
                return Ok(Admission::Skip);
            }
            if pdt == watermark {
                return Ok(if self.at_watermark.insert(segment.uri.clone()) {
                    Admission::Process
                } else {
                    Admission::Skip
                });
            }
        }

        self.watermark = Some(pdt);
        self.at_watermark.clear();
        self.at_watermark.insert(segment.uri.clone());
        Ok(Admission::Process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn seg(uri: &str, offset_secs: i64) -> Segment {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Segment::new(uri, 0).at(t0 + TimeDelta::seconds(offset_secs))
    }

    #[test]
    fn overlapping_windows_are_admitted_once() {
        let mut cursor = SnapshotCursor::new();
        let first = [seg("a", 0), seg("b", 2), seg("c", 4)];
        let second = [seg("b", 2), seg("c", 4), seg("d", 6)];

        let admitted: Vec<_> = first
            .iter()
            .chain(second.iter())
            .filter(|s| cursor.admit(s).unwrap() == Admission::Process)
            .map(|s| s.uri.as_str())
            .collect();
        assert_eq!(admitted, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn equal_timestamp_with_new_uri_is_processed() {
        let mut cursor = SnapshotCursor::new();
        assert_eq!(cursor.admit(&seg("a", 0)).unwrap(), Admission::Process);
        assert_eq!(cursor.admit(&seg("a-alt", 0)).unwrap(), Admission::Process);
        assert_eq!(cursor.admit(&seg("a-alt", 0)).unwrap(), Admission::Skip);
    }

    #[test]
    fn every_uri_sharing_the_watermark_is_remembered() {
        let mut cursor = SnapshotCursor::new();
        let window = [seg("main.ts", 0), seg("ad-a.ts", 2), seg("ad-b.ts", 2)];

        let first: Vec<_> = window.iter().map(|s| cursor.admit(s).unwrap()).collect();
        assert_eq!(first, vec![Admission::Process; 3]);

        let replay: Vec<_> = window.iter().map(|s| cursor.admit(s).unwrap()).collect();
        assert_eq!(replay, vec![Admission::Skip; 3]);

        // advancing the watermark forgets the previous timestamp's uris
        assert_eq!(cursor.admit(&seg("next.ts", 4)).unwrap(), Admission::Process);
        assert_eq!(cursor.admit(&seg("ad-a.ts", 2)).unwrap(), Admission::Skip);
        assert_eq!(cursor.admit(&seg("ad-a.ts", 4)).unwrap(), Admission::Process);
    }

    #[test]
    fn missing_timestamp_is_a_data_error() {
        let mut cursor = SnapshotCursor::new();
        let err = cursor.admit(&Segment::new("x.ts", 1)).unwrap_err();
        assert!(matches!(err, AdTraceError::MissingProgramDateTime { .. }));
        assert!(err.is_data_error());
        assert_eq!(cursor.watermark(), None);
    }
}
