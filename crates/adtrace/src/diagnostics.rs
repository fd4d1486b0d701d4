use std::fmt;

use serde::Serialize;

/// Recovered data errors and structural inconsistencies seen during a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanDiagnostics {
    /// Segments admitted by the cursor
    pub processed_segments: u64,
    /// Segments already seen in an earlier window
    pub skipped_segments: u64,
    /// Segments dropped for lacking a program date time
    pub missing_timestamps: u64,
    /// Marker payloads that failed to decode
    pub decode_failures: u64,
    /// Opening events at an already recorded start
    pub duplicate_opens: u64,
    /// Opening events folded into the span already open
    pub folded_opens: u64,
    /// Closing events with no open span
    pub orphan_closes: u64,
    /// Closing events that would end a span before it started
    pub rejected_closes: u64,
}

impl ScanDiagnostics {
    /// Number of anomalies, excluding the plain segment counters.
    pub fn anomalies(&self) -> u64 {
        self.missing_timestamps
            + self.decode_failures
            + self.duplicate_opens
            + self.folded_opens
            + self.orphan_closes
            + self.rejected_closes
    }
}

impl fmt::Display for ScanDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} skipped={} missing_pdt={} decode_failures={} duplicate_opens={} folded_opens={} orphan_closes={} rejected_closes={}",
            self.processed_segments,
            self.skipped_segments,
            self.missing_timestamps,
            self.decode_failures,
            self.duplicate_opens,
            self.folded_opens,
            self.orphan_closes,
            self.rejected_closes
        )
    }
}
