//! Cross-snapshot span assembly.
//!
//! One scan loop feeds cursor-admitted segments to a per-channel
//! [`SegmentRule`] that opens, folds into, or closes spans.

mod live_cue;
mod replacement;

pub use live_cue::LiveCueRule;
pub use replacement::AdReplacementRule;

use tracing::trace;

use crate::model::{Segment, Snapshot};
use crate::span::SpanDatabase;

/// Per-channel transition logic.
pub trait SegmentRule: Send {
    /// Handle one admitted segment. Returns `true` when a new span was opened.
    fn on_segment(
        &mut self,
        db: &mut SpanDatabase,
        segment: &Segment,
        previous: Option<&Segment>,
    ) -> bool;
}

/// Owns one stream's span database and drives a rule over its snapshots.
pub struct SpanAssembler<R> {
    rule: R,
    db: SpanDatabase,
}

pub type LiveCueAssembler = SpanAssembler<LiveCueRule>;
pub type AdReplacementAssembler = SpanAssembler<AdReplacementRule>;

impl<R: SegmentRule> SpanAssembler<R> {
    pub fn new(rule: R) -> Self {
        Self {
            rule,
            db: SpanDatabase::new(),
        }
    }

    /// Scan one snapshot. Returns the number of spans opened.
    pub fn scan_snapshot(&mut self, snapshot: &Snapshot) -> usize {
        let mut opened = 0;
        for (idx, segment) in snapshot.segments.iter().enumerate() {
            if !self.db.admit(segment) {
                continue;
            }
            let previous = idx.checked_sub(1).map(|i| &snapshot.segments[i]);
            if self.rule.on_segment(&mut self.db, segment, previous) {
                opened += 1;
            }
        }
        trace!(captured_at = %snapshot.captured_at, opened, "snapshot scanned");
        opened
    }

    /// Scan snapshots in capture order.
    pub fn scan_all<'a, I>(&mut self, snapshots: I) -> usize
    where
        I: IntoIterator<Item = &'a Snapshot>,
    {
        snapshots
            .into_iter()
            .map(|snapshot| self.scan_snapshot(snapshot))
            .sum()
    }

    pub fn database(&self) -> &SpanDatabase {
        &self.db
    }

    pub fn into_database(self) -> SpanDatabase {
        self.db
    }
}
