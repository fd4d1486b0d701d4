use std::collections::BTreeMap;
use std::fmt;

use chrono::TimeDelta;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cursor::{Admission, SnapshotCursor};
use crate::decoder::MarkerSummary;
use crate::diagnostics::ScanDiagnostics;
use crate::model::{Segment, Timestamp, as_secs_f64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    LiveCue,
    AdReplacement,
}

impl SpanKind {
    pub fn label(&self) -> &'static str {
        match self {
            SpanKind::LiveCue => "live cue",
            SpanKind::AdReplacement => "ad replacement",
        }
    }
}

/// Sub-event classification accumulated on an open span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanTag {
    /// Another ad creative
    Ad,
    /// Filler content
    Slate,
    /// A further opening cue while the span was open
    Cue,
}

impl SpanTag {
    pub fn code(&self) -> char {
        match self {
            SpanTag::Ad => 'A',
            SpanTag::Slate => 'S',
            SpanTag::Cue => 'C',
        }
    }
}

/// One detected interval. The start is fixed at creation; the end is set
/// once, by [`SpanDatabase::close_top`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    kind: SpanKind,
    after_segment_uri: Option<String>,
    from_segment_uri: String,
    from_pdt: Timestamp,
    to_segment_uri: Option<String>,
    to_pdt: Option<Timestamp>,
    payload: Option<String>,
    tags: Vec<SpanTag>,
    marker: Option<MarkerSummary>,
}

impl Span {
    pub fn open(kind: SpanKind, from_segment_uri: impl Into<String>, from_pdt: Timestamp) -> Self {
        Self {
            kind,
            after_segment_uri: None,
            from_segment_uri: from_segment_uri.into(),
            from_pdt,
            to_segment_uri: None,
            to_pdt: None,
            payload: None,
            tags: Vec::new(),
            marker: None,
        }
    }

    pub fn after(mut self, uri: Option<String>) -> Self {
        self.after_segment_uri = uri;
        self
    }

    pub fn with_payload(mut self, payload: Option<String>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_marker(mut self, marker: Option<MarkerSummary>) -> Self {
        self.marker = marker;
        self
    }

    pub fn push_tag(&mut self, tag: SpanTag) {
        self.tags.push(tag);
    }

    pub fn kind(&self) -> SpanKind {
        self.kind
    }

    pub fn after_segment_uri(&self) -> Option<&str> {
        self.after_segment_uri.as_deref()
    }

    pub fn from_segment_uri(&self) -> &str {
        &self.from_segment_uri
    }

    pub fn from_pdt(&self) -> Timestamp {
        self.from_pdt
    }

    pub fn to_segment_uri(&self) -> Option<&str> {
        self.to_segment_uri.as_deref()
    }

    pub fn to_pdt(&self) -> Option<Timestamp> {
        self.to_pdt
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn tags(&self) -> &[SpanTag] {
        &self.tags
    }

    pub fn marker(&self) -> Option<&MarkerSummary> {
        self.marker.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.to_pdt.is_none()
    }

    pub fn actual_duration(&self) -> Option<TimeDelta> {
        self.to_pdt.map(|to| to - self.from_pdt)
    }

    /// Human-readable classification: kind, decoded marker, then tag codes.
    pub fn info(&self) -> String {
        let mut info = format!("{}:", self.kind.label());
        if let Some(marker) = &self.marker {
            info.push(' ');
            info.push_str(&marker.to_string());
        }
        if !self.tags.is_empty() {
            info.push(' ');
            info.extend(self.tags.iter().map(SpanTag::code));
        }
        info
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> ", self.from_pdt.to_rfc3339())?;
        match self.to_pdt {
            Some(to) => write!(f, "{}", to.to_rfc3339())?,
            None => write!(f, "open")?,
        }
        if let Some(duration) = self.actual_duration() {
            write!(f, " ({:.3}s)", as_secs_f64(duration))?;
        }
        write!(f, ": {}", self.info())
    }
}

/// Spans of one stream keyed by start, plus the open-span stack and the
/// stream's cursor.
#[derive(Debug, Clone, Default)]
pub struct SpanDatabase {
    spans: BTreeMap<Timestamp, Span>,
    open: Vec<Timestamp>,
    cursor: SnapshotCursor,
    diagnostics: ScanDiagnostics,
}

impl SpanDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate a segment through the cursor, counting the outcome.
    pub fn admit(&mut self, segment: &Segment) -> bool {
        match self.cursor.admit(segment) {
            Ok(Admission::Process) => {
                self.diagnostics.processed_segments += 1;
                true
            }
            Ok(Admission::Skip) => {
                self.diagnostics.skipped_segments += 1;
                false
            }
            Err(e) => {
                warn!(uri = %segment.uri, "skipping segment: {e}");
                self.diagnostics.missing_timestamps += 1;
                false
            }
        }
    }

    pub fn watermark(&self) -> Option<Timestamp> {
        self.cursor.watermark()
    }

    pub fn contains(&self, from_pdt: Timestamp) -> bool {
        self.spans.contains_key(&from_pdt)
    }

    pub fn get(&self, from_pdt: Timestamp) -> Option<&Span> {
        self.spans.get(&from_pdt)
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Spans in start order.
    pub fn iter(&self) -> impl Iterator<Item = &Span> {
        self.spans.values()
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn top_open(&self) -> Option<&Span> {
        self.open.last().and_then(|key| self.spans.get(key))
    }

    pub fn top_open_mut(&mut self) -> Option<&mut Span> {
        let key = *self.open.last()?;
        self.spans.get_mut(&key)
    }

    /// Record and open a span. Returns `false` if a span already starts at
    /// the same timestamp.
    pub fn open(&mut self, span: Span) -> bool {
        let key = span.from_pdt;
        if self.spans.contains_key(&key) {
            self.diagnostics.duplicate_opens += 1;
            return false;
        }
        debug!(from = %key, kind = span.kind.label(), uri = %span.from_segment_uri, "span opened");
        self.spans.insert(key, span);
        self.open.push(key);
        true
    }

    /// Close the most recently opened span at `to_pdt`.
    ///
    /// Returns the start key of the closed span. Nothing is closed when no
    /// span is open, or when the end would not come after the start.
    pub fn close_top(&mut self, to_segment_uri: &str, to_pdt: Timestamp) -> Option<Timestamp> {
        let Some(&key) = self.open.last() else {
            debug!(uri = to_segment_uri, "closing event with no open span");
            self.diagnostics.orphan_closes += 1;
            return None;
        };
        if to_pdt <= key {
            warn!(from = %key, to = %to_pdt, "refusing to close span before it starts");
            self.diagnostics.rejected_closes += 1;
            return None;
        }
        let span = self.spans.get_mut(&key)?;
        span.to_segment_uri = Some(to_segment_uri.to_string());
        span.to_pdt = Some(to_pdt);
        self.open.pop();
        debug!(from = %key, to = %to_pdt, "span closed");
        Some(key)
    }

    pub fn diagnostics(&self) -> &ScanDiagnostics {
        &self.diagnostics
    }

    pub(crate) fn diagnostics_mut(&mut self) -> &mut ScanDiagnostics {
        &mut self.diagnostics
    }
}

/// Equal when the recorded spans and the open stack match; counters and
/// cursor position are bookkeeping.
impl PartialEq for SpanDatabase {
    fn eq(&self, other: &Self) -> bool {
        self.spans == other.spans && self.open == other.open
    }
}

impl fmt::Display for SpanDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for span in self.spans.values() {
            writeln!(f, "- {span}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn t(secs: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    #[test]
    fn duplicate_open_is_counted_not_stored() {
        let mut db = SpanDatabase::new();
        assert!(db.open(Span::open(SpanKind::LiveCue, "a.ts", t(0))));
        assert!(!db.open(Span::open(SpanKind::LiveCue, "a-again.ts", t(0))));
        assert_eq!(db.len(), 1);
        assert_eq!(db.get(t(0)).unwrap().from_segment_uri(), "a.ts");
        assert_eq!(db.diagnostics().duplicate_opens, 1);
    }

    #[test]
    fn close_pops_the_most_recent_span() {
        let mut db = SpanDatabase::new();
        db.open(Span::open(SpanKind::LiveCue, "a.ts", t(0)));
        db.open(Span::open(SpanKind::LiveCue, "b.ts", t(10)));

        assert_eq!(db.close_top("c.ts", t(20)), Some(t(10)));
        assert_eq!(db.close_top("d.ts", t(30)), Some(t(0)));
        assert_eq!(db.open_count(), 0);
        assert_eq!(db.get(t(0)).unwrap().to_segment_uri(), Some("d.ts"));
        assert_eq!(
            db.get(t(10)).unwrap().actual_duration(),
            Some(TimeDelta::seconds(10))
        );
    }

    #[test]
    fn orphan_and_backwards_closes_change_nothing() {
        let mut db = SpanDatabase::new();
        assert_eq!(db.close_top("x.ts", t(5)), None);
        assert_eq!(db.diagnostics().orphan_closes, 1);

        db.open(Span::open(SpanKind::AdReplacement, "ad.ts", t(10)));
        assert_eq!(db.close_top("main.ts", t(10)), None);
        assert_eq!(db.diagnostics().rejected_closes, 1);
        assert!(db.top_open().unwrap().is_open());
    }

    #[test]
    fn info_lists_marker_then_tags() {
        let mut span = Span::open(SpanKind::AdReplacement, "ad.ts", t(0));
        assert_eq!(span.info(), "ad replacement:");
        span.push_tag(SpanTag::Ad);
        span.push_tag(SpanTag::Slate);
        assert_eq!(span.info(), "ad replacement: AS");

        let cue = Span::open(SpanKind::LiveCue, "c.ts", t(0)).with_marker(Some(MarkerSummary {
            command: "splice_insert".to_string(),
            event_id: Some(7),
            duration: Some(30.0),
            segmentation_types: Vec::new(),
            pts: None,
        }));
        assert_eq!(cue.info(), "live cue: splice_insert #7 30.0s");
    }

    #[test]
    fn equality_ignores_bookkeeping() {
        let mut a = SpanDatabase::new();
        let mut b = SpanDatabase::new();
        a.open(Span::open(SpanKind::LiveCue, "a.ts", t(0)));
        b.open(Span::open(SpanKind::LiveCue, "a.ts", t(0)));
        b.open(Span::open(SpanKind::LiveCue, "a.ts", t(0)));
        assert_eq!(a, b);
    }
}
