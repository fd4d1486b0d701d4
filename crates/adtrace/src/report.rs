//! Plain serializable records for presentation layers.

use chrono::TimeDelta;
use serde::Serialize;

use crate::conformance::{Conformance, measure};
use crate::correlate::Timeline;
use crate::decoder::MarkerSummary;
use crate::diagnostics::ScanDiagnostics;
use crate::model::{Timestamp, as_secs_f64};
use crate::pairing::{Ad, AdCollection};
use crate::resolver::{Resolved, ScanSummary, SignalingConvention};
use crate::span::{Span, SpanDatabase, SpanKind, SpanTag};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanRecord {
    pub kind: SpanKind,
    pub info: String,
    pub after_segment_uri: Option<String>,
    pub from_segment_uri: String,
    pub from_pdt: Timestamp,
    pub to_segment_uri: Option<String>,
    pub to_pdt: Option<Timestamp>,
    /// Seconds between start and end, once closed
    pub actual_duration: Option<f64>,
    pub payload: Option<String>,
    pub tags: Vec<SpanTag>,
    pub marker: Option<MarkerSummary>,
}

impl From<&Span> for SpanRecord {
    fn from(span: &Span) -> Self {
        Self {
            kind: span.kind(),
            info: span.info(),
            after_segment_uri: span.after_segment_uri().map(str::to_string),
            from_segment_uri: span.from_segment_uri().to_string(),
            from_pdt: span.from_pdt(),
            to_segment_uri: span.to_segment_uri().map(str::to_string),
            to_pdt: span.to_pdt(),
            actual_duration: span.actual_duration().map(as_secs_f64),
            payload: span.payload().map(str::to_string),
            tags: span.tags().to_vec(),
            marker: span.marker().cloned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdRecord {
    pub id: u32,
    pub date_range_id: String,
    pub break_id: Option<u16>,
    pub first_appearance: Timestamp,
    pub segment_num: u8,
    pub segment_total: u8,
    pub marker_start: Timestamp,
    pub marker_end: Option<Timestamp>,
    pub segment_count: usize,
    pub media_sequence_range: Option<(u64, u64)>,
    pub segment_uris: Vec<String>,
    pub conformance: Conformance,
}

impl AdRecord {
    pub fn from_ad(ad: &Ad, tolerance: TimeDelta) -> Self {
        Self {
            id: ad.id,
            date_range_id: ad.date_range_id.clone(),
            break_id: ad.break_id,
            first_appearance: ad.first_appearance,
            segment_num: ad.segment_num,
            segment_total: ad.segment_total,
            marker_start: ad.marker_start,
            marker_end: ad.marker_end,
            segment_count: ad.segments.len(),
            media_sequence_range: ad.media_sequence_range(),
            segment_uris: ad.segments.iter().map(|s| s.uri.clone()).collect(),
            conformance: measure(ad, tolerance),
        }
    }
}

pub fn span_records(db: &SpanDatabase) -> Vec<SpanRecord> {
    db.iter().map(SpanRecord::from).collect()
}

pub fn ad_records(ads: &AdCollection, tolerance: TimeDelta) -> Vec<AdRecord> {
    ads.iter().map(|ad| AdRecord::from_ad(ad, tolerance)).collect()
}

/// Everything one stream produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamReport {
    pub convention: SignalingConvention,
    pub scan: ScanSummary,
    pub diagnostics: ScanDiagnostics,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<SpanRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ads: Vec<AdRecord>,
    /// Event id of the first provider break start, when one was signaled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_break_id: Option<u32>,
}

impl StreamReport {
    pub fn new(
        convention: SignalingConvention,
        scan: ScanSummary,
        resolved: &Resolved,
        tolerance: TimeDelta,
    ) -> Self {
        let (spans, ads) = match resolved {
            Resolved::Spans(db) => (span_records(db), Vec::new()),
            Resolved::Ads { ads, .. } => (Vec::new(), ad_records(ads, tolerance)),
        };
        Self {
            convention,
            scan,
            diagnostics: *resolved.diagnostics(),
            spans,
            ads,
            first_break_id: resolved.first_break_id(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty() && self.ads.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub source: StreamReport,
    pub service: StreamReport,
    pub timeline: Timeline,
    pub tolerance_ms: u64,
}

impl AnalysisReport {
    /// Every resolved ad on either side, source first.
    pub fn ads(&self) -> impl Iterator<Item = &AdRecord> {
        self.source.ads.iter().chain(self.service.ads.iter())
    }
}
