//! Ad insertion timeline reconstruction from live HLS manifest captures.
//!
//! Two independently captured series of manifest snapshots are scanned: the
//! *source* stream carrying out-of-band ad markers and the *service* stream
//! carrying the ad-decisioned output. Each stream is resolved into boundaries
//! (spans or paired ads) and the two are joined on exact start timestamps.
//!
//! ## Component Overview
//!
//! - [`SnapshotCursor`]: monotonic per-stream admission gate
//! - [`SpanDatabase`]: spans keyed by start time with a LIFO open stack
//! - [`SpanAssembler`]: live cue and ad replacement channels
//! - [`CompletePairMatcher`]: provider ad start/end descriptor pairing
//! - [`BoundaryResolver`]: common seam over the above, picked by [`SignalingConvention`]
//! - [`correlate`] / [`correlate_resolved`]: the timeline join
//! - [`measure`]: signaled vs. observed boundary conformance
//! - [`Analyzer`]: one-shot facade producing an [`AnalysisReport`]
//!
//! Manifest text is parsed by `m3u8-rs`; [`parse_snapshot`] adapts the result.

pub mod analysis;
pub mod assembler;
pub mod config;
pub mod conformance;
pub mod correlate;
pub mod cursor;
pub mod decoder;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod pairing;
pub mod playlist;
pub mod policy;
pub mod report;
pub mod resolver;
pub mod series;
pub mod span;

pub use analysis::Analyzer;
pub use assembler::{
    AdReplacementAssembler, AdReplacementRule, LiveCueAssembler, LiveCueRule, SegmentRule,
    SpanAssembler,
};
pub use config::{AdReplacementConfig, AnalysisConfig};
pub use conformance::{BoundaryDelta, Classification, Conformance, classify, measure};
pub use correlate::{Boundary, Timeline, TimelineEntry, correlate, correlate_records, correlate_resolved};
pub use cursor::{Admission, SnapshotCursor};
pub use decoder::{MarkerDecoder, MarkerSummary, Scte35Decoder};
pub use diagnostics::ScanDiagnostics;
pub use error::AdTraceError;
pub use model::{CueTag, DateRangeInfo, Marker, Segment, Snapshot, Timestamp};
pub use pairing::{Ad, AdCollection, CompletePairMatcher};
pub use playlist::{parse_media_playlist, parse_snapshot, snapshot_from_playlist};
pub use policy::{AdContentPolicy, UriPatternPolicy};
pub use report::{AdRecord, AnalysisReport, SpanRecord, StreamReport};
pub use resolver::{
    BoundaryResolver, Resolved, ScanSummary, SignalingConvention, resolver_for, scan_stream,
};
pub use series::{SnapshotSeries, TimeMatch};
pub use span::{Span, SpanDatabase, SpanKind, SpanTag};

pub type Result<T> = std::result::Result<T, AdTraceError>;
