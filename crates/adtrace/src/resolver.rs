use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::assembler::{AdReplacementRule, LiveCueRule, SegmentRule, SpanAssembler};
use crate::config::AnalysisConfig;
use crate::decoder::MarkerDecoder;
use crate::diagnostics::ScanDiagnostics;
use crate::model::Snapshot;
use crate::pairing::{AdCollection, CompletePairMatcher};
use crate::policy::UriPatternPolicy;
use crate::span::SpanDatabase;
use crate::{AdTraceError, Result};

/// How a stream signals its ad boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingConvention {
    /// `EXT-X-CUE-OUT` / `EXT-X-CUE-IN`
    CueOut,
    /// Discontinuities into and out of ad-patterned segments
    AdReplacement,
    /// Provider ad start/end segmentation descriptors in date ranges
    PairedDescriptors,
}

impl SignalingConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalingConvention::CueOut => "cue-out",
            SignalingConvention::AdReplacement => "ad-replacement",
            SignalingConvention::PairedDescriptors => "paired-descriptors",
        }
    }
}

impl fmt::Display for SignalingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalingConvention {
    type Err = AdTraceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cue-out" | "cue" => Ok(SignalingConvention::CueOut),
            "ad-replacement" | "replacement" => Ok(SignalingConvention::AdReplacement),
            "paired-descriptors" | "paired" => Ok(SignalingConvention::PairedDescriptors),
            other => Err(AdTraceError::configuration(format!(
                "unknown signaling convention '{other}'"
            ))),
        }
    }
}

/// Final product of a resolver.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Spans(SpanDatabase),
    Ads {
        ads: AdCollection,
        diagnostics: ScanDiagnostics,
        /// Event id of the first break start descriptor seen
        first_break_id: Option<u32>,
    },
}

impl Resolved {
    pub fn diagnostics(&self) -> &ScanDiagnostics {
        match self {
            Resolved::Spans(db) => db.diagnostics(),
            Resolved::Ads { diagnostics, .. } => diagnostics,
        }
    }

    pub fn first_break_id(&self) -> Option<u32> {
        match self {
            Resolved::Spans(_) => None,
            Resolved::Ads { first_break_id, .. } => *first_break_id,
        }
    }

    pub fn boundary_count(&self) -> usize {
        match self {
            Resolved::Spans(db) => db.len(),
            Resolved::Ads { ads, .. } => ads.len(),
        }
    }
}

/// Common capability behind the span assemblers and the pair matcher.
pub trait BoundaryResolver: Send {
    fn convention(&self) -> SignalingConvention;

    /// Scan one snapshot; returns the number of new boundaries found.
    fn scan_snapshot(&mut self, snapshot: &Snapshot) -> usize;

    fn into_resolved(self: Box<Self>) -> Resolved;
}

struct AssemblerResolver<R> {
    convention: SignalingConvention,
    assembler: SpanAssembler<R>,
}

impl<R: SegmentRule> BoundaryResolver for AssemblerResolver<R> {
    fn convention(&self) -> SignalingConvention {
        self.convention
    }

    fn scan_snapshot(&mut self, snapshot: &Snapshot) -> usize {
        self.assembler.scan_snapshot(snapshot)
    }

    fn into_resolved(self: Box<Self>) -> Resolved {
        Resolved::Spans(self.assembler.into_database())
    }
}

impl BoundaryResolver for CompletePairMatcher {
    fn convention(&self) -> SignalingConvention {
        SignalingConvention::PairedDescriptors
    }

    fn scan_snapshot(&mut self, snapshot: &Snapshot) -> usize {
        CompletePairMatcher::scan_snapshot(self, snapshot)
    }

    fn into_resolved(self: Box<Self>) -> Resolved {
        let first_break_id = self.first_break_event_id();
        let (ads, diagnostics) = self.into_parts();
        Resolved::Ads {
            ads,
            diagnostics,
            first_break_id,
        }
    }
}

/// Build the resolver for a convention.
pub fn resolver_for(
    convention: SignalingConvention,
    config: &AnalysisConfig,
    decoder: Arc<dyn MarkerDecoder>,
) -> Result<Box<dyn BoundaryResolver>> {
    Ok(match convention {
        SignalingConvention::CueOut => Box::new(AssemblerResolver {
            convention,
            assembler: SpanAssembler::new(LiveCueRule::new(decoder)),
        }),
        SignalingConvention::AdReplacement => {
            let policy = UriPatternPolicy::from_config(&config.ad_replacement)?;
            Box::new(AssemblerResolver {
                convention,
                assembler: SpanAssembler::new(AdReplacementRule::new(Box::new(policy))),
            })
        }
        SignalingConvention::PairedDescriptors => Box::new(CompletePairMatcher::new(decoder)),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub snapshots_scanned: usize,
    pub boundaries_found: usize,
    /// More snapshots were available than `max_entries`
    pub truncated: bool,
}

/// Feed snapshots in capture order, stopping after `max_entries`.
pub fn scan_stream<S, I>(
    resolver: &mut dyn BoundaryResolver,
    snapshots: I,
    max_entries: usize,
) -> ScanSummary
where
    S: std::borrow::Borrow<Snapshot>,
    I: IntoIterator<Item = S>,
{
    let mut summary = ScanSummary::default();
    let mut iter = snapshots.into_iter();
    for snapshot in iter.by_ref().take(max_entries) {
        let found = resolver.scan_snapshot(snapshot.borrow());
        if found > 0 {
            debug!(
                convention = %resolver.convention(),
                found,
                index = summary.snapshots_scanned,
                "new boundaries"
            );
        }
        summary.snapshots_scanned += 1;
        summary.boundaries_found += found;
    }
    summary.truncated = iter.next().is_some();
    info!(
        convention = %resolver.convention(),
        snapshots = summary.snapshots_scanned,
        boundaries = summary.boundaries_found,
        truncated = summary.truncated,
        "stream scan finished"
    );
    summary
}
