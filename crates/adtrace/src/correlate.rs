use std::collections::{BTreeMap, HashSet};

use chrono::TimeDelta;
use serde::Serialize;
use tracing::debug;

use crate::model::Timestamp;
use crate::report::{AdRecord, SpanRecord, ad_records, span_records};
use crate::resolver::Resolved;
use crate::span::SpanDatabase;

/// A boundary from either resolver family.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "boundary", rename_all = "snake_case")]
pub enum Boundary {
    Span(SpanRecord),
    Ad(AdRecord),
}

impl Boundary {
    /// Join key: span start, or the ad's signaled start.
    pub fn key(&self) -> Timestamp {
        match self {
            Boundary::Span(span) => span.from_pdt,
            Boundary::Ad(ad) => ad.marker_start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub key: Timestamp,
    pub source: Boundary,
    pub service: Option<Boundary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Timeline {
    /// One entry per source boundary, in source order
    pub entries: Vec<TimelineEntry>,
    /// Service boundaries no source boundary shares a key with
    pub unmatched_service: Vec<Boundary>,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn matched(&self) -> usize {
        self.entries.iter().filter(|e| e.service.is_some()).count()
    }
}

/// Exact-key join of source boundaries against service boundaries.
pub fn correlate_records(source: Vec<Boundary>, service: Vec<Boundary>) -> Timeline {
    let mut by_key: BTreeMap<Timestamp, Boundary> = BTreeMap::new();
    let mut shadowed = Vec::new();
    for boundary in service {
        let key = boundary.key();
        if by_key.contains_key(&key) {
            shadowed.push(boundary);
        } else {
            by_key.insert(key, boundary);
        }
    }

    let source_keys: HashSet<Timestamp> = source.iter().map(Boundary::key).collect();
    let entries: Vec<TimelineEntry> = source
        .into_iter()
        .map(|boundary| {
            let key = boundary.key();
            TimelineEntry {
                key,
                service: by_key.get(&key).cloned(),
                source: boundary,
            }
        })
        .collect();

    let unmatched_service = by_key
        .into_values()
        .filter(|b| !source_keys.contains(&b.key()))
        .chain(shadowed)
        .collect();

    let timeline = Timeline {
        entries,
        unmatched_service,
    };
    debug!(
        entries = timeline.len(),
        matched = timeline.matched(),
        unmatched_service = timeline.unmatched_service.len(),
        "timeline correlated"
    );
    timeline
}

/// Join two span databases by span start.
pub fn correlate(source: &SpanDatabase, service: &SpanDatabase) -> Timeline {
    correlate_records(
        span_records(source).into_iter().map(Boundary::Span).collect(),
        span_records(service).into_iter().map(Boundary::Span).collect(),
    )
}

fn boundaries(resolved: &Resolved, tolerance: TimeDelta) -> Vec<Boundary> {
    match resolved {
        Resolved::Spans(db) => span_records(db).into_iter().map(Boundary::Span).collect(),
        Resolved::Ads { ads, .. } => ad_records(ads, tolerance)
            .into_iter()
            .map(Boundary::Ad)
            .collect(),
    }
}

/// Join whatever the two resolvers produced.
pub fn correlate_resolved(source: &Resolved, service: &Resolved, tolerance: TimeDelta) -> Timeline {
    correlate_records(boundaries(source, tolerance), boundaries(service, tolerance))
}
