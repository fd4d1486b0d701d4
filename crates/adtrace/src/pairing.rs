//! Snapshot-local pairing of provider advertisement start/end
//! segmentation descriptors carried in `EXT-X-DATERANGE` markers.

use std::collections::HashMap;
use std::sync::Arc;

use scte35::{SegmentationType, SpliceInfoSection};
use serde::Serialize;
use tracing::{debug, warn};

use crate::decoder::MarkerDecoder;
use crate::diagnostics::ScanDiagnostics;
use crate::model::{DateRangeInfo, Segment, Snapshot, Timestamp};

/// One ad resolved from a start/end descriptor pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ad {
    /// Shared segmentation event id
    pub id: u32,
    pub date_range_id: String,
    /// Capture time of the snapshot that first resolved the pair
    pub first_appearance: Timestamp,
    pub segment_num: u8,
    pub segment_total: u8,
    pub marker_start: Timestamp,
    pub marker_end: Option<Timestamp>,
    /// Ad segments in media-sequence order, one per sequence number
    pub segments: Vec<Segment>,
    /// Break code from the co-located Call Ad Server descriptor
    pub break_id: Option<u16>,
}

impl Ad {
    pub fn is_complete(&self) -> bool {
        self.marker_end.is_some()
    }

    /// Insert a segment unless its media sequence is already present.
    pub fn add_segment(&mut self, segment: Segment) {
        match self
            .segments
            .binary_search_by_key(&segment.media_sequence, |s| s.media_sequence)
        {
            Ok(_) => {}
            Err(idx) => self.segments.insert(idx, segment),
        }
    }

    pub fn media_sequence_range(&self) -> Option<(u64, u64)> {
        Some((
            self.segments.first()?.media_sequence,
            self.segments.last()?.media_sequence,
        ))
    }

    pub fn actual_start(&self) -> Option<Timestamp> {
        self.segments.first()?.program_date_time
    }

    pub fn actual_end(&self) -> Option<Timestamp> {
        self.segments.last()?.end_time()
    }
}

/// Ads keyed by id in first-seen order.
///
/// Identity fields are first-wins; a repeat of a known id may only add
/// segments not seen yet and fill in a missing break id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdCollection {
    ads: Vec<Ad>,
    index: HashMap<u32, usize>,
}

impl AdCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the ad was not known before.
    pub fn insert(&mut self, ad: Ad) -> bool {
        if let Some(&idx) = self.index.get(&ad.id) {
            let existing = &mut self.ads[idx];
            for segment in ad.segments {
                existing.add_segment(segment);
            }
            if existing.break_id.is_none() {
                existing.break_id = ad.break_id;
            }
            return false;
        }
        self.index.insert(ad.id, self.ads.len());
        self.ads.push(ad);
        true
    }

    pub fn get(&self, id: u32) -> Option<&Ad> {
        self.index.get(&id).map(|&idx| &self.ads[idx])
    }

    pub fn len(&self) -> usize {
        self.ads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ads.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Ad> {
        self.ads.iter()
    }
}

impl<'a> IntoIterator for &'a AdCollection {
    type Item = &'a Ad;
    type IntoIter = std::slice::Iter<'a, Ad>;

    fn into_iter(self) -> Self::IntoIter {
        self.ads.iter()
    }
}

struct DecodedMarker<'a> {
    segment: &'a Segment,
    date_range: &'a DateRangeInfo,
    section: SpliceInfoSection,
}

/// Resolves complete ads snapshot by snapshot and accumulates them.
pub struct CompletePairMatcher {
    decoder: Arc<dyn MarkerDecoder>,
    ads: AdCollection,
    diagnostics: ScanDiagnostics,
    first_break_event_id: Option<u32>,
}

impl CompletePairMatcher {
    pub fn new(decoder: Arc<dyn MarkerDecoder>) -> Self {
        Self {
            decoder,
            ads: AdCollection::new(),
            diagnostics: ScanDiagnostics::default(),
            first_break_event_id: None,
        }
    }

    fn decode_markers<'a>(&mut self, snapshot: &'a Snapshot) -> Vec<DecodedMarker<'a>> {
        let mut decoded = Vec::new();
        for segment in &snapshot.segments {
            for marker in &segment.markers {
                let Some(date_range) = &marker.date_range else {
                    continue;
                };
                match self.decoder.decode(&marker.payload) {
                    Ok(section) => decoded.push(DecodedMarker {
                        segment,
                        date_range,
                        section,
                    }),
                    Err(e) => {
                        warn!(date_range = %date_range.id, "undecodable date range marker: {e}");
                        self.diagnostics.decode_failures += 1;
                    }
                }
            }
        }
        decoded
    }

    /// Pair start/end descriptors visible in one snapshot.
    ///
    /// Each start takes the first end with the same event id that is not
    /// earlier in the window. Starts without a visible end yield nothing.
    pub fn find_complete_ads(&mut self, snapshot: &Snapshot) -> Vec<Ad> {
        let decoded = self.decode_markers(snapshot);

        if self.first_break_event_id.is_none() {
            self.first_break_event_id = decoded.iter().find_map(|m| {
                m.section
                    .find_segmentation(SegmentationType::BreakStart)
                    .map(|d| d.segmentation_event_id)
            });
        }

        let descriptors_of = |kind: SegmentationType| {
            decoded.iter().flat_map(move |m| {
                m.section
                    .segmentation_descriptors()
                    .filter(move |d| d.segmentation_type == kind)
                    .map(move |d| (m, d))
            })
        };
        let ends: Vec<_> = descriptors_of(SegmentationType::ProviderAdvertisementEnd).collect();

        let mut ads: Vec<Ad> = Vec::new();
        for (start, descriptor) in descriptors_of(SegmentationType::ProviderAdvertisementStart) {
            let id = descriptor.segmentation_event_id;
            if ads.iter().any(|ad| ad.id == id) {
                continue;
            }
            let start_seq = start.segment.media_sequence;
            let Some((end, _)) = ends.iter().find(|(end, d)| {
                d.segmentation_event_id == id && end.segment.media_sequence >= start_seq
            }) else {
                debug!(id, "ad start without a visible end");
                continue;
            };

            let segments = match end.segment.media_sequence.checked_sub(1) {
                Some(last) => snapshot.segments_in(start_seq, last).cloned().collect(),
                None => Vec::new(),
            };
            let break_id = start
                .section
                .find_segmentation(SegmentationType::CallAdServer)
                .and_then(|cas| cas.upid.break_code());

            ads.push(Ad {
                id,
                date_range_id: start.date_range.id.clone(),
                first_appearance: snapshot.captured_at,
                segment_num: descriptor.segment_num,
                segment_total: descriptor.segments_expected,
                marker_start: start.date_range.start_date,
                marker_end: Some(end.date_range.start_date),
                segments,
                break_id,
            });
        }
        ads
    }

    /// Resolve a snapshot and fold the results into the collection.
    /// Returns the number of previously unknown ads.
    pub fn scan_snapshot(&mut self, snapshot: &Snapshot) -> usize {
        let found = self.find_complete_ads(snapshot);
        let mut added = 0;
        for ad in found {
            let id = ad.id;
            if self.ads.insert(ad) {
                debug!(id, "new complete ad");
                added += 1;
            } else {
                self.diagnostics.duplicate_opens += 1;
            }
        }
        added
    }

    pub fn ads(&self) -> &AdCollection {
        &self.ads
    }

    pub fn diagnostics(&self) -> &ScanDiagnostics {
        &self.diagnostics
    }

    /// Event id of the first break-start descriptor seen.
    pub fn first_break_event_id(&self) -> Option<u32> {
        self.first_break_event_id
    }

    pub fn into_parts(self) -> (AdCollection, ScanDiagnostics) {
        (self.ads, self.diagnostics)
    }
}
