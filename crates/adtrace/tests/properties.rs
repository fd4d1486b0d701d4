use std::collections::BTreeSet;
use std::sync::Arc;

use adtrace_engine::{
    AdReplacementAssembler, AdReplacementRule, CompletePairMatcher, CueTag, DateRangeInfo,
    LiveCueAssembler, LiveCueRule, Marker, Scte35Decoder, Segment, Snapshot, Span, SpanDatabase,
    SpanKind, Timestamp, UriPatternPolicy, correlate,
};
use chrono::{TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use scte35::test_support::{SectionBuilder, SegmentationBuilder};

fn t(secs: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

#[derive(Debug, Clone)]
struct SegmentShape {
    cue: u8,
    discontinuity: bool,
    ad: bool,
    /// Shares the previous segment's timestamp, which then lasts zero seconds.
    same_time: bool,
}

fn arb_segment() -> impl Strategy<Value = SegmentShape> {
    (0u8..3, any::<bool>(), any::<bool>(), prop::bool::weighted(0.3)).prop_map(
        |(cue, discontinuity, ad, same_time)| SegmentShape {
            cue,
            discontinuity,
            ad,
            same_time,
        },
    )
}

fn build_snapshot(shapes: &[SegmentShape]) -> Snapshot {
    let mut clock = 0i64;
    let mut segments: Vec<Segment> = Vec::with_capacity(shapes.len());
    for (i, shape) in shapes.iter().enumerate() {
        match segments.last_mut() {
            Some(previous) if shape.same_time => previous.duration = 0.0,
            Some(_) => clock += 2,
            None => {}
        }
        let uri = if shape.ad {
            format!("bpkio-jitt/{i}.ts")
        } else {
            format!("main/{i}.ts")
        };
        let mut segment = Segment::new(uri, i as u64).at(t(clock)).lasting(2.0);
        segment.discontinuity = shape.discontinuity;
        segment.cue = match shape.cue {
            1 => Some(CueTag::Out { duration: None }),
            2 => Some(CueTag::In),
            _ => None,
        };
        segments.push(segment);
    }
    Snapshot::new(t(clock + 2), segments)
}

fn live_cue() -> LiveCueAssembler {
    LiveCueAssembler::new(LiveCueRule::new(Arc::new(Scte35Decoder::default())))
}

fn replacement() -> AdReplacementAssembler {
    let policy = UriPatternPolicy::new("bpkio-jitt", "slate").unwrap();
    AdReplacementAssembler::new(AdReplacementRule::new(Box::new(policy)))
}

fn marker(payload: String, id: &str, start: Timestamp) -> Marker {
    Marker::in_date_range(payload, DateRangeInfo::new(id, start))
}

fn descriptor_payload(type_id: u8, event_id: u32) -> String {
    SectionBuilder::time_signal(Some(0))
        .descriptor(
            SegmentationBuilder::new(type_id, event_id)
                .segment_num(1, 1)
                .descriptor_bytes(),
        )
        .to_base64()
}

/// Back-to-back ads of the given segment lengths, with one trailing segment.
fn paired_snapshot(lengths: &[u64]) -> (Snapshot, Vec<(u64, u64)>) {
    let total: u64 = lengths.iter().sum::<u64>() + 1;
    let mut segments: Vec<Segment> = (0..total)
        .map(|i| Segment::new(format!("{i}.ts"), 1_000 + i).at(t(2 * i as i64)).lasting(2.0))
        .collect();

    let mut ranges = Vec::new();
    let mut first = 0u64;
    for (k, &len) in lengths.iter().enumerate() {
        let event_id = 500 + k as u32;
        let end = first + len;
        let start_pdt = segments[first as usize].program_date_time.unwrap();
        let end_pdt = segments[end as usize].program_date_time.unwrap();
        segments[first as usize].markers.push(marker(
            descriptor_payload(0x30, event_id),
            &format!("start-{k}"),
            start_pdt,
        ));
        segments[end as usize].markers.push(marker(
            descriptor_payload(0x31, event_id),
            &format!("end-{k}"),
            end_pdt,
        ));
        ranges.push((1_000 + first, 1_000 + end));
        first = end;
    }
    (Snapshot::new(t(2 * total as i64), segments), ranges)
}

fn database_with_starts(kind: SpanKind, starts: &BTreeSet<i64>) -> SpanDatabase {
    let mut db = SpanDatabase::new();
    for &s in starts {
        db.open(Span::open(kind, format!("{s}.ts"), t(s)));
        db.close_top("back.ts", t(s) + TimeDelta::milliseconds(500));
    }
    db
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn replaying_a_snapshot_changes_nothing(shapes in proptest::collection::vec(arb_segment(), 0..40)) {
        let snapshot = build_snapshot(&shapes);

        let mut once = live_cue();
        once.scan_snapshot(&snapshot);
        let mut twice = live_cue();
        twice.scan_all([&snapshot, &snapshot]);
        prop_assert_eq!(once.database(), twice.database());

        let mut once = replacement();
        once.scan_snapshot(&snapshot);
        let mut twice = replacement();
        twice.scan_all([&snapshot, &snapshot]);
        prop_assert_eq!(once.database(), twice.database());
    }

    #[test]
    fn replaying_a_later_window_with_shared_timestamps_changes_nothing(
        shapes in proptest::collection::vec(arb_segment(), 2..40),
        split in any::<prop::sample::Index>(),
    ) {
        let full = build_snapshot(&shapes);
        // second window starts inside the first, possibly mid-way through a run of shared timestamps
        let from = split.index(full.segments.len());
        let later = Snapshot::new(full.captured_at, full.segments[from..].to_vec());

        let mut single = replacement();
        single.scan_snapshot(&full);
        let mut overlapping = replacement();
        overlapping.scan_all([&full, &later, &full]);
        prop_assert_eq!(single.database(), overlapping.database());

        let mut single = live_cue();
        single.scan_snapshot(&full);
        let mut overlapping = live_cue();
        overlapping.scan_all([&full, &later, &full]);
        prop_assert_eq!(single.database(), overlapping.database());
    }

    #[test]
    fn closes_follow_stack_order(n in 1usize..30) {
        let mut db = SpanDatabase::new();
        for i in 0..n {
            let opened = db.open(Span::open(SpanKind::LiveCue, format!("open-{i}.ts"), t(i as i64)));
            prop_assert!(opened);
        }
        for i in 0..n {
            let closed = db.close_top("close.ts", t(1_000 + i as i64));
            prop_assert_eq!(closed, Some(t((n - 1 - i) as i64)));
        }
        prop_assert_eq!(db.open_count(), 0);
        prop_assert!(db.iter().all(|span| !span.is_open()));
    }

    #[test]
    fn every_start_with_an_end_becomes_one_ad(lengths in proptest::collection::vec(1u64..5, 1..6)) {
        let (snapshot, ranges) = paired_snapshot(&lengths);
        let mut matcher = CompletePairMatcher::new(Arc::new(Scte35Decoder::default()));
        let ads = matcher.find_complete_ads(&snapshot);

        prop_assert_eq!(ads.len(), lengths.len());
        for (ad, &(a, b)) in ads.iter().zip(&ranges) {
            prop_assert!(!ad.segments.is_empty());
            let sequences: Vec<u64> = ad.segments.iter().map(|s| s.media_sequence).collect();
            prop_assert_eq!(sequences, (a..b).collect::<Vec<_>>());
            prop_assert!(ad.segments.iter().all(|s| s.media_sequence != b));
        }
    }

    #[test]
    fn join_has_one_entry_per_source_span(
        source in proptest::collection::btree_set(0i64..200, 0..20),
        service in proptest::collection::btree_set(0i64..200, 0..20),
    ) {
        let timeline = correlate(
            &database_with_starts(SpanKind::LiveCue, &source),
            &database_with_starts(SpanKind::AdReplacement, &service),
        );

        prop_assert_eq!(timeline.len(), source.len());
        for (entry, start) in timeline.entries.iter().zip(&source) {
            prop_assert_eq!(entry.key, t(*start));
            prop_assert_eq!(entry.service.is_some(), service.contains(start));
        }
        prop_assert_eq!(
            timeline.unmatched_service.len(),
            service.difference(&source).count()
        );
    }
}
