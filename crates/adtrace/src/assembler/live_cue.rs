use std::sync::Arc;

use tracing::{debug, warn};

use super::SegmentRule;
use crate::decoder::{MarkerDecoder, MarkerSummary};
use crate::model::{CueTag, Segment};
use crate::span::{Span, SpanDatabase, SpanKind, SpanTag};

/// `EXT-X-CUE-OUT` opens, `EXT-X-CUE-IN` closes.
pub struct LiveCueRule {
    decoder: Arc<dyn MarkerDecoder>,
}

impl LiveCueRule {
    pub fn new(decoder: Arc<dyn MarkerDecoder>) -> Self {
        Self { decoder }
    }

    fn summarize(&self, db: &mut SpanDatabase, segment: &Segment) -> Option<MarkerSummary> {
        let payload = segment.first_payload()?;
        match self.decoder.decode(payload) {
            Ok(section) => Some(MarkerSummary::from_section(&section)),
            Err(e) => {
                warn!(uri = %segment.uri, "undecodable cue marker: {e}");
                db.diagnostics_mut().decode_failures += 1;
                None
            }
        }
    }
}

impl SegmentRule for LiveCueRule {
    fn on_segment(
        &mut self,
        db: &mut SpanDatabase,
        segment: &Segment,
        previous: Option<&Segment>,
    ) -> bool {
        let Some(pdt) = segment.program_date_time else {
            return false;
        };

        match segment.cue {
            Some(CueTag::Out { .. }) => {
                if db.contains(pdt) {
                    debug!(uri = %segment.uri, "cue-out already recorded");
                    db.diagnostics_mut().duplicate_opens += 1;
                    return false;
                }
                if let Some(open) = db.top_open_mut() {
                    open.push_tag(SpanTag::Cue);
                    debug!(uri = %segment.uri, "cue-out folded into open span");
                    db.diagnostics_mut().folded_opens += 1;
                    return false;
                }
                let marker = self.summarize(db, segment);
                db.open(
                    Span::open(SpanKind::LiveCue, &segment.uri, pdt)
                        .after(previous.map(|p| p.uri.clone()))
                        .with_payload(segment.first_payload().map(str::to_string))
                        .with_marker(marker),
                )
            }
            Some(CueTag::In) => {
                db.close_top(&segment.uri, pdt);
                false
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::LiveCueAssembler;
    use crate::assembler::test_helpers::{snapshot, t, window};
    use crate::decoder::Scte35Decoder;
    use crate::model::Marker;
    use scte35::test_support::SectionBuilder;

    fn assembler() -> LiveCueAssembler {
        LiveCueAssembler::new(LiveCueRule::new(Arc::new(Scte35Decoder::default())))
    }

    fn cue_window() -> Vec<crate::model::Segment> {
        let payload = SectionBuilder::splice_insert(11, true, Some(2_700_000)).to_base64();
        let mut segments = window(0.0, 1, &["m1.ts", "m2.ts", "m3.ts", "m4.ts", "m5.ts"]);
        segments[1].cue = Some(CueTag::Out { duration: Some(30.0) });
        segments[1].markers.push(Marker::new(payload));
        segments[3].cue = Some(CueTag::In);
        segments
    }

    #[test]
    fn opens_after_previous_segment_and_closes_on_cue_in() {
        let mut asm = assembler();
        assert_eq!(asm.scan_snapshot(&snapshot(10.0, cue_window())), 1);

        let db = asm.database();
        let span = db.get(t(2.0)).unwrap();
        assert_eq!(span.after_segment_uri(), Some("m1.ts"));
        assert_eq!(span.from_segment_uri(), "m2.ts");
        assert_eq!(span.to_segment_uri(), Some("m4.ts"));
        assert_eq!(span.to_pdt(), Some(t(6.0)));
        assert_eq!(span.marker().unwrap().event_id, Some(11));
        assert!(span.payload().is_some());
        assert_eq!(db.open_count(), 0);
    }

    #[test]
    fn cue_out_on_first_segment_has_no_predecessor() {
        let mut segments = window(0.0, 1, &["m1.ts", "m2.ts"]);
        segments[0].cue = Some(CueTag::Out { duration: None });
        let mut asm = assembler();
        asm.scan_snapshot(&snapshot(4.0, segments));
        assert_eq!(asm.database().get(t(0.0)).unwrap().after_segment_uri(), None);
    }

    #[test]
    fn second_cue_out_folds_into_open_span() {
        let mut segments = window(0.0, 1, &["m1.ts", "m2.ts", "m3.ts"]);
        segments[0].cue = Some(CueTag::Out { duration: None });
        segments[1].cue = Some(CueTag::Out { duration: None });
        let mut asm = assembler();
        asm.scan_snapshot(&snapshot(6.0, segments));

        let db = asm.database();
        assert_eq!(db.len(), 1);
        assert_eq!(db.open_count(), 1);
        assert_eq!(db.top_open().unwrap().tags(), &[SpanTag::Cue]);
        assert_eq!(db.diagnostics().folded_opens, 1);
    }

    #[test]
    fn undecodable_marker_still_opens() {
        let mut segments = window(0.0, 1, &["m1.ts", "m2.ts"]);
        segments[1].cue = Some(CueTag::Out { duration: None });
        segments[1].markers.push(Marker::new("%%%"));
        let mut asm = assembler();
        assert_eq!(asm.scan_snapshot(&snapshot(4.0, segments)), 1);

        let span = asm.database().get(t(2.0)).unwrap();
        assert!(span.marker().is_none());
        assert_eq!(span.payload(), Some("%%%"));
        assert_eq!(asm.database().diagnostics().decode_failures, 1);
    }

    #[test]
    fn capture_starting_mid_break_ignores_cue_in() {
        let mut segments = window(0.0, 1, &["m1.ts", "m2.ts"]);
        segments[0].cue = Some(CueTag::In);
        let mut asm = assembler();
        asm.scan_snapshot(&snapshot(4.0, segments));
        assert!(asm.database().is_empty());
        assert_eq!(asm.database().diagnostics().orphan_closes, 1);
    }

    #[test]
    fn replayed_windows_change_nothing() {
        let mut once = assembler();
        once.scan_snapshot(&snapshot(10.0, cue_window()));

        let mut twice = assembler();
        twice.scan_snapshot(&snapshot(10.0, cue_window()));
        twice.scan_snapshot(&snapshot(12.0, cue_window()));

        assert_eq!(once.database(), twice.database());
        assert_eq!(twice.database().diagnostics().skipped_segments, 5);
    }
}
