use tracing::debug;

use super::SegmentRule;
use crate::model::Segment;
use crate::policy::AdContentPolicy;
use crate::span::{Span, SpanDatabase, SpanKind};

/// Discontinuities into ad content open (or extend) a span; a discontinuity
/// back to anything else closes it.
pub struct AdReplacementRule {
    policy: Box<dyn AdContentPolicy>,
}

impl AdReplacementRule {
    pub fn new(policy: Box<dyn AdContentPolicy>) -> Self {
        Self { policy }
    }
}

impl SegmentRule for AdReplacementRule {
    fn on_segment(
        &mut self,
        db: &mut SpanDatabase,
        segment: &Segment,
        previous: Option<&Segment>,
    ) -> bool {
        if !segment.discontinuity {
            return false;
        }
        let Some(pdt) = segment.program_date_time else {
            return false;
        };

        if !self.policy.is_ad_content(&segment.uri) {
            db.close_top(&segment.uri, pdt);
            return false;
        }

        if let Some(open) = db.top_open_mut() {
            let tag = self.policy.classify(&segment.uri);
            open.push_tag(tag);
            debug!(uri = %segment.uri, tag = %tag.code(), "ad replacement continues");
            return false;
        }

        db.open(
            Span::open(SpanKind::AdReplacement, &segment.uri, pdt)
                .after(previous.map(|p| p.uri.clone())),
        )
    }
}
