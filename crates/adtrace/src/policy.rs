use regex::Regex;

use crate::config::AdReplacementConfig;
use crate::span::SpanTag;
use crate::{AdTraceError, Result};

/// Decides which discontinuity segments are inserted ad content.
pub trait AdContentPolicy: Send + Sync {
    fn is_ad_content(&self, uri: &str) -> bool;

    /// Sub-classification of an ad segment that continues an open span.
    fn classify(&self, uri: &str) -> SpanTag;
}

/// Regex match against the segment uri.
#[derive(Debug, Clone)]
pub struct UriPatternPolicy {
    ad: Regex,
    slate: Regex,
}

impl UriPatternPolicy {
    pub fn new(ad_pattern: &str, slate_pattern: &str) -> Result<Self> {
        Ok(Self {
            ad: compile(ad_pattern)?,
            slate: compile(slate_pattern)?,
        })
    }

    pub fn from_config(config: &AdReplacementConfig) -> Result<Self> {
        Self::new(&config.ad_uri_pattern, &config.slate_uri_pattern)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| AdTraceError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

impl AdContentPolicy for UriPatternPolicy {
    fn is_ad_content(&self, uri: &str) -> bool {
        self.ad.is_match(uri)
    }

    fn classify(&self, uri: &str) -> SpanTag {
        if self.slate.is_match(uri) {
            SpanTag::Slate
        } else {
            SpanTag::Ad
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_patterns() {
        let policy = UriPatternPolicy::from_config(&AdReplacementConfig::default()).unwrap();
        assert!(policy.is_ad_content("https://cdn/bpkio-jitt/ad1/seg_0001.ts?x=1"));
        assert!(!policy.is_ad_content("https://cdn/live/seg_0001.ts"));
        assert_eq!(policy.classify("bpkio-jitt/slate/seg.ts"), SpanTag::Slate);
        assert_eq!(policy.classify("bpkio-jitt/creative/seg.ts"), SpanTag::Ad);
    }

    #[test]
    fn invalid_pattern_names_itself() {
        let err = UriPatternPolicy::new("[", "slate").unwrap_err();
        assert!(err.to_string().contains("'['"));
    }
}
