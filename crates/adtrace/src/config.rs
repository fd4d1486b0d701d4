use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::policy::UriPatternPolicy;
use crate::resolver::SignalingConvention;
use crate::{AdTraceError, Result};

/// Upper bound on snapshots scanned per stream.
pub const DEFAULT_MAX_ENTRIES: usize = 20_000;

/// Boundary deltas strictly below this are within tolerance.
pub const DEFAULT_TOLERANCE_MS: u64 = 100;

pub const DEFAULT_AD_URI_PATTERN: &str = "bpkio-jitt";
pub const DEFAULT_SLATE_URI_PATTERN: &str = "slate";

/// Uri heuristics for the ad-replacement channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdReplacementConfig {
    /// Regex a discontinuity segment uri must match to count as ad content
    pub ad_uri_pattern: String,

    /// Regex marking filler/slate content among ad segments
    pub slate_uri_pattern: String,
}

impl Default for AdReplacementConfig {
    fn default() -> Self {
        Self {
            ad_uri_pattern: DEFAULT_AD_URI_PATTERN.to_string(),
            slate_uri_pattern: DEFAULT_SLATE_URI_PATTERN.to_string(),
        }
    }
}

/// Options for one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Maximum number of snapshots scanned per stream
    pub max_entries: usize,

    /// Conformance tolerance in milliseconds
    pub tolerance_ms: u64,

    /// Reject marker payloads whose CRC-32 does not match
    pub verify_crc: bool,

    /// How the source stream signals ad opportunities
    pub source_convention: SignalingConvention,

    /// How the service stream signals ad opportunities
    pub service_convention: SignalingConvention,

    pub ad_replacement: AdReplacementConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            tolerance_ms: DEFAULT_TOLERANCE_MS,
            verify_crc: false,
            source_convention: SignalingConvention::CueOut,
            service_convention: SignalingConvention::AdReplacement,
            ad_replacement: AdReplacementConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn tolerance(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.tolerance_ms as i64)
    }

    /// Check bounds and compile the uri patterns.
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(AdTraceError::configuration("max_entries must be at least 1"));
        }
        if self.tolerance_ms == 0 {
            return Err(AdTraceError::configuration("tolerance_ms must be positive"));
        }
        UriPatternPolicy::from_config(&self.ad_replacement)?;
        Ok(())
    }
}
