use std::path::Path;

use adtrace_engine::AnalysisConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::Limits;
use crate::error::{AppError, Result};

/// Contents of the optional TOML configuration file.
///
/// ```toml
/// source_host = "origin.example.net"
/// service_host = "stream.example.io"
///
/// [analysis]
/// tolerance_ms = 100
/// source_convention = "cue-out"
///
/// [analysis.ad_replacement]
/// ad_uri_pattern = "bpkio-jitt"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source_host: Option<String>,
    pub service_host: Option<String>,
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text).map_err(|source| AppError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Command-line limits win over the file.
    pub fn apply_limits(&mut self, limits: &Limits) {
        if let Some(max_entries) = limits.max_entries {
            self.analysis.max_entries = max_entries;
        }
        if let Some(tolerance_ms) = limits.tolerance_ms {
            self.analysis.tolerance_ms = tolerance_ms;
        }
        if limits.verify_crc {
            self.analysis.verify_crc = true;
        }
    }
}
