use scte35::Scte35Error;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdTraceError {
    #[error("segment {uri} has no program date time")]
    MissingProgramDateTime { uri: String },

    #[error("marker decode failed: {0}")]
    MarkerDecode(#[from] Scte35Error),

    #[error("playlist error: {reason}")]
    Playlist { reason: String },

    #[error("invalid uri pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl AdTraceError {
    pub fn missing_pdt(uri: impl Into<String>) -> Self {
        Self::MissingProgramDateTime { uri: uri.into() }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::Playlist {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Data errors are recovered inside a scan; everything else is the caller's problem.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::MissingProgramDateTime { .. } | Self::MarkerDecode(_)
        )
    }
}
