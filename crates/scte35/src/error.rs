use thiserror::Error;

#[derive(Debug, Error)]
pub enum Scte35Error {
    #[error("insufficient data: expected at least {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("invalid table id: expected {expected:#04x}, got {actual:#04x}")]
    InvalidTableId { expected: u8, actual: u8 },

    #[error("malformed splice info section: {reason}")]
    Malformed { reason: String },

    #[error("CRC-32 mismatch: section carries {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },

    #[error("invalid marker payload encoding: {reason}")]
    InvalidPayload { reason: String },
}

impl Scte35Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub fn invalid_payload(reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            reason: reason.into(),
        }
    }
}

impl From<hex::FromHexError> for Scte35Error {
    fn from(err: hex::FromHexError) -> Self {
        Scte35Error::invalid_payload(format!("hex: {err}"))
    }
}

impl From<base64::DecodeError> for Scte35Error {
    fn from(err: base64::DecodeError) -> Self {
        Scte35Error::invalid_payload(format!("base64: {err}"))
    }
}
