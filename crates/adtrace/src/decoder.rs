use std::fmt;

use scte35::{Scte35Error, SpliceCommand, SpliceInfoSection};
use serde::Serialize;

/// Turns a raw marker payload into a splice_info_section.
pub trait MarkerDecoder: Send + Sync {
    fn decode(&self, payload: &str) -> Result<SpliceInfoSection, Scte35Error>;
}

impl<F> MarkerDecoder for F
where
    F: Fn(&str) -> Result<SpliceInfoSection, Scte35Error> + Send + Sync,
{
    fn decode(&self, payload: &str) -> Result<SpliceInfoSection, Scte35Error> {
        self(payload)
    }
}

/// Decoder for hex (`0xFC...`) and base64 SCTE-35 payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scte35Decoder {
    pub verify_crc: bool,
}

impl Scte35Decoder {
    pub fn new(verify_crc: bool) -> Self {
        Self { verify_crc }
    }
}

impl MarkerDecoder for Scte35Decoder {
    fn decode(&self, payload: &str) -> Result<SpliceInfoSection, Scte35Error> {
        if self.verify_crc {
            SpliceInfoSection::from_text_verified(payload)
        } else {
            SpliceInfoSection::from_text(payload)
        }
    }
}

/// The parts of a decoded opening marker worth keeping on a span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerSummary {
    pub command: String,
    pub event_id: Option<u32>,
    /// Declared break duration in seconds
    pub duration: Option<f64>,
    pub segmentation_types: Vec<u8>,
    pub pts: Option<u64>,
}

impl MarkerSummary {
    pub fn from_section(section: &SpliceInfoSection) -> Self {
        let first_segmentation = section.segmentation_descriptors().next();
        let (event_id, duration) = match &section.splice_command {
            SpliceCommand::SpliceInsert(insert) => (
                Some(insert.splice_event_id),
                insert.duration.map(|d| d.as_secs()),
            ),
            _ => (
                first_segmentation.map(|s| s.segmentation_event_id),
                first_segmentation.and_then(|s| s.duration_secs()),
            ),
        };
        Self {
            command: section.splice_command_type.name().to_string(),
            event_id,
            duration,
            segmentation_types: section
                .segmentation_descriptors()
                .map(|s| s.segmentation_type_id)
                .collect(),
            pts: section.adjusted_pts(),
        }
    }
}

impl fmt::Display for MarkerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        if let Some(id) = self.event_id {
            write!(f, " #{id}")?;
        }
        if let Some(duration) = self.duration {
            write!(f, " {duration:.1}s")?;
        }
        for t in &self.segmentation_types {
            write!(f, " seg:{t:#04x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scte35::test_support::{SectionBuilder, SegmentationBuilder};

    #[test]
    fn summarizes_splice_insert() {
        let payload = SectionBuilder::splice_insert(42, true, Some(2_700_000)).to_base64();
        let section = Scte35Decoder::default().decode(&payload).unwrap();
        let summary = MarkerSummary::from_section(&section);
        assert_eq!(summary.command, "splice_insert");
        assert_eq!(summary.event_id, Some(42));
        assert_eq!(summary.duration, Some(30.0));
        assert_eq!(summary.to_string(), "splice_insert #42 30.0s");
    }

    #[test]
    fn summarizes_time_signal_by_descriptor() {
        let payload = SectionBuilder::time_signal(Some(90_000))
            .descriptor(
                SegmentationBuilder::new(0x34, 9)
                    .duration_ticks(900_000)
                    .descriptor_bytes(),
            )
            .to_hex();
        let section = Scte35Decoder::default().decode(&payload).unwrap();
        let summary = MarkerSummary::from_section(&section);
        assert_eq!(summary.event_id, Some(9));
        assert_eq!(summary.duration, Some(10.0));
        assert_eq!(summary.segmentation_types, vec![0x34]);
        assert_eq!(summary.pts, Some(90_000));
    }

    #[test]
    fn crc_verification_is_opt_in() {
        let mut bytes = SectionBuilder::splice_null().build();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let payload = format!("0x{}", hex::encode_upper(&bytes));
        assert!(Scte35Decoder::new(false).decode(&payload).is_ok());
        assert!(matches!(
            Scte35Decoder::new(true).decode(&payload),
            Err(Scte35Error::CrcMismatch { .. })
        ));
    }

    #[test]
    fn closures_are_decoders() {
        let decoder = |_: &str| -> Result<SpliceInfoSection, Scte35Error> {
            Err(Scte35Error::invalid_payload("always fails"))
        };
        assert!(decoder.decode("anything").is_err());
    }
}
