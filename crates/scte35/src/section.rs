use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use tracing::trace;

use crate::command::{SpliceCommand, SpliceCommandType, read_33_bits};
use crate::crc::crc32_mpeg2;
use crate::descriptor::{
    SegmentationDescriptor, SegmentationType, SpliceDescriptor, SpliceDescriptorIterator,
};
use crate::{Result, Scte35Error};

/// SCTE-35 table ID
pub const SCTE35_TABLE_ID: u8 = 0xFC;

/// Fixed header up to and including `splice_command_type`.
const HEADER_LEN: usize = 14;
const CRC_LEN: usize = 4;
/// `splice_command_length` value meaning "parse the command to find its end".
const UNKNOWN_COMMAND_LENGTH: usize = 0xFFF;
const PTS_MASK: u64 = 0x1_FFFF_FFFF;

/// Top-level SCTE-35 splice info section.
#[derive(Debug, Clone, PartialEq)]
pub struct SpliceInfoSection {
    pub table_id: u8,
    pub protocol_version: u8,
    pub encrypted_packet: bool,
    pub encryption_algorithm: u8,
    pub pts_adjustment: u64,
    pub cw_index: u8,
    pub tier: u16,
    pub splice_command_type: SpliceCommandType,
    pub splice_command: SpliceCommand,
    pub descriptors: Vec<SpliceDescriptor>,
    pub crc_32: u32,
}

impl SpliceInfoSection {
    /// Parse a section without checking its CRC.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN + CRC_LEN {
            return Err(Scte35Error::InsufficientData {
                expected: HEADER_LEN + CRC_LEN,
                actual: data.len(),
            });
        }

        let table_id = data[0];
        if table_id != SCTE35_TABLE_ID {
            return Err(Scte35Error::InvalidTableId {
                expected: SCTE35_TABLE_ID,
                actual: table_id,
            });
        }

        let section_length = (((data[1] & 0x0F) as usize) << 8) | data[2] as usize;
        let total = 3 + section_length;
        if data.len() < total {
            return Err(Scte35Error::InsufficientData {
                expected: total,
                actual: data.len(),
            });
        }
        if total < HEADER_LEN + CRC_LEN {
            return Err(Scte35Error::malformed(format!(
                "section_length {section_length} shorter than the fixed header"
            )));
        }
        // anything after the declared section is transport padding
        let data = &data[..total];
        let crc_start = total - CRC_LEN;

        let protocol_version = data[3];
        let encrypted_packet = (data[4] & 0x80) != 0;
        let encryption_algorithm = (data[4] >> 1) & 0x3F;
        let pts_adjustment = read_33_bits(&data[4..9]);
        let cw_index = data[9];
        let tier = ((data[10] as u16) << 4) | ((data[11] as u16) >> 4);
        let command_length = (((data[11] & 0x0F) as usize) << 8) | data[12] as usize;
        let splice_command_type = SpliceCommandType::from(data[13]);
        let crc_32 = u32::from_be_bytes([
            data[crc_start],
            data[crc_start + 1],
            data[crc_start + 2],
            data[crc_start + 3],
        ]);

        if encrypted_packet {
            // Command and descriptors are opaque without the control word.
            return Ok(SpliceInfoSection {
                table_id,
                protocol_version,
                encrypted_packet,
                encryption_algorithm,
                pts_adjustment,
                cw_index,
                tier,
                splice_command_type,
                splice_command: SpliceCommand::Other(Bytes::copy_from_slice(
                    &data[HEADER_LEN..crc_start],
                )),
                descriptors: Vec::new(),
                crc_32,
            });
        }

        let body = &data[HEADER_LEN..crc_start];
        let command_data = if command_length == UNKNOWN_COMMAND_LENGTH {
            body
        } else {
            body.get(..command_length).ok_or(Scte35Error::InsufficientData {
                expected: HEADER_LEN + command_length + CRC_LEN,
                actual: total,
            })?
        };
        let (splice_command, consumed) = SpliceCommand::parse(splice_command_type, command_data)?;
        let command_end = if command_length == UNKNOWN_COMMAND_LENGTH {
            consumed
        } else {
            command_length
        };

        let rest = &body[command_end..];
        let descriptors = if rest.len() >= 2 {
            let loop_length = u16::from_be_bytes([rest[0], rest[1]]) as usize;
            let loop_data = rest.get(2..2 + loop_length).ok_or_else(|| {
                Scte35Error::malformed(format!(
                    "descriptor_loop_length {loop_length} exceeds section"
                ))
            })?;
            SpliceDescriptorIterator::new(Bytes::copy_from_slice(loop_data))
                .map(SpliceDescriptor::decode)
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        trace!(
            command = splice_command_type.name(),
            descriptors = descriptors.len(),
            "parsed splice_info_section"
        );

        Ok(SpliceInfoSection {
            table_id,
            protocol_version,
            encrypted_packet,
            encryption_algorithm,
            pts_adjustment,
            cw_index,
            tier,
            splice_command_type,
            splice_command,
            descriptors,
            crc_32,
        })
    }

    /// Parse a section and reject it when the stored CRC-32 does not match.
    pub fn parse_verified(data: &[u8]) -> Result<Self> {
        let section = Self::parse(data)?;
        let total = 3 + ((((data[1] & 0x0F) as usize) << 8) | data[2] as usize);
        let computed = crc32_mpeg2(&data[..total - CRC_LEN]);
        if computed != section.crc_32 {
            return Err(Scte35Error::CrcMismatch {
                stored: section.crc_32,
                computed,
            });
        }
        Ok(section)
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        Self::parse(&hex::decode(strip_hex_prefix(text.trim()))?)
    }

    pub fn from_base64(text: &str) -> Result<Self> {
        Self::parse(&STANDARD.decode(text.trim())?)
    }

    /// Decode a manifest marker payload, hex (`0xFC30...`) or base64 (`/DA...`).
    pub fn from_text(text: &str) -> Result<Self> {
        Self::parse(&payload_bytes(text)?)
    }

    /// Like [`from_text`](Self::from_text) but also checks the CRC-32.
    pub fn from_text_verified(text: &str) -> Result<Self> {
        Self::parse_verified(&payload_bytes(text)?)
    }

    pub fn segmentation_descriptors(&self) -> impl Iterator<Item = &SegmentationDescriptor> {
        self.descriptors
            .iter()
            .filter_map(SpliceDescriptor::as_segmentation)
    }

    /// First segmentation descriptor of the given type.
    pub fn find_segmentation(&self, kind: SegmentationType) -> Option<&SegmentationDescriptor> {
        self.segmentation_descriptors()
            .find(|seg| seg.segmentation_type == kind)
    }

    /// Command splice time with `pts_adjustment` applied, wrapped to 33 bits.
    pub fn adjusted_pts(&self) -> Option<u64> {
        self.splice_command
            .pts_time()
            .map(|pts| (pts + self.pts_adjustment) & PTS_MASK)
    }
}

fn strip_hex_prefix(text: &str) -> &str {
    text.strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text)
}

/// Raw section bytes from a textual payload.
///
/// A `0x` prefix, or a string made only of hex digits, is read as hex;
/// anything else as standard base64.
pub fn payload_bytes(text: &str) -> Result<Vec<u8>> {
    let text = text.trim().trim_matches('"');
    if text.is_empty() {
        return Err(Scte35Error::invalid_payload("empty payload"));
    }
    let stripped = strip_hex_prefix(text);
    if stripped.len() != text.len()
        || (text.len() % 2 == 0 && text.bytes().all(|b| b.is_ascii_hexdigit()))
    {
        return Ok(hex::decode(stripped)?);
    }
    Ok(STANDARD.decode(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::TimeSignal;
    use crate::test_support::{SectionBuilder, SegmentationBuilder};

    #[test]
    fn time_signal_with_descriptors() {
        let bytes = SectionBuilder::time_signal(Some(900_000))
            .descriptor(
                SegmentationBuilder::new(0x30, 77)
                    .segment_num(1, 2)
                    .descriptor_bytes(),
            )
            .descriptor(SegmentationBuilder::new(0x02, 78).descriptor_bytes())
            .build();

        let section = SpliceInfoSection::parse_verified(&bytes).unwrap();
        assert_eq!(section.splice_command_type, SpliceCommandType::TimeSignal);
        assert_eq!(
            section.splice_command,
            SpliceCommand::TimeSignal(TimeSignal {
                splice_time: Some(900_000)
            })
        );
        assert_eq!(section.descriptors.len(), 2);
        let start = section
            .find_segmentation(SegmentationType::ProviderAdvertisementStart)
            .unwrap();
        assert_eq!(start.segmentation_event_id, 77);
        assert!(section.find_segmentation(SegmentationType::CallAdServer).is_some());
        assert!(section.find_segmentation(SegmentationType::BreakStart).is_none());
    }

    #[test]
    fn corrupt_crc_fails_only_verified_parse() {
        let mut bytes = SectionBuilder::splice_null().build();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(SpliceInfoSection::parse(&bytes).is_ok());
        assert!(matches!(
            SpliceInfoSection::parse_verified(&bytes),
            Err(Scte35Error::CrcMismatch { .. })
        ));
    }

    #[test]
    fn wrong_table_id() {
        let mut bytes = SectionBuilder::splice_null().build();
        bytes[0] = 0xFD;
        assert!(matches!(
            SpliceInfoSection::parse(&bytes),
            Err(Scte35Error::InvalidTableId { actual: 0xFD, .. })
        ));
    }

    #[test]
    fn truncated_section_reports_lengths() {
        let bytes = SectionBuilder::splice_null().build();
        let err = SpliceInfoSection::parse(&bytes[..bytes.len() - 2]).unwrap_err();
        assert!(matches!(err, Scte35Error::InsufficientData { .. }));
    }

    #[test]
    fn unknown_command_length_uses_parsed_extent() {
        let bytes = SectionBuilder::splice_insert(5, true, Some(2_700_000))
            .unknown_command_length()
            .descriptor(SegmentationBuilder::new(0x22, 9).descriptor_bytes())
            .build();
        let section = SpliceInfoSection::parse(&bytes).unwrap();
        let SpliceCommand::SpliceInsert(insert) = &section.splice_command else {
            panic!("expected splice_insert");
        };
        assert_eq!(insert.duration.unwrap().as_secs(), 30.0);
        assert_eq!(section.descriptors.len(), 1);
    }

    #[test]
    fn text_forms_decode_to_the_same_section() {
        let builder = SectionBuilder::time_signal(Some(12_345))
            .descriptor(SegmentationBuilder::new(0x31, 3).descriptor_bytes());
        let from_hex = SpliceInfoSection::from_text(&builder.to_hex()).unwrap();
        let from_b64 = SpliceInfoSection::from_text(&builder.to_base64()).unwrap();
        let bare_hex = SpliceInfoSection::from_hex(&hex::encode_upper(builder.build())).unwrap();
        assert_eq!(from_hex, from_b64);
        assert_eq!(from_hex, bare_hex);
    }

    #[test]
    fn garbage_payload_is_invalid() {
        assert!(matches!(
            payload_bytes("0xZZ"),
            Err(Scte35Error::InvalidPayload { .. })
        ));
        assert!(matches!(
            payload_bytes("   "),
            Err(Scte35Error::InvalidPayload { .. })
        ));
        assert!(SpliceInfoSection::from_text("not*base64").is_err());
    }

    #[test]
    fn pts_adjustment_wraps() {
        let bytes = SectionBuilder::time_signal(Some(PTS_MASK))
            .pts_adjustment(2)
            .build();
        let section = SpliceInfoSection::parse(&bytes).unwrap();
        assert_eq!(section.adjusted_pts(), Some(1));
    }
}
