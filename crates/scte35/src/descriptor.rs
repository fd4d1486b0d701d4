use bytes::{Buf, Bytes};
use tracing::trace;

use crate::upid::{Upid, UpidType};
use crate::{Result, Scte35Error};

/// `CUEI` registered identifier carried by every standard splice descriptor.
pub const CUEI_IDENTIFIER: u32 = u32::from_be_bytes(*b"CUEI");

/// Avail descriptor (tag 0x00)
pub const TAG_AVAIL: u8 = 0x00;
/// DTMF descriptor (tag 0x01)
pub const TAG_DTMF: u8 = 0x01;
/// Segmentation descriptor (tag 0x02)
pub const TAG_SEGMENTATION: u8 = 0x02;
/// Time descriptor (tag 0x03)
pub const TAG_TIME: u8 = 0x03;

/// Raw splice descriptor as found in the descriptor loop.
///
/// Layout is `[tag: u8][length: u8][identifier: u32][data: length - 4 bytes]`.
#[derive(Debug, Clone)]
pub struct RawSpliceDescriptor {
    pub tag: u8,
    pub identifier: u32,
    pub data: Bytes,
}

/// Iterator over the splice descriptor loop of a section.
#[derive(Debug, Clone)]
pub struct SpliceDescriptorIterator {
    data: Bytes,
}

impl SpliceDescriptorIterator {
    pub fn new(data: Bytes) -> Self {
        SpliceDescriptorIterator { data }
    }
}

impl Iterator for SpliceDescriptorIterator {
    type Item = RawSpliceDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.remaining() < 2 {
            return None;
        }
        let tag = self.data[0];
        let length = self.data[1] as usize;
        self.data.advance(2);

        if length < 4 || self.data.remaining() < length {
            // Malformed descriptor: drop the rest of the loop
            trace!(tag, length, "truncated splice descriptor");
            self.data.advance(self.data.remaining());
            return None;
        }

        let mut body = self.data.split_to(length);
        let identifier = body.get_u32();
        Some(RawSpliceDescriptor {
            tag,
            identifier,
            data: body,
        })
    }
}

/// Decoded splice descriptor
#[derive(Debug, Clone, PartialEq)]
pub enum SpliceDescriptor {
    Avail { provider_avail_id: u32 },
    Segmentation(SegmentationDescriptor),
    Other { tag: u8, identifier: u32, data: Bytes },
}

impl SpliceDescriptor {
    pub(crate) fn decode(raw: RawSpliceDescriptor) -> Result<Self> {
        if raw.identifier != CUEI_IDENTIFIER {
            return Ok(SpliceDescriptor::Other {
                tag: raw.tag,
                identifier: raw.identifier,
                data: raw.data,
            });
        }
        match raw.tag {
            TAG_AVAIL => {
                if raw.data.len() < 4 {
                    return Err(Scte35Error::malformed("avail_descriptor too short"));
                }
                let d = &raw.data;
                Ok(SpliceDescriptor::Avail {
                    provider_avail_id: u32::from_be_bytes([d[0], d[1], d[2], d[3]]),
                })
            }
            TAG_SEGMENTATION => Ok(SpliceDescriptor::Segmentation(
                SegmentationDescriptor::parse(&raw.data)?,
            )),
            tag => Ok(SpliceDescriptor::Other {
                tag,
                identifier: raw.identifier,
                data: raw.data,
            }),
        }
    }

    pub fn as_segmentation(&self) -> Option<&SegmentationDescriptor> {
        match self {
            SpliceDescriptor::Segmentation(seg) => Some(seg),
            _ => None,
        }
    }
}

/// segmentation_type_id values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentationType {
    NotIndicated,
    ContentIdentification,
    CallAdServer,
    ProgramStart,
    ProgramEnd,
    ProgramEarlyTermination,
    ProgramBreakaway,
    ProgramResumption,
    ChapterStart,
    ChapterEnd,
    BreakStart,
    BreakEnd,
    ProviderAdvertisementStart,
    ProviderAdvertisementEnd,
    DistributorAdvertisementStart,
    DistributorAdvertisementEnd,
    ProviderPlacementOpportunityStart,
    ProviderPlacementOpportunityEnd,
    DistributorPlacementOpportunityStart,
    DistributorPlacementOpportunityEnd,
    ProviderOverlayPlacementOpportunityStart,
    ProviderOverlayPlacementOpportunityEnd,
    DistributorOverlayPlacementOpportunityStart,
    DistributorOverlayPlacementOpportunityEnd,
    ProviderPromoStart,
    ProviderPromoEnd,
    DistributorPromoStart,
    DistributorPromoEnd,
    UnscheduledEventStart,
    UnscheduledEventEnd,
    ProviderAdBlockStart,
    ProviderAdBlockEnd,
    DistributorAdBlockStart,
    DistributorAdBlockEnd,
    NetworkStart,
    NetworkEnd,
    Other(u8),
}

impl From<u8> for SegmentationType {
    fn from(value: u8) -> Self {
        use SegmentationType::*;
        match value {
            0x00 => NotIndicated,
            0x01 => ContentIdentification,
            0x02 => CallAdServer,
            0x10 => ProgramStart,
            0x11 => ProgramEnd,
            0x12 => ProgramEarlyTermination,
            0x13 => ProgramBreakaway,
            0x14 => ProgramResumption,
            0x20 => ChapterStart,
            0x21 => ChapterEnd,
            0x22 => BreakStart,
            0x23 => BreakEnd,
            0x30 => ProviderAdvertisementStart,
            0x31 => ProviderAdvertisementEnd,
            0x32 => DistributorAdvertisementStart,
            0x33 => DistributorAdvertisementEnd,
            0x34 => ProviderPlacementOpportunityStart,
            0x35 => ProviderPlacementOpportunityEnd,
            0x36 => DistributorPlacementOpportunityStart,
            0x37 => DistributorPlacementOpportunityEnd,
            0x38 => ProviderOverlayPlacementOpportunityStart,
            0x39 => ProviderOverlayPlacementOpportunityEnd,
            0x3A => DistributorOverlayPlacementOpportunityStart,
            0x3B => DistributorOverlayPlacementOpportunityEnd,
            0x3C => ProviderPromoStart,
            0x3D => ProviderPromoEnd,
            0x3E => DistributorPromoStart,
            0x3F => DistributorPromoEnd,
            0x40 => UnscheduledEventStart,
            0x41 => UnscheduledEventEnd,
            0x44 => ProviderAdBlockStart,
            0x45 => ProviderAdBlockEnd,
            0x46 => DistributorAdBlockStart,
            0x47 => DistributorAdBlockEnd,
            0x50 => NetworkStart,
            0x51 => NetworkEnd,
            v => Other(v),
        }
    }
}

impl SegmentationType {
    /// Placement opportunity starts carry sub-segment fields.
    fn has_sub_segments(&self) -> bool {
        matches!(
            self,
            SegmentationType::ProviderPlacementOpportunityStart
                | SegmentationType::DistributorPlacementOpportunityStart
                | SegmentationType::ProviderOverlayPlacementOpportunityStart
                | SegmentationType::DistributorOverlayPlacementOpportunityStart
        )
    }
}

/// Per-component PTS offset in component segmentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentationComponent {
    pub component_tag: u8,
    pub pts_offset: u64,
}

/// SCTE-35 segmentation descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationDescriptor {
    pub segmentation_event_id: u32,
    pub segmentation_event_cancel_indicator: bool,
    pub program_segmentation_flag: bool,
    pub delivery_not_restricted: bool,
    pub components: Vec<SegmentationComponent>,
    /// Duration in 90kHz ticks (40-bit)
    pub segmentation_duration: Option<u64>,
    pub upid: Upid,
    pub segmentation_type: SegmentationType,
    /// Raw segmentation_type_id, kept for reporting
    pub segmentation_type_id: u8,
    pub segment_num: u8,
    pub segments_expected: u8,
    pub sub_segment_num: Option<u8>,
    pub sub_segments_expected: Option<u8>,
}

impl SegmentationDescriptor {
    /// Parse a segmentation descriptor body (after the `CUEI` identifier).
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(Scte35Error::malformed("segmentation_descriptor too short"));
        }
        let segmentation_event_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let cancelled = (data[4] & 0x80) != 0;

        if cancelled {
            return Ok(SegmentationDescriptor {
                segmentation_event_id,
                segmentation_event_cancel_indicator: true,
                program_segmentation_flag: false,
                delivery_not_restricted: false,
                components: Vec::new(),
                segmentation_duration: None,
                upid: Upid::NotUsed,
                segmentation_type: SegmentationType::NotIndicated,
                segmentation_type_id: 0,
                segment_num: 0,
                segments_expected: 0,
                sub_segment_num: None,
                sub_segments_expected: None,
            });
        }

        let flags = *data
            .get(5)
            .ok_or_else(|| Scte35Error::malformed("segmentation_descriptor missing flags"))?;
        let program_segmentation_flag = (flags & 0x80) != 0;
        let duration_flag = (flags & 0x40) != 0;
        let delivery_not_restricted = (flags & 0x20) != 0;

        let mut offset = 6;
        let mut components = Vec::new();
        if !program_segmentation_flag {
            let count = *data
                .get(offset)
                .ok_or_else(|| Scte35Error::malformed("missing component_count"))?;
            offset += 1;
            for _ in 0..count {
                let c = data
                    .get(offset..offset + 6)
                    .ok_or_else(|| Scte35Error::malformed("segmentation component truncated"))?;
                components.push(SegmentationComponent {
                    component_tag: c[0],
                    pts_offset: crate::command::read_33_bits(&c[1..]),
                });
                offset += 6;
            }
        }

        let segmentation_duration = if duration_flag {
            let d = data
                .get(offset..offset + 5)
                .ok_or_else(|| Scte35Error::malformed("segmentation_duration truncated"))?;
            offset += 5;
            Some(
                ((d[0] as u64) << 32)
                    | ((d[1] as u64) << 24)
                    | ((d[2] as u64) << 16)
                    | ((d[3] as u64) << 8)
                    | (d[4] as u64),
            )
        } else {
            None
        };

        let header = data
            .get(offset..offset + 2)
            .ok_or_else(|| Scte35Error::malformed("segmentation_upid header truncated"))?;
        let upid_type = UpidType::from(header[0]);
        let upid_len = header[1] as usize;
        offset += 2;
        let upid_data = data
            .get(offset..offset + upid_len)
            .ok_or_else(|| Scte35Error::malformed("segmentation_upid truncated"))?;
        let upid = Upid::parse(upid_type, upid_data)?;
        offset += upid_len;

        let tail = data
            .get(offset..offset + 3)
            .ok_or_else(|| Scte35Error::malformed("segmentation_type_id truncated"))?;
        let segmentation_type_id = tail[0];
        let segmentation_type = SegmentationType::from(segmentation_type_id);
        let segment_num = tail[1];
        let segments_expected = tail[2];
        offset += 3;

        let (sub_segment_num, sub_segments_expected) = if segmentation_type.has_sub_segments() {
            match data.get(offset..offset + 2) {
                Some(sub) => (Some(sub[0]), Some(sub[1])),
                None => (None, None),
            }
        } else {
            (None, None)
        };

        Ok(SegmentationDescriptor {
            segmentation_event_id,
            segmentation_event_cancel_indicator: false,
            program_segmentation_flag,
            delivery_not_restricted,
            components,
            segmentation_duration,
            upid,
            segmentation_type,
            segmentation_type_id,
            segment_num,
            segments_expected,
            sub_segment_num,
            sub_segments_expected,
        })
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.segmentation_duration.map(crate::ticks_to_secs)
    }
}
