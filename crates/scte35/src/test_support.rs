//! Byte builders for well-formed splice_info_sections, used by the tests of
//! this crate and of downstream crates (`test-utils` feature).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::crc::crc32_mpeg2;
use crate::descriptor::TAG_SEGMENTATION;
use crate::section::SCTE35_TABLE_ID;

fn push_33_bits(out: &mut Vec<u8>, marker: u8, value: u64) {
    out.push(marker | ((value >> 32) as u8 & 0x01));
    out.extend_from_slice(&(value as u32).to_be_bytes());
}

#[derive(Debug, Clone)]
pub struct SegmentationBuilder {
    event_id: u32,
    type_id: u8,
    segment_num: u8,
    segments_expected: u8,
    duration_ticks: Option<u64>,
    upid_type: u8,
    upid: Vec<u8>,
}

impl SegmentationBuilder {
    pub fn new(type_id: u8, event_id: u32) -> Self {
        Self {
            event_id,
            type_id,
            segment_num: 0,
            segments_expected: 0,
            duration_ticks: None,
            upid_type: 0,
            upid: Vec::new(),
        }
    }

    pub fn segment_num(mut self, num: u8, expected: u8) -> Self {
        self.segment_num = num;
        self.segments_expected = expected;
        self
    }

    pub fn duration_ticks(mut self, ticks: u64) -> Self {
        self.duration_ticks = Some(ticks);
        self
    }

    pub fn upid(mut self, upid_type: u8, data: &[u8]) -> Self {
        self.upid_type = upid_type;
        self.upid = data.to_vec();
        self
    }

    /// MPU UPID carrying `ADFR` ad fragment info with the given break code.
    pub fn adfr_break_code(self, break_code: u16) -> Self {
        let mut data = b"ADFR".to_vec();
        data.push(1);
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&20240101u32.to_be_bytes());
        data.extend_from_slice(&break_code.to_be_bytes());
        data.extend_from_slice(&30u16.to_be_bytes());
        self.upid(0x0C, &data)
    }

    /// Descriptor body following the `CUEI` identifier.
    pub fn body_bytes(&self) -> Vec<u8> {
        let mut out = self.event_id.to_be_bytes().to_vec();
        out.push(0x7F);
        let duration_flag = if self.duration_ticks.is_some() { 0x40 } else { 0 };
        out.push(0x80 | duration_flag | 0x20 | 0x1F);
        if let Some(ticks) = self.duration_ticks {
            out.push((ticks >> 32) as u8);
            out.extend_from_slice(&(ticks as u32).to_be_bytes());
        }
        out.push(self.upid_type);
        out.push(self.upid.len() as u8);
        out.extend_from_slice(&self.upid);
        out.push(self.type_id);
        out.push(self.segment_num);
        out.push(self.segments_expected);
        out
    }

    /// Full descriptor: tag, length, `CUEI`, body.
    pub fn descriptor_bytes(&self) -> Vec<u8> {
        let body = self.body_bytes();
        let mut out = vec![TAG_SEGMENTATION, (body.len() + 4) as u8];
        out.extend_from_slice(b"CUEI");
        out.extend_from_slice(&body);
        out
    }
}

#[derive(Debug, Clone)]
pub struct SectionBuilder {
    command_type: u8,
    command: Vec<u8>,
    descriptors: Vec<Vec<u8>>,
    pts_adjustment: u64,
    unknown_length: bool,
}

impl SectionBuilder {
    fn with_command(command_type: u8, command: Vec<u8>) -> Self {
        Self {
            command_type,
            command,
            descriptors: Vec::new(),
            pts_adjustment: 0,
            unknown_length: false,
        }
    }

    pub fn splice_null() -> Self {
        Self::with_command(0x00, Vec::new())
    }

    pub fn time_signal(pts: Option<u64>) -> Self {
        let mut command = Vec::new();
        match pts {
            Some(pts) => push_33_bits(&mut command, 0xFE, pts),
            None => command.push(0x7F),
        }
        Self::with_command(0x06, command)
    }

    /// Program-level immediate splice_insert.
    pub fn splice_insert(event_id: u32, out_of_network: bool, duration_ticks: Option<u64>) -> Self {
        let mut command = event_id.to_be_bytes().to_vec();
        command.push(0x7F);
        let mut flags = 0x40 | 0x10 | 0x0F;
        if out_of_network {
            flags |= 0x80;
        }
        if duration_ticks.is_some() {
            flags |= 0x20;
        }
        command.push(flags);
        if let Some(ticks) = duration_ticks {
            push_33_bits(&mut command, 0xFE, ticks);
        }
        command.extend_from_slice(&1u16.to_be_bytes());
        command.push(1);
        command.push(1);
        Self::with_command(0x05, command)
    }

    pub fn descriptor(mut self, bytes: Vec<u8>) -> Self {
        self.descriptors.push(bytes);
        self
    }

    pub fn pts_adjustment(mut self, ticks: u64) -> Self {
        self.pts_adjustment = ticks;
        self
    }

    /// Write the legacy 0xFFF command length instead of the real one.
    pub fn unknown_command_length(mut self) -> Self {
        self.unknown_length = true;
        self
    }

    /// Serialize with a valid CRC-32.
    pub fn build(&self) -> Vec<u8> {
        let loop_bytes: Vec<u8> = self.descriptors.concat();
        let section_length = 11 + self.command.len() + 2 + loop_bytes.len() + 4;
        let command_length = if self.unknown_length {
            0xFFF
        } else {
            self.command.len()
        };

        let mut out = vec![
            SCTE35_TABLE_ID,
            0x30 | ((section_length >> 8) as u8 & 0x0F),
            section_length as u8,
            0x00,
        ];
        push_33_bits(&mut out, 0x00, self.pts_adjustment);
        out.push(0x00);
        out.push(0xFF);
        out.push(0xF0 | ((command_length >> 8) as u8 & 0x0F));
        out.push(command_length as u8);
        out.push(self.command_type);
        out.extend_from_slice(&self.command);
        out.extend_from_slice(&(loop_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&loop_bytes);
        let crc = crc32_mpeg2(&out);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    /// `0x`-prefixed upper-case hex, as carried by `EXT-X-DATERANGE`.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode_upper(self.build()))
    }

    /// Base64, as carried by `EXT-OATCLS-SCTE35`.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.build())
    }
}
