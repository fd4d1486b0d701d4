use bytes::Bytes;

use crate::{Result, Scte35Error};

/// Ticks per second of the 90 kHz presentation clock.
pub const PTS_CLOCK_HZ: u64 = 90_000;

/// Convert 90 kHz ticks to seconds.
#[inline]
pub fn ticks_to_secs(ticks: u64) -> f64 {
    ticks as f64 / PTS_CLOCK_HZ as f64
}

/// SCTE-35 splice command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceCommandType {
    SpliceNull,
    SpliceSchedule,
    SpliceInsert,
    TimeSignal,
    BandwidthReservation,
    PrivateCommand,
    Unknown(u8),
}

impl From<u8> for SpliceCommandType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => SpliceCommandType::SpliceNull,
            0x04 => SpliceCommandType::SpliceSchedule,
            0x05 => SpliceCommandType::SpliceInsert,
            0x06 => SpliceCommandType::TimeSignal,
            0x07 => SpliceCommandType::BandwidthReservation,
            0xFF => SpliceCommandType::PrivateCommand,
            v => SpliceCommandType::Unknown(v),
        }
    }
}

impl SpliceCommandType {
    pub fn name(&self) -> &'static str {
        match self {
            SpliceCommandType::SpliceNull => "splice_null",
            SpliceCommandType::SpliceSchedule => "splice_schedule",
            SpliceCommandType::SpliceInsert => "splice_insert",
            SpliceCommandType::TimeSignal => "time_signal",
            SpliceCommandType::BandwidthReservation => "bandwidth_reservation",
            SpliceCommandType::PrivateCommand => "private_command",
            SpliceCommandType::Unknown(_) => "unknown",
        }
    }
}

/// Parsed splice command
#[derive(Debug, Clone, PartialEq)]
pub enum SpliceCommand {
    SpliceNull,
    SpliceInsert(SpliceInsert),
    TimeSignal(TimeSignal),
    BandwidthReservation,
    Private { identifier: u32, data: Bytes },
    Other(Bytes),
}

/// SCTE-35 splice insert command
#[derive(Debug, Clone, PartialEq)]
pub struct SpliceInsert {
    pub splice_event_id: u32,
    pub splice_event_cancel_indicator: bool,
    pub out_of_network_indicator: bool,
    pub program_splice_flag: bool,
    pub splice_immediate_flag: bool,
    pub splice_time: Option<u64>,
    /// Per-component splice times, only present in component splice mode.
    pub components: Vec<ComponentSplice>,
    pub duration: Option<BreakDuration>,
    pub unique_program_id: u16,
    pub avail_num: u8,
    pub avails_expected: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentSplice {
    pub component_tag: u8,
    pub splice_time: Option<u64>,
}

/// Break duration in a splice insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakDuration {
    pub auto_return: bool,
    /// Duration in 90kHz ticks (33-bit)
    pub duration: u64,
}

impl BreakDuration {
    pub fn as_secs(&self) -> f64 {
        ticks_to_secs(self.duration)
    }
}

/// SCTE-35 time signal command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSignal {
    pub splice_time: Option<u64>,
}

#[inline]
pub(crate) fn read_33_bits(data: &[u8]) -> u64 {
    (((data[0] as u64) & 0x01) << 32)
        | ((data[1] as u64) << 24)
        | ((data[2] as u64) << 16)
        | ((data[3] as u64) << 8)
        | (data[4] as u64)
}

/// Parse a splice_time() structure. Returns (time_value, bytes_consumed).
fn parse_splice_time(data: &[u8]) -> Result<(Option<u64>, usize)> {
    let Some(&first) = data.first() else {
        return Err(Scte35Error::malformed("splice_time missing"));
    };
    if first & 0x80 == 0 {
        return Ok((None, 1));
    }
    if data.len() < 5 {
        return Err(Scte35Error::InsufficientData {
            expected: 5,
            actual: data.len(),
        });
    }
    Ok((Some(read_33_bits(data)), 5))
}

/// Parse a break_duration() structure
fn parse_break_duration(data: &[u8]) -> Result<BreakDuration> {
    if data.len() < 5 {
        return Err(Scte35Error::malformed("break_duration too short"));
    }
    Ok(BreakDuration {
        auto_return: (data[0] & 0x80) != 0,
        duration: read_33_bits(data),
    })
}

impl SpliceCommand {
    /// Parse the command body for `command_type`. Returns the command and the
    /// number of bytes it occupies, which matters when the section declares
    /// the legacy "unknown" command length.
    pub(crate) fn parse(command_type: SpliceCommandType, data: &[u8]) -> Result<(Self, usize)> {
        match command_type {
            SpliceCommandType::SpliceNull => Ok((SpliceCommand::SpliceNull, 0)),
            SpliceCommandType::BandwidthReservation => {
                Ok((SpliceCommand::BandwidthReservation, 0))
            }
            SpliceCommandType::SpliceInsert => {
                let (insert, consumed) = parse_splice_insert(data)?;
                Ok((SpliceCommand::SpliceInsert(insert), consumed))
            }
            SpliceCommandType::TimeSignal => {
                let (splice_time, consumed) = parse_splice_time(data)?;
                Ok((SpliceCommand::TimeSignal(TimeSignal { splice_time }), consumed))
            }
            SpliceCommandType::PrivateCommand => {
                if data.len() < 4 {
                    return Err(Scte35Error::malformed("private_command too short"));
                }
                let identifier = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                Ok((
                    SpliceCommand::Private {
                        identifier,
                        data: Bytes::copy_from_slice(&data[4..]),
                    },
                    data.len(),
                ))
            }
            SpliceCommandType::SpliceSchedule | SpliceCommandType::Unknown(_) => Ok((
                SpliceCommand::Other(Bytes::copy_from_slice(data)),
                data.len(),
            )),
        }
    }

    /// Splice time carried by the command, if any (90 kHz ticks).
    pub fn pts_time(&self) -> Option<u64> {
        match self {
            SpliceCommand::SpliceInsert(insert) => insert.splice_time,
            SpliceCommand::TimeSignal(signal) => signal.splice_time,
            _ => None,
        }
    }
}

fn parse_splice_insert(data: &[u8]) -> Result<(SpliceInsert, usize)> {
    if data.len() < 5 {
        return Err(Scte35Error::malformed("splice_insert too short"));
    }

    let splice_event_id = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let splice_event_cancel_indicator = (data[4] & 0x80) != 0;

    if splice_event_cancel_indicator {
        return Ok((
            SpliceInsert {
                splice_event_id,
                splice_event_cancel_indicator: true,
                out_of_network_indicator: false,
                program_splice_flag: false,
                splice_immediate_flag: false,
                splice_time: None,
                components: Vec::new(),
                duration: None,
                unique_program_id: 0,
                avail_num: 0,
                avails_expected: 0,
            },
            5,
        ));
    }

    if data.len() < 6 {
        return Err(Scte35Error::malformed("splice_insert missing flags"));
    }

    let flags = data[5];
    let out_of_network_indicator = (flags & 0x80) != 0;
    let program_splice_flag = (flags & 0x40) != 0;
    let duration_flag = (flags & 0x20) != 0;
    let splice_immediate_flag = (flags & 0x10) != 0;

    let mut offset = 6;
    let mut splice_time = None;
    let mut components = Vec::new();

    if program_splice_flag {
        if !splice_immediate_flag {
            let (time, consumed) = parse_splice_time(&data[offset..])?;
            splice_time = time;
            offset += consumed;
        }
    } else {
        let count = *data
            .get(offset)
            .ok_or_else(|| Scte35Error::malformed("splice_insert missing component_count"))?;
        offset += 1;
        for _ in 0..count {
            let component_tag = *data
                .get(offset)
                .ok_or_else(|| Scte35Error::malformed("splice_insert component truncated"))?;
            offset += 1;
            let mut component_time = None;
            if !splice_immediate_flag {
                let (time, consumed) = parse_splice_time(&data[offset..])?;
                component_time = time;
                offset += consumed;
            }
            components.push(ComponentSplice {
                component_tag,
                splice_time: component_time,
            });
        }
    }

    let duration = if duration_flag {
        let bd = parse_break_duration(&data[offset..])?;
        offset += 5;
        Some(bd)
    } else {
        None
    };

    if offset + 4 > data.len() {
        return Err(Scte35Error::malformed("splice_insert missing avail fields"));
    }
    let unique_program_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
    let avail_num = data[offset + 2];
    let avails_expected = data[offset + 3];
    offset += 4;

    Ok((
        SpliceInsert {
            splice_event_id,
            splice_event_cancel_indicator: false,
            out_of_network_indicator,
            program_splice_flag,
            splice_immediate_flag,
            splice_time,
            components,
            duration,
            unique_program_id,
            avail_num,
            avails_expected,
        },
        offset,
    ))
}
