//! Segmentation UPID (unique program identifier) decoding.
//!
//! Only the forms that show up in ad-signaling captures get a structured
//! representation; everything else is kept as raw bytes tagged with its type.

use bytes::Bytes;

use crate::{Result, Scte35Error};

/// `ADFR` registered MPU format identifier (ad fragment info).
pub const ADFR_FORMAT_IDENTIFIER: u32 = u32::from_be_bytes(*b"ADFR");

/// Segmentation UPID type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpidType {
    NotUsed,
    UserDefined,
    Isci,
    AdId,
    Umid,
    IsanDeprecated,
    Isan,
    Tid,
    AiringId,
    Adi,
    Eidr,
    AtscContentIdentifier,
    Mpu,
    Mid,
    AdsInformation,
    Uri,
    Uuid,
    Scr,
    Reserved(u8),
}

impl From<u8> for UpidType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => UpidType::NotUsed,
            0x01 => UpidType::UserDefined,
            0x02 => UpidType::Isci,
            0x03 => UpidType::AdId,
            0x04 => UpidType::Umid,
            0x05 => UpidType::IsanDeprecated,
            0x06 => UpidType::Isan,
            0x07 => UpidType::Tid,
            0x08 => UpidType::AiringId,
            0x09 => UpidType::Adi,
            0x0A => UpidType::Eidr,
            0x0B => UpidType::AtscContentIdentifier,
            0x0C => UpidType::Mpu,
            0x0D => UpidType::Mid,
            0x0E => UpidType::AdsInformation,
            0x0F => UpidType::Uri,
            0x10 => UpidType::Uuid,
            0x11 => UpidType::Scr,
            v => UpidType::Reserved(v),
        }
    }
}

impl UpidType {
    fn is_textual(&self) -> bool {
        matches!(
            self,
            UpidType::Isci
                | UpidType::AdId
                | UpidType::Tid
                | UpidType::Adi
                | UpidType::AdsInformation
                | UpidType::Uri
                | UpidType::Scr
        )
    }
}

/// Decoded `ADFR` private data carried in an MPU UPID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdFragmentInfo {
    pub version: u8,
    pub channel_identifier: u16,
    /// Broadcast date as a `YYYYMMDD` integer.
    pub date: u32,
    pub break_code: u16,
    pub duration: u16,
}

impl AdFragmentInfo {
    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 11 {
            return None;
        }
        Some(AdFragmentInfo {
            version: data[0],
            channel_identifier: u16::from_be_bytes([data[1], data[2]]),
            date: u32::from_be_bytes([data[3], data[4], data[5], data[6]]),
            break_code: u16::from_be_bytes([data[7], data[8]]),
            duration: u16::from_be_bytes([data[9], data[10]]),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Upid {
    NotUsed,
    Text { upid_type: UpidType, value: String },
    AiringId(u64),
    Mpu {
        format_identifier: u32,
        private_data: Bytes,
        ad_fragment: Option<AdFragmentInfo>,
    },
    Mid(Vec<Upid>),
    Binary { upid_type: UpidType, data: Bytes },
}

impl Upid {
    pub(crate) fn parse(upid_type: UpidType, data: &[u8]) -> Result<Self> {
        match upid_type {
            UpidType::NotUsed => Ok(Upid::NotUsed),
            UpidType::AiringId if data.len() == 8 => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(data);
                Ok(Upid::AiringId(u64::from_be_bytes(raw)))
            }
            UpidType::Mpu => {
                if data.len() < 4 {
                    return Err(Scte35Error::malformed("MPU upid shorter than format identifier"));
                }
                let format_identifier = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                let private = &data[4..];
                let ad_fragment = (format_identifier == ADFR_FORMAT_IDENTIFIER)
                    .then(|| AdFragmentInfo::parse(private))
                    .flatten();
                Ok(Upid::Mpu {
                    format_identifier,
                    private_data: Bytes::copy_from_slice(private),
                    ad_fragment,
                })
            }
            UpidType::Mid => {
                let mut upids = Vec::new();
                let mut rest = data;
                while !rest.is_empty() {
                    if rest.len() < 2 {
                        return Err(Scte35Error::malformed("MID entry header truncated"));
                    }
                    let inner_type = UpidType::from(rest[0]);
                    let len = rest[1] as usize;
                    let body = rest
                        .get(2..2 + len)
                        .ok_or_else(|| Scte35Error::malformed("MID entry body truncated"))?;
                    upids.push(Upid::parse(inner_type, body)?);
                    rest = &rest[2 + len..];
                }
                Ok(Upid::Mid(upids))
            }
            t if t.is_textual() => Ok(Upid::Text {
                upid_type: t,
                value: String::from_utf8_lossy(data).into_owned(),
            }),
            t => Ok(Upid::Binary {
                upid_type: t,
                data: Bytes::copy_from_slice(data),
            }),
        }
    }

    /// Break code from an `ADFR` MPU, searching inside MID containers.
    pub fn break_code(&self) -> Option<u16> {
        match self {
            Upid::Mpu {
                ad_fragment: Some(info),
                ..
            } => Some(info.break_code),
            Upid::Mid(upids) => upids.iter().find_map(Upid::break_code),
            _ => None,
        }
    }
}
