//! SCTE-35 splice information decoding
//!
//! Parses `splice_info_section` payloads as they appear in HLS manifests
//! (`EXT-X-DATERANGE` hex attributes, `EXT-OATCLS-SCTE35` base64 tags):
//! splice commands, the splice descriptor loop, segmentation descriptors and
//! their UPIDs, with optional MPEG-2 CRC-32 verification.

pub mod command;
pub mod crc;
pub mod descriptor;
pub mod error;
pub mod section;
pub mod upid;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use command::{
    BreakDuration, ComponentSplice, PTS_CLOCK_HZ, SpliceCommand, SpliceCommandType, SpliceInsert,
    TimeSignal, ticks_to_secs,
};
pub use crc::crc32_mpeg2;
pub use descriptor::{
    SegmentationComponent, SegmentationDescriptor, SegmentationType, SpliceDescriptor,
};
pub use error::Scte35Error;
pub use section::{SCTE35_TABLE_ID, SpliceInfoSection, payload_bytes};
pub use upid::{AdFragmentInfo, Upid, UpidType};

/// Result type for SCTE-35 decoding
pub type Result<T> = std::result::Result<T, Scte35Error>;
