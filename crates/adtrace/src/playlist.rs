//! Adapts `m3u8-rs` media playlists into [`Snapshot`]s.
//!
//! `m3u8-rs` keeps at most one `EXT-X-DATERANGE` per segment, while SCTE-35
//! streams routinely carry an ad end and the next ad start on the same
//! segment. Date ranges are therefore lifted into a private tag before
//! parsing and read back from the segment's unknown tags.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use m3u8_rs::{ExtTag, MediaPlaylist, Playlist, parse_playlist_res};
use tracing::{debug, trace};

use crate::model::{CueTag, DateRangeInfo, Marker, Segment, Snapshot, Timestamp, offset_by};
use crate::{AdTraceError, Result};

const DATERANGE_PREFIX: &str = "#EXT-X-DATERANGE:";
const LIFTED_DATERANGE_PREFIX: &str = "#EXT-X-ADTRACE-DATERANGE:";
const LIFTED_DATERANGE_TAG: &str = "X-ADTRACE-DATERANGE";

/// Date-range attributes that carry a splice_info_section.
const SCTE35_ATTRIBUTES: [&str; 3] = ["SCTE35-CMD", "SCTE35-OUT", "SCTE35-IN"];

/// Parse manifest bytes and adapt them in one step.
pub fn parse_snapshot(bytes: &[u8], captured_at: Timestamp) -> Result<Snapshot> {
    let playlist = parse_media_playlist(bytes)?;
    Ok(snapshot_from_playlist(&playlist, captured_at))
}

pub fn parse_media_playlist(bytes: &[u8]) -> Result<MediaPlaylist> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AdTraceError::playlist(format!("manifest is not UTF-8: {e}")))?;
    let text = lift_dateranges(text);
    match parse_playlist_res(text.as_bytes()) {
        Ok(Playlist::MediaPlaylist(playlist)) => Ok(playlist),
        Ok(Playlist::MasterPlaylist(_)) => Err(AdTraceError::playlist(
            "expected a media playlist, got a master playlist",
        )),
        Err(e) => Err(AdTraceError::playlist(format!("failed to parse playlist: {e}"))),
    }
}

fn lift_dateranges(text: &str) -> Cow<'_, str> {
    if !text.contains(DATERANGE_PREFIX) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 64);
    for line in text.lines() {
        match line.trim_start().strip_prefix(DATERANGE_PREFIX) {
            Some(attributes) => {
                out.push_str(LIFTED_DATERANGE_PREFIX);
                out.push_str(attributes);
            }
            None => out.push_str(line),
        }
        out.push('\n');
    }
    Cow::Owned(out)
}

/// Build a snapshot from an already parsed playlist.
///
/// Missing `EXT-X-PROGRAM-DATE-TIME` values are extrapolated forward from
/// the previous segment. Extrapolation stops at a duration that cannot be
/// added to the timestamp.
pub fn snapshot_from_playlist(playlist: &MediaPlaylist, captured_at: Timestamp) -> Snapshot {
    let mut segments = Vec::with_capacity(playlist.segments.len());
    let mut next_pdt: Option<Timestamp> = None;

    for (idx, media_segment) in playlist.segments.iter().enumerate() {
        // f32 -> shortest decimal -> f64 keeps "6.006" exact
        let duration = media_segment
            .duration
            .to_string()
            .parse::<f64>()
            .unwrap_or(media_segment.duration as f64);

        let program_date_time = media_segment
            .program_date_time
            .map(|pdt| pdt.with_timezone(&Utc))
            .or(next_pdt);
        next_pdt = program_date_time.and_then(|pdt| offset_by(pdt, duration));
        if program_date_time.is_some() && next_pdt.is_none() {
            debug!(uri = %media_segment.uri, duration, "cannot extrapolate past segment");
        }

        let mut segment = Segment {
            uri: media_segment.uri.clone(),
            program_date_time,
            duration,
            media_sequence: playlist.media_sequence + idx as u64,
            discontinuity: media_segment.discontinuity,
            cue: None,
            markers: Vec::new(),
        };

        apply_tags(&mut segment, &media_segment.unknown_tags);
        segments.push(segment);
    }

    debug!(
        segments = segments.len(),
        media_sequence = playlist.media_sequence,
        "adapted playlist snapshot"
    );
    Snapshot::new(captured_at, segments)
}

/// `EXT-X-CUE-OUT` -> `X-CUE-OUT`, tolerating either spelling.
fn normalize_tag(tag: &str) -> String {
    let tag = tag.trim_start_matches('#');
    tag.strip_prefix("EXT-")
        .unwrap_or(tag)
        .to_ascii_uppercase()
}

fn apply_tags(segment: &mut Segment, tags: &[ExtTag]) {
    for ext in tags {
        let rest = ext.rest.as_deref().unwrap_or("").trim();
        match normalize_tag(&ext.tag).as_str() {
            "X-CUE-OUT" => {
                segment.cue = Some(CueTag::Out {
                    duration: parse_cue_duration(rest),
                });
            }
            "X-CUE-IN" => segment.cue = Some(CueTag::In),
            "OATCLS-SCTE35" if !rest.is_empty() => segment.markers.push(Marker::new(rest)),
            "X-SCTE35" => {
                let attributes = parse_attribute_list(rest);
                if let Some(cue) = attribute(&attributes, "CUE") {
                    segment.markers.push(Marker::new(cue));
                }
                if attribute(&attributes, "CUE-OUT").is_some_and(|v| v.eq_ignore_ascii_case("YES"))
                {
                    segment.cue = Some(CueTag::Out {
                        duration: attribute(&attributes, "DURATION").and_then(|d| d.parse().ok()),
                    });
                } else if attribute(&attributes, "CUE-IN")
                    .is_some_and(|v| v.eq_ignore_ascii_case("YES"))
                {
                    segment.cue = Some(CueTag::In);
                }
            }
            LIFTED_DATERANGE_TAG => push_date_range_markers(segment, rest),
            other => trace!(tag = other, uri = %segment.uri, "ignoring tag"),
        }
    }
}

/// `EXT-X-CUE-OUT:30`, `EXT-X-CUE-OUT:DURATION=30` or bare.
fn parse_cue_duration(rest: &str) -> Option<f64> {
    if rest.is_empty() {
        return None;
    }
    let attributes = parse_attribute_list(rest);
    attribute(&attributes, "DURATION")
        .unwrap_or(rest)
        .parse()
        .ok()
}

fn push_date_range_markers(segment: &mut Segment, rest: &str) {
    let attributes = parse_attribute_list(rest);
    let Some(date_range) = date_range_from_attributes(&attributes) else {
        debug!(uri = %segment.uri, "date range without ID or START-DATE");
        return;
    };
    for key in SCTE35_ATTRIBUTES {
        if let Some(payload) = attribute(&attributes, key) {
            segment
                .markers
                .push(Marker::in_date_range(payload, date_range.clone()));
        }
    }
}

fn date_range_from_attributes(attributes: &[(String, String)]) -> Option<DateRangeInfo> {
    let id = attribute(attributes, "ID")?;
    let start_date = parse_date(attribute(attributes, "START-DATE")?)?;
    Some(DateRangeInfo {
        id: id.to_string(),
        class: attribute(attributes, "CLASS").map(str::to_string),
        start_date,
        end_date: attribute(attributes, "END-DATE").and_then(parse_date),
        planned_duration: attribute(attributes, "PLANNED-DURATION").and_then(|d| d.parse().ok()),
    })
}

fn parse_date(value: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn attribute<'a>(attributes: &'a [(String, String)], key: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Split `KEY=VALUE,KEY="quoted, value"` keeping quoted commas intact.
fn parse_attribute_list(input: &str) -> Vec<(String, String)> {
    let mut parts: Vec<&str> = Vec::new();
    let mut in_quotes = false;
    let mut start = 0usize;
    for (idx, ch) in input.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if start < input.len() {
        parts.push(&input[start..]);
    }

    parts
        .into_iter()
        .filter_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            Some((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ))
        })
        .collect()
}
