//! Reader for multi-file capture folders.
//!
//! Each captured exchange is a `request_<N>.meta.json` file plus an optional
//! `request_<N>.body*` file next to it, either in the folder itself or in a
//! `requests/` subfolder.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use adtrace_engine::{SnapshotSeries, Timestamp, parse_snapshot};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{AppError, Result};

static META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^request_(\d+)\.meta\.json$").unwrap());

#[derive(Debug, Deserialize)]
struct ExchangeMeta {
    request: RequestMeta,
    #[serde(default)]
    response: ResponseMeta,
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequestMeta {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMeta {
    #[serde(default)]
    status_code: u16,
    #[serde(default)]
    headers: HashMap<String, String>,
    mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CaptureEntry {
    pub index: u64,
    pub url: Url,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub captured_at: Timestamp,
    pub body: Vec<u8>,
}

impl CaptureEntry {
    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    /// By `.m3u8` path or an HLS mime type.
    pub fn is_hls_manifest(&self) -> bool {
        self.url.path().to_ascii_lowercase().ends_with(".m3u8")
            || self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.to_ascii_lowercase().contains("mpegurl"))
    }
}

/// Entries of one capture folder, in index order.
#[derive(Debug, Default)]
pub struct Capture {
    pub entries: Vec<CaptureEntry>,
    /// Meta files that could not be used
    pub skipped: usize,
}

impl Capture {
    pub fn read(folder: &Path) -> Result<Self> {
        if !folder.is_dir() {
            return Err(AppError::InvalidCapture(format!(
                "{} is not a directory",
                folder.display()
            )));
        }

        let mut dirs = vec![folder.to_path_buf()];
        let requests = folder.join("requests");
        if requests.is_dir() {
            dirs.push(requests);
        }

        let mut metas: Vec<(u64, String, PathBuf)> = Vec::new();
        for dir in &dirs {
            for dir_entry in std::fs::read_dir(dir)? {
                let path = dir_entry?.path();
                let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if let Some(caps) = META_RE.captures(name) {
                    let digits = caps[1].to_string();
                    if let Ok(index) = digits.parse::<u64>() {
                        metas.push((index, digits, path));
                    }
                }
            }
        }
        metas.sort();

        let mut capture = Capture::default();
        for (index, digits, meta_path) in metas {
            match read_entry(index, &digits, &meta_path) {
                Ok(entry) => capture.entries.push(entry),
                Err(e) => {
                    warn!(path = %meta_path.display(), "skipping capture entry: {e}");
                    capture.skipped += 1;
                }
            }
        }
        debug!(
            entries = capture.entries.len(),
            skipped = capture.skipped,
            folder = %folder.display(),
            "capture loaded"
        );
        Ok(capture)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn manifests(&self) -> impl Iterator<Item = &CaptureEntry> {
        self.entries.iter().filter(|e| e.is_hls_manifest())
    }

    /// Manifest entry counts per host.
    pub fn manifest_hosts(&self) -> BTreeMap<String, usize> {
        let mut hosts = BTreeMap::new();
        for entry in self.manifests() {
            if let Some(host) = entry.host() {
                *hosts.entry(host.to_string()).or_insert(0) += 1;
            }
        }
        hosts
    }

    pub fn manifests_for_host<'a>(&'a self, host: &'a str) -> Vec<&'a CaptureEntry> {
        self.manifests()
            .filter(|e| e.host().is_some_and(|h| h.eq_ignore_ascii_case(host)))
            .collect()
    }

    pub fn manifests_for_url<'a>(&'a self, url: &'a str) -> Vec<&'a CaptureEntry> {
        self.manifests().filter(|e| e.url.as_str() == url).collect()
    }

    /// Manifest url with the most captured entries; the first seen wins ties.
    pub fn busiest_manifest_url(&self) -> Option<String> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for entry in self.manifests() {
            let url = entry.url.as_str();
            match counts.iter_mut().find(|(u, _)| u == url) {
                Some((_, count)) => *count += 1,
                None => counts.push((url.to_string(), 1)),
            }
        }
        let max = counts.iter().map(|(_, c)| *c).max()?;
        counts.into_iter().find(|(_, c)| *c == max).map(|(u, _)| u)
    }
}

fn read_entry(index: u64, digits: &str, meta_path: &Path) -> Result<CaptureEntry> {
    let meta: ExchangeMeta = serde_json::from_slice(&std::fs::read(meta_path)?)?;

    let url = Url::parse(&meta.request.url)
        .map_err(|e| AppError::InvalidCapture(format!("bad url '{}': {e}", meta.request.url)))?;
    let captured_at = meta
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| AppError::InvalidCapture("missing or invalid timestamp".to_string()))?;

    let content_type = meta.response.mime_type.clone().or_else(|| {
        meta.response
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.clone())
    });

    let body = match find_body(meta_path, digits)? {
        Some(path) => std::fs::read(path)?,
        None => Vec::new(),
    };

    Ok(CaptureEntry {
        index,
        url,
        status_code: meta.response.status_code,
        content_type,
        captured_at,
        body,
    })
}

fn find_body(meta_path: &Path, digits: &str) -> Result<Option<PathBuf>> {
    let Some(dir) = meta_path.parent() else {
        return Ok(None);
    };
    let prefix = format!("request_{digits}.body");
    for dir_entry in std::fs::read_dir(dir)? {
        let path = dir_entry?.path();
        if path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        {
            return Ok(Some(path));
        }
    }
    Ok(None)
}

/// Parse manifest bodies into a capture-ordered series named `name`.
///
/// Failed requests, empty or unparsable bodies are logged and left out. Returns the
/// series and how many entries were left out.
pub fn snapshots<'a, I>(name: &str, entries: I) -> (SnapshotSeries, usize)
where
    I: IntoIterator<Item = &'a CaptureEntry>,
{
    let mut series = SnapshotSeries::new(name);
    let mut unusable = 0;
    for entry in entries {
        if entry.status_code >= 400 {
            debug!(index = entry.index, status = entry.status_code, "failed request");
            unusable += 1;
            continue;
        }
        if entry.body.is_empty() {
            debug!(index = entry.index, "empty manifest body");
            unusable += 1;
            continue;
        }
        match parse_snapshot(&entry.body, entry.captured_at) {
            Ok(snapshot) => series.push(snapshot),
            Err(e) => {
                warn!(index = entry.index, url = %entry.url, "unusable manifest: {e}");
                unusable += 1;
            }
        }
    }
    (series, unusable)
}
