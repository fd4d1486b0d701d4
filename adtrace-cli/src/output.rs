use adtrace_engine::{
    AdRecord, AnalysisReport, Boundary, BoundaryDelta, Conformance, ScanDiagnostics, SpanRecord,
    StreamReport, Timestamp,
};
#[cfg(feature = "colored-output")]
use colored::*;
use serde::Serialize;
use std::io::Write;
#[cfg(feature = "table-output")]
use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;
use crate::error::Result;

pub struct OutputManager {
    colored: bool,
}

impl OutputManager {
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    pub fn format_analysis(&self, report: &AnalysisReport, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.analysis_pretty(report)),
            OutputFormat::Json => to_json(report, true),
            OutputFormat::JsonCompact => to_json(report, false),
        }
    }

    pub fn format_ads(&self, report: &StreamReport, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Pretty => Ok(self.stream_pretty("Ads", report)),
            OutputFormat::Json => to_json(report, true),
            OutputFormat::JsonCompact => to_json(report, false),
        }
    }

    fn analysis_pretty(&self, report: &AnalysisReport) -> String {
        let mut output = String::new();
        output.push_str(&self.stream_pretty("Source", &report.source));
        output.push('\n');
        output.push_str(&self.stream_pretty("Service", &report.service));
        output.push('\n');

        let timeline = &report.timeline;
        output.push_str(&self.colorize(
            &format!(
                "Timeline: {} entries, {} matched",
                timeline.len(),
                timeline.matched()
            ),
            Color::Green,
            true,
        ));
        output.push('\n');
        if !timeline.is_empty() {
            let rows: Vec<TimelineRow> = timeline
                .entries
                .iter()
                .map(|entry| TimelineRow {
                    key: format_time(entry.key),
                    source: describe(&entry.source),
                    service: match &entry.service {
                        Some(boundary) => describe(boundary),
                        None => self.colorize("absent", Color::Yellow, false),
                    },
                })
                .collect();
            output.push_str(&render_timeline(rows));
            output.push('\n');
        }

        if !timeline.unmatched_service.is_empty() {
            output.push_str(&self.colorize(
                "Service boundaries without a source counterpart:",
                Color::Yellow,
                true,
            ));
            output.push('\n');
            for boundary in &timeline.unmatched_service {
                output.push_str(&format!("  - {}\n", describe(boundary)));
            }
        }
        output
    }

    fn stream_pretty(&self, title: &str, report: &StreamReport) -> String {
        let mut output = String::new();
        let count = if report.ads.is_empty() {
            format!("{} spans", report.spans.len())
        } else {
            format!("{} ads", report.ads.len())
        };
        output.push_str(&self.colorize(
            &format!(
                "{title} ({}): {count} from {} snapshots{}",
                report.convention,
                report.scan.snapshots_scanned,
                if report.scan.truncated {
                    " (truncated)"
                } else {
                    ""
                }
            ),
            Color::Green,
            true,
        ));
        output.push('\n');
        if let Some(event_id) = report.first_break_id {
            output.push_str(&format!("  First break: event {event_id}\n"));
        }

        if !report.spans.is_empty() {
            let rows = report.spans.iter().map(span_row).collect();
            output.push_str(&render_spans(rows));
            output.push('\n');
        }
        if !report.ads.is_empty() {
            let rows = report.ads.iter().map(|ad| self.ad_row(ad)).collect();
            output.push_str(&render_ads(rows));
            output.push('\n');
        }
        output.push_str(&self.diagnostics_line(&report.diagnostics));
        output
    }

    fn diagnostics_line(&self, diagnostics: &ScanDiagnostics) -> String {
        let line = format!("  {}: {diagnostics}\n", self.colorize("Scan", Color::Cyan, false));
        if diagnostics.anomalies() > 0 {
            format!(
                "{line}  {}\n",
                self.colorize(
                    &format!("{} anomalies", diagnostics.anomalies()),
                    Color::Yellow,
                    false
                )
            )
        } else {
            line
        }
    }

    fn ad_row(&self, ad: &AdRecord) -> AdRow {
        let (start, end) = match &ad.conformance {
            Conformance::Measured { start, end } => (self.delta(start), self.delta(end)),
            Conformance::Incomplete => {
                let na = self.colorize("n/a", Color::Yellow, false);
                (na.clone(), na)
            }
        };
        AdRow {
            id: ad.id.to_string(),
            break_id: ad.break_id.map(|b| b.to_string()).unwrap_or_default(),
            part: format!("{}/{}", ad.segment_num, ad.segment_total),
            start: format_time(ad.marker_start),
            sequences: ad
                .media_sequence_range
                .map(|(a, b)| format!("{a}..={b}"))
                .unwrap_or_default(),
            segments: ad.segment_count.to_string(),
            start_delta: start,
            end_delta: end,
        }
    }

    fn delta(&self, delta: &BoundaryDelta) -> String {
        let text = format!("{:+.3}s", delta.delta);
        if delta.is_within() {
            self.colorize(&text, Color::Green, false)
        } else {
            self.colorize(&text, Color::Red, false)
        }
    }

    fn colorize(&self, text: &str, color: Color, bold: bool) -> String {
        #[cfg(feature = "colored-output")]
        {
            if self.colored {
                let colored_text = match color {
                    Color::Green => text.green(),
                    Color::Red => text.red(),
                    Color::Yellow => text.yellow(),
                    Color::Cyan => text.cyan(),
                };
                if bold {
                    colored_text.bold().to_string()
                } else {
                    colored_text.to_string()
                }
            } else {
                text.to_string()
            }
        }

        #[cfg(not(feature = "colored-output"))]
        {
            let _ = (color, bold, self.colored);
            text.to_string()
        }
    }
}

#[derive(Clone, Copy)]
enum Color {
    Green,
    Red,
    Yellow,
    Cyan,
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(Into::into)
}

fn format_time(ts: Timestamp) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

fn describe(boundary: &Boundary) -> String {
    match boundary {
        Boundary::Span(span) => {
            let end = span
                .to_pdt
                .map(format_time)
                .unwrap_or_else(|| "open".to_string());
            let duration = span
                .actual_duration
                .map(|d| format!(" ({d:.3}s)"))
                .unwrap_or_default();
            format!("{} -> {end}{duration} {}", format_time(span.from_pdt), span.info)
        }
        Boundary::Ad(ad) => format!(
            "ad #{} [{}] {} segments",
            ad.id, ad.date_range_id, ad.segment_count
        ),
    }
}

#[cfg_attr(feature = "table-output", derive(Tabled))]
struct SpanRow {
    #[cfg_attr(feature = "table-output", tabled(rename = "From"))]
    from: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "To"))]
    to: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "Duration"))]
    duration: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "Info"))]
    info: String,
}

fn span_row(span: &SpanRecord) -> SpanRow {
    SpanRow {
        from: format_time(span.from_pdt),
        to: span.to_pdt.map(format_time).unwrap_or_else(|| "open".to_string()),
        duration: span
            .actual_duration
            .map(|d| format!("{d:.3}s"))
            .unwrap_or_default(),
        info: span.info.clone(),
    }
}

#[cfg_attr(feature = "table-output", derive(Tabled))]
struct TimelineRow {
    #[cfg_attr(feature = "table-output", tabled(rename = "Key"))]
    key: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "Source"))]
    source: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "Service"))]
    service: String,
}

#[cfg_attr(feature = "table-output", derive(Tabled))]
struct AdRow {
    #[cfg_attr(feature = "table-output", tabled(rename = "Ad"))]
    id: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "Break"))]
    break_id: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "Part"))]
    part: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "Signaled start"))]
    start: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "Sequences"))]
    sequences: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "Segments"))]
    segments: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "Start delta"))]
    start_delta: String,
    #[cfg_attr(feature = "table-output", tabled(rename = "End delta"))]
    end_delta: String,
}

#[cfg(feature = "table-output")]
fn render_spans(rows: Vec<SpanRow>) -> String {
    Table::new(rows).with(Style::modern()).to_string()
}

#[cfg(not(feature = "table-output"))]
fn render_spans(rows: Vec<SpanRow>) -> String {
    rows.iter()
        .map(|r| format!("- {} -> {} ({}) {}", r.from, r.to, r.duration, r.info))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(feature = "table-output")]
fn render_timeline(rows: Vec<TimelineRow>) -> String {
    Table::new(rows).with(Style::modern()).to_string()
}

#[cfg(not(feature = "table-output"))]
fn render_timeline(rows: Vec<TimelineRow>) -> String {
    rows.iter()
        .map(|r| format!("{}\n  live: {}\n  dai:  {}", r.key, r.source, r.service))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(feature = "table-output")]
fn render_ads(rows: Vec<AdRow>) -> String {
    Table::new(rows).with(Style::modern()).to_string()
}

#[cfg(not(feature = "table-output"))]
fn render_ads(rows: Vec<AdRow>) -> String {
    rows.iter()
        .map(|r| {
            format!(
                "- ad {} break {} part {} at {} seq {} ({} segments) start {} end {}",
                r.id, r.break_id, r.part, r.start, r.sequences, r.segments, r.start_delta, r.end_delta
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn write_output(content: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    if !content.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;
    Ok(())
}
