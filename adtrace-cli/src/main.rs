mod capture;
mod cli;
mod config;
mod error;
mod output;

use std::process;

use adtrace_engine::{Analyzer, Snapshot, SnapshotSeries};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::capture::{Capture, CaptureEntry, snapshots};
use crate::cli::{Args, Commands, Limits, OutputFormat};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::output::{OutputManager, write_output};

fn main() {
    let args = Args::parse();
    let format = args.format;

    if let Err(e) = run(args) {
        match format {
            OutputFormat::Json | OutputFormat::JsonCompact => {
                let error_json = serde_json::json!({
                    "status": "error",
                    "message": e.to_string(),
                });
                println!("{error_json}");
            }
            OutputFormat::Pretty => {
                error!("Application error: {}", e);
                #[cfg(feature = "colored-output")]
                {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                }
                #[cfg(not(feature = "colored-output"))]
                {
                    eprintln!("Error: {}", e);
                }
            }
        }
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet);

    let mut config = AppConfig::load(args.config.as_deref())?;
    let manager = OutputManager::new(!args.no_color);

    match args.command {
        Commands::Correlate {
            capture,
            source_host,
            service_host,
            source_convention,
            service_convention,
            limits,
        } => {
            config.apply_limits(&limits);
            if let Some(convention) = source_convention {
                config.analysis.source_convention = convention;
            }
            if let Some(convention) = service_convention {
                config.analysis.service_convention = convention;
            }
            let source_host = source_host.or(config.source_host.take()).ok_or_else(|| {
                AppError::InvalidInput("no source host given (--source-host or config)".into())
            })?;
            let service_host = service_host.or(config.service_host.take()).ok_or_else(|| {
                AppError::InvalidInput("no service host given (--service-host or config)".into())
            })?;

            let analyzer = Analyzer::new(config.analysis)?;
            let capture = Capture::read(&capture)?;
            info!(entries = capture.len(), hosts = ?capture.manifest_hosts(), "capture loaded");

            let source = load_stream(&capture.manifests_for_host(&source_host), &source_host)?;
            let service = load_stream(&capture.manifests_for_host(&service_host), &service_host)?;

            let report =
                analyzer.analyze(in_window(&source, &limits), in_window(&service, &limits))?;
            write_output(&manager.format_analysis(&report, args.format)?)?;
        }

        Commands::Ads {
            capture,
            url,
            limits,
        } => {
            config.apply_limits(&limits);
            let analyzer = Analyzer::new(config.analysis)?;
            let capture = Capture::read(&capture)?;

            let url = match url {
                Some(url) => url,
                None => capture.busiest_manifest_url().ok_or_else(|| {
                    AppError::InvalidCapture("capture holds no HLS manifests".into())
                })?,
            };
            info!(%url, "selected manifest");

            let series = load_stream(&capture.manifests_for_url(&url), &url)?;
            let report = analyzer.ads(in_window(&series, &limits))?;
            write_output(&manager.format_ads(&report, args.format)?)?;
        }
    }

    Ok(())
}

/// Parse one stream's manifests; a stream with nothing usable is an error.
fn load_stream(entries: &[&CaptureEntry], name: &str) -> Result<SnapshotSeries> {
    if entries.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "no manifests captured for {name}"
        )));
    }
    let (series, unusable) = snapshots(name, entries.iter().copied());
    if unusable > 0 {
        warn!(stream = name, unusable, "some manifests could not be used");
    }
    info!(stream = series.name(), snapshots = series.len(), "stream loaded");
    Ok(series)
}

/// Snapshots inside the `--from`/`--until` window.
fn in_window<'a>(series: &'a SnapshotSeries, limits: &Limits) -> &'a [Snapshot] {
    let window = series.window(limits.from, limits.until);
    if window.len() < series.len() {
        info!(
            stream = series.name(),
            kept = window.len(),
            of = series.len(),
            "capture window applied"
        );
    }
    window
}

/// Installs the global subscriber once; later calls are no-ops.
fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(verbose)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::test_support::write_exchange;

    fn manifest(first_seq: u64, start_secs: u64, lines: &[(&str, &str)]) -> String {
        let mut text = format!(
            "#EXTM3U\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:{first_seq}\n"
        );
        for (i, (tag, uri)) in lines.iter().enumerate() {
            if !tag.is_empty() {
                text.push_str(tag);
                text.push('\n');
            }
            text.push_str(&format!(
                "#EXT-X-PROGRAM-DATE-TIME:2024-03-15T10:00:{:02}Z\n#EXTINF:2.0,\n{uri}\n",
                start_secs + 2 * i as u64
            ));
        }
        text
    }

    #[test]
    fn correlate_runs_against_a_capture_folder() {
        let dir = tempfile::tempdir().unwrap();
        let source = manifest(
            1,
            0,
            &[("", "a.ts"), ("#EXT-X-CUE-OUT:4", "b.ts"), ("", "c.ts"), ("#EXT-X-CUE-IN", "d.ts")],
        );
        let service = manifest(
            1,
            0,
            &[
                ("", "a.ts"),
                ("#EXT-X-DISCONTINUITY", "bpkio-jitt/ad.ts"),
                ("#EXT-X-DISCONTINUITY", "c.ts"),
            ],
        );
        write_exchange(dir.path(), 1, "https://origin.example/live.m3u8", "2024-03-15T10:00:10Z", &source);
        write_exchange(dir.path(), 2, "https://dai.example/live.m3u8", "2024-03-15T10:00:10Z", &service);

        let capture = dir.path().to_str().unwrap();
        let args = Args::try_parse_from([
            "adtrace",
            "-q",
            "-f",
            "json-compact",
            "correlate",
            capture,
            "--source-host",
            "origin.example",
            "--service-host",
            "dai.example",
        ])
        .unwrap();
        run(args).unwrap();
    }

    #[test]
    fn unknown_host_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        write_exchange(
            dir.path(),
            1,
            "https://origin.example/live.m3u8",
            "2024-03-15T10:00:10Z",
            &manifest(1, 0, &[("", "a.ts")]),
        );
        let args = Args::try_parse_from([
            "adtrace",
            "-q",
            "correlate",
            dir.path().to_str().unwrap(),
            "--source-host",
            "origin.example",
            "--service-host",
            "elsewhere.example",
        ])
        .unwrap();
        assert!(matches!(run(args), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn window_limits_select_snapshots() {
        use chrono::{TimeDelta, TimeZone, Utc};

        let t0 = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let at = |s: i64| t0 + TimeDelta::seconds(s);
        let series = SnapshotSeries::from_snapshots(
            "origin.example",
            [0, 4, 8, 12].map(|s| Snapshot::new(at(s), Vec::new())).to_vec(),
        );

        let limits = Limits {
            from: Some(at(4)),
            until: Some(at(10)),
            ..Limits::default()
        };
        let kept: Vec<_> = in_window(&series, &limits).iter().map(|s| s.captured_at).collect();
        assert_eq!(kept, vec![at(4), at(8)]);
        assert_eq!(in_window(&series, &Limits::default()).len(), 4);
    }

    #[test]
    fn ads_with_a_window_after_the_capture_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let body = manifest(1, 0, &[("", "a.ts"), ("", "b.ts")]);
        write_exchange(dir.path(), 1, "https://cdn.example/a.m3u8", "2024-03-15T10:00:04Z", &body);

        let args = Args::try_parse_from([
            "adtrace",
            "-q",
            "-f",
            "json",
            "ads",
            dir.path().to_str().unwrap(),
            "--from",
            "2024-03-15T11:00:00Z",
        ])
        .unwrap();
        run(args).unwrap();
    }

    #[test]
    fn ads_picks_the_busiest_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let body = manifest(1, 0, &[("", "a.ts"), ("", "b.ts")]);
        write_exchange(dir.path(), 1, "https://cdn.example/a.m3u8", "2024-03-15T10:00:04Z", &body);
        write_exchange(dir.path(), 2, "https://cdn.example/b.m3u8", "2024-03-15T10:00:04Z", &body);
        write_exchange(dir.path(), 3, "https://cdn.example/b.m3u8", "2024-03-15T10:00:06Z", &body);

        let args = Args::try_parse_from([
            "adtrace",
            "-q",
            "-f",
            "json",
            "ads",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();
        run(args).unwrap();
    }
}
