use std::path::PathBuf;

use adtrace_engine::{SignalingConvention, Timestamp};
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "adtrace", version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "ADTRACE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Correlate source markers with service ad replacements
    Correlate {
        /// Capture folder with request_N.meta.json / request_N.body files
        capture: PathBuf,

        /// Host serving the source manifest
        #[arg(long)]
        source_host: Option<String>,

        /// Host serving the ad-decisioned manifest
        #[arg(long)]
        service_host: Option<String>,

        /// How the source stream signals ads
        #[arg(long, value_parser = parse_convention)]
        source_convention: Option<SignalingConvention>,

        /// How the service stream signals ads
        #[arg(long, value_parser = parse_convention)]
        service_convention: Option<SignalingConvention>,

        #[command(flatten)]
        limits: Limits,
    },

    /// List complete paired-descriptor ads of one manifest
    Ads {
        /// Capture folder with request_N.meta.json / request_N.body files
        capture: PathBuf,

        /// Manifest url to analyze; defaults to the most captured one
        #[arg(long)]
        url: Option<String>,

        #[command(flatten)]
        limits: Limits,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct Limits {
    /// Maximum snapshots scanned per stream
    #[arg(long)]
    pub max_entries: Option<usize>,

    /// Conformance tolerance in milliseconds
    #[arg(long)]
    pub tolerance_ms: Option<u64>,

    /// Reject markers with a bad CRC-32
    #[arg(long)]
    pub verify_crc: bool,

    /// Skip snapshots captured before this time (RFC 3339)
    #[arg(long)]
    pub from: Option<Timestamp>,

    /// Skip snapshots captured after this time (RFC 3339)
    #[arg(long)]
    pub until: Option<Timestamp>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human readable tables
    Pretty,
    /// Indented JSON
    Json,
    /// Single-line JSON
    JsonCompact,
}

fn parse_convention(value: &str) -> Result<SignalingConvention, String> {
    value.parse().map_err(|e: adtrace_engine::AdTraceError| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cue-out", SignalingConvention::CueOut)]
    #[case("cue", SignalingConvention::CueOut)]
    #[case("Replacement", SignalingConvention::AdReplacement)]
    #[case("paired-descriptors", SignalingConvention::PairedDescriptors)]
    fn convention_aliases(#[case] value: &str, #[case] expected: SignalingConvention) {
        assert_eq!(parse_convention(value).unwrap(), expected);
    }

    #[test]
    fn parses_correlate_with_global_flags() {
        let args = Args::try_parse_from([
            "adtrace",
            "correlate",
            "capture/",
            "--source-host",
            "origin.example",
            "--source-convention",
            "paired",
            "--tolerance-ms",
            "250",
            "-f",
            "json-compact",
        ])
        .unwrap();
        assert_eq!(args.format, OutputFormat::JsonCompact);
        let Commands::Correlate {
            source_host,
            source_convention,
            limits,
            ..
        } = args.command
        else {
            panic!("expected correlate");
        };
        assert_eq!(source_host.as_deref(), Some("origin.example"));
        assert_eq!(source_convention, Some(SignalingConvention::PairedDescriptors));
        assert_eq!(limits.tolerance_ms, Some(250));
    }

    #[test]
    fn capture_window_takes_rfc3339() {
        let args = Args::try_parse_from([
            "adtrace",
            "ads",
            "capture/",
            "--from",
            "2024-03-15T10:00:04Z",
            "--until",
            "2024-03-15T11:00:00+01:00",
        ])
        .unwrap();
        let Commands::Ads { limits, .. } = args.command else {
            panic!("expected ads");
        };
        assert_eq!(limits.from.unwrap().to_rfc3339(), "2024-03-15T10:00:04+00:00");
        assert_eq!(limits.until.unwrap().to_rfc3339(), "2024-03-15T10:00:00+00:00");
        assert!(Args::try_parse_from(["adtrace", "ads", "c", "--from", "yesterday"]).is_err());
    }

    #[test]
    fn rejects_unknown_convention() {
        assert!(
            Args::try_parse_from(["adtrace", "correlate", "c", "--service-convention", "x"])
                .is_err()
        );
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Args::try_parse_from(["adtrace", "-v", "-q", "ads", "c"]).is_err());
    }
}
