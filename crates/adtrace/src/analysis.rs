use std::borrow::Borrow;
use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::config::AnalysisConfig;
use crate::correlate::correlate_resolved;
use crate::decoder::{MarkerDecoder, Scte35Decoder};
use crate::model::Snapshot;
use crate::report::{AnalysisReport, StreamReport};
use crate::resolver::{Resolved, SignalingConvention, resolver_for, scan_stream};

/// One-shot analysis of a source and a service stream.
pub struct Analyzer {
    config: AnalysisConfig,
    decoder: Arc<dyn MarkerDecoder>,
}

impl Analyzer {
    /// Validates the configuration and installs the SCTE-35 decoder.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        let decoder = Arc::new(Scte35Decoder::new(config.verify_crc));
        Ok(Self { config, decoder })
    }

    /// Swap in another marker decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn MarkerDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Scan one stream with the resolver for `convention`.
    pub fn scan<S, I>(
        &self,
        convention: SignalingConvention,
        snapshots: I,
    ) -> Result<(StreamReport, Resolved)>
    where
        S: Borrow<Snapshot>,
        I: IntoIterator<Item = S>,
    {
        let mut resolver = resolver_for(convention, &self.config, Arc::clone(&self.decoder))?;
        let summary = scan_stream(resolver.as_mut(), snapshots, self.config.max_entries);
        let resolved = resolver.into_resolved();
        let report = StreamReport::new(convention, summary, &resolved, self.config.tolerance());
        Ok((report, resolved))
    }

    /// Scan both streams, correlate them and measure conformance.
    pub fn analyze<S, I, T, J>(&self, source: I, service: J) -> Result<AnalysisReport>
    where
        S: Borrow<Snapshot>,
        I: IntoIterator<Item = S>,
        T: Borrow<Snapshot>,
        J: IntoIterator<Item = T>,
    {
        let (source_report, source_resolved) = self.scan(self.config.source_convention, source)?;
        let (service_report, service_resolved) =
            self.scan(self.config.service_convention, service)?;
        let timeline =
            correlate_resolved(&source_resolved, &service_resolved, self.config.tolerance());

        info!(
            source_boundaries = source_resolved.boundary_count(),
            service_boundaries = service_resolved.boundary_count(),
            matched = timeline.matched(),
            "analysis complete"
        );

        Ok(AnalysisReport {
            source: source_report,
            service: service_report,
            timeline,
            tolerance_ms: self.config.tolerance_ms,
        })
    }

    /// Resolve paired-descriptor ads from a single stream.
    pub fn ads<S, I>(&self, snapshots: I) -> Result<StreamReport>
    where
        S: Borrow<Snapshot>,
        I: IntoIterator<Item = S>,
    {
        let (report, _) = self.scan(SignalingConvention::PairedDescriptors, snapshots)?;
        Ok(report)
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdTraceError;
    use crate::model::{DateRangeInfo, Marker, Segment};
    use chrono::{TimeZone, Utc};
    use scte35::test_support::SectionBuilder;
    use scte35::{Scte35Error, SpliceInfoSection};

    #[test]
    fn rejects_invalid_config() {
        let config = AnalysisConfig {
            max_entries: 0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            Analyzer::new(config),
            Err(AdTraceError::Configuration { .. })
        ));
    }

    #[test]
    fn empty_streams_produce_an_empty_report() {
        let analyzer = Analyzer::new(AnalysisConfig::default()).unwrap();
        let report = analyzer
            .analyze(Vec::<Snapshot>::new(), Vec::<Snapshot>::new())
            .unwrap();
        assert!(report.timeline.is_empty());
        assert!(report.source.is_empty());
        assert_eq!(report.service.scan.snapshots_scanned, 0);
        assert_eq!(report.tolerance_ms, 100);
    }

    #[test]
    fn custom_decoder_is_used() {
        let analyzer = Analyzer::new(AnalysisConfig::default())
            .unwrap()
            .with_decoder(Arc::new(
                |_: &str| -> std::result::Result<SpliceInfoSection, Scte35Error> {
                    Err(Scte35Error::invalid_payload("always fails"))
                },
            ));
        assert!(format!("{analyzer:?}").contains("Analyzer"));

        let t0 = Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap();
        // decodes fine with the default decoder
        let payload = SectionBuilder::time_signal(Some(0)).to_base64();
        let segment = Segment::new("a.ts", 1)
            .at(t0)
            .lasting(2.0)
            .with_marker(Marker::in_date_range(payload, DateRangeInfo::new("dr", t0)));
        let report = analyzer.ads([Snapshot::new(t0, vec![segment])]).unwrap();
        assert_eq!(report.convention, SignalingConvention::PairedDescriptors);
        assert_eq!(report.diagnostics.decode_failures, 1);
    }
}
