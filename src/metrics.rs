//! Metric descriptors and Prometheus text rendering.
//!
//! The catalog is built once at startup and shared read-only. Every scrape
//! renders into a fresh [`Registry`] so nothing from an earlier cycle leaks
//! into the next one.

use crate::error::{ExporterError, Result};
use crate::types::{MetricKind, Snapshot};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

pub const NAMESPACE: &str = "speedtest";

const RUN_LABELS: &[&str] = &["test_uuid"];

const PROBE_LABELS: &[&str] = &[
    "test_uuid",
    "user_lat",
    "user_lon",
    "user_ip",
    "user_isp",
    "server_lat",
    "server_lon",
    "server_id",
    "server_name",
    "server_country",
    "distance",
];

/// Name, help text and label names of one series.
#[derive(Debug, Clone)]
pub struct MetricDesc {
    pub kind: MetricKind,
    pub name: String,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

impl MetricDesc {
    fn new(
        namespace: &str,
        kind: MetricKind,
        name: &str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            kind,
            name: format!("{}_{}", namespace, name),
            help,
            labels,
        }
    }

    fn gauge_vec(&self) -> Result<GaugeVec> {
        Ok(GaugeVec::new(Opts::new(&self.name, self.help), self.labels)?)
    }
}

#[derive(Debug, Clone)]
pub struct MetricCatalog {
    descs: Vec<MetricDesc>,
}

impl MetricCatalog {
    pub fn new(namespace: &str) -> Self {
        let descs = vec![
            MetricDesc::new(
                namespace,
                MetricKind::Up,
                "up",
                "Was the last speedtest successful.",
                RUN_LABELS,
            ),
            MetricDesc::new(
                namespace,
                MetricKind::ScrapeDuration,
                "scrape_duration_seconds",
                "Time to perform last speed test",
                RUN_LABELS,
            ),
            MetricDesc::new(
                namespace,
                MetricKind::Latency,
                "latency_seconds",
                "Measured latency on last speed test",
                PROBE_LABELS,
            ),
            MetricDesc::new(
                namespace,
                MetricKind::UploadSpeed,
                "upload_speed_Bps",
                "Last upload speedtest result in Bytes per second",
                PROBE_LABELS,
            ),
            MetricDesc::new(
                namespace,
                MetricKind::DownloadSpeed,
                "download_speed_Bps",
                "Last download speedtest result in Bytes per second",
                PROBE_LABELS,
            ),
        ];
        Self { descs }
    }

    pub fn descs(&self) -> &[MetricDesc] {
        &self.descs
    }

    pub fn desc(&self, kind: MetricKind) -> Option<&MetricDesc> {
        self.descs.iter().find(|d| d.kind == kind)
    }

    /// Build a registry holding exactly the samples of `snapshot`.
    pub fn registry_for(&self, snapshot: &Snapshot) -> Result<Registry> {
        let registry = Registry::new();

        for desc in &self.descs {
            let samples: Vec<_> = snapshot
                .measurements
                .iter()
                .filter(|m| m.kind == desc.kind)
                .collect();
            if samples.is_empty() {
                continue;
            }

            let gauge = desc.gauge_vec()?;
            for sample in samples {
                let values = sample.label_values(&snapshot.test_uuid);
                gauge.get_metric_with_label_values(&values)?.set(sample.value);
            }
            registry.register(Box::new(gauge))?;
        }

        Ok(registry)
    }

    /// Content type matching what [`render`](Self::render) produces.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Prometheus text exposition of one snapshot.
    pub fn render(&self, snapshot: &Snapshot) -> Result<String> {
        let registry = self.registry_for(snapshot)?;
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| ExporterError::Custom(format!("metrics are not UTF-8: {}", e)))
    }
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self::new(NAMESPACE)
    }
}
