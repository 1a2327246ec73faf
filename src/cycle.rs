use crate::error::{ExporterError, Result};
use crate::metrics::MetricCatalog;
use crate::phases::PhaseRunner;
use crate::selection::select_server;
use crate::traits::SpeedtestProvider;
use crate::types::{Measurement, MetricKind, MetricSink, ProbeContext, ServerPreference, Snapshot};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// Runs speedtests on demand and turns them into snapshots.
///
/// Holds only read-only state, so overlapping scrapes each run their own
/// independent cycle.
pub struct Exporter {
    provider: Arc<dyn SpeedtestProvider>,
    catalog: Arc<MetricCatalog>,
    preference: ServerPreference,
    fallback: bool,
}

impl Exporter {
    pub fn new(
        provider: Arc<dyn SpeedtestProvider>,
        catalog: Arc<MetricCatalog>,
        preference: ServerPreference,
        fallback: bool,
    ) -> Self {
        Self {
            provider,
            catalog,
            preference,
            fallback,
        }
    }

    pub fn provider(&self) -> &dyn SpeedtestProvider {
        self.provider.as_ref()
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// One full collection cycle.
    ///
    /// `up` and `scrape_duration_seconds` are always emitted; per-phase
    /// series only for the phases that succeeded.
    pub async fn run_cycle(&self) -> Snapshot {
        let mut snapshot = Snapshot::new(Uuid::new_v4().to_string());
        let start = Instant::now();

        let ok = match self.speedtest(&mut snapshot).await {
            Ok(ok) => ok,
            Err(e) => {
                error!("{}", e);
                false
            }
        };

        snapshot.duration = start.elapsed();
        snapshot.success = ok;

        let duration = snapshot.duration.as_secs_f64();
        snapshot.emit(Measurement {
            kind: MetricKind::ScrapeDuration,
            value: duration,
            context: None,
        });
        snapshot.emit(Measurement {
            kind: MetricKind::Up,
            value: if ok { 1.0 } else { 0.0 },
            context: None,
        });

        snapshot
    }

    /// Run a cycle and render it in the Prometheus text format.
    pub async fn collect(&self) -> Result<String> {
        let snapshot = self.run_cycle().await;
        self.catalog.render(&snapshot)
    }

    async fn speedtest(&self, snapshot: &mut Snapshot) -> Result<bool> {
        let provider = self.provider.as_ref();

        let user = provider
            .fetch_identity()
            .await
            .map_err(|e| into_fetch_error(e, ExporterError::IdentityFetch))?;

        let candidates = provider
            .fetch_candidates(&user)
            .await
            .map_err(|e| into_fetch_error(e, ExporterError::CandidateFetch))?;

        let server = select_server(self.preference, self.fallback, candidates)?;

        info!(
            "Starting speedtest with server {} ({}, {}) [id: {}]",
            server.name, server.country, server.host, server.id
        );

        let context = ProbeContext::new(&user, &server);
        let results = PhaseRunner::new(provider, &server, context)
            .run_all(snapshot)
            .await;

        let ok = results.iter().all(|r| r.is_success());
        snapshot.phases = results;
        snapshot.server = Some(server);
        Ok(ok)
    }
}

/// Providers may already report the specific fetch variant; anything else
/// gets wrapped so the log names the step that failed.
fn into_fetch_error(err: ExporterError, wrap: fn(String) -> ExporterError) -> ExporterError {
    match err {
        ExporterError::IdentityFetch(_) | ExporterError::CandidateFetch(_) => err,
        other => wrap(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::ScriptedProvider;
    use crate::types::Phase;

    fn exporter(provider: Arc<ScriptedProvider>) -> Exporter {
        Exporter::new(
            provider,
            Arc::new(MetricCatalog::default()),
            ServerPreference::Closest,
            false,
        )
    }

    #[tokio::test]
    async fn test_all_phases_succeed() {
        let provider = Arc::new(ScriptedProvider::new().with_upload_raw(30_000_000.0));
        let snapshot = exporter(provider.clone()).run_cycle().await;

        assert!(snapshot.success);
        assert_eq!(snapshot.value(MetricKind::Up), Some(1.0));
        for desc in MetricCatalog::default().descs() {
            assert!(snapshot.measurement(desc.kind).is_some(), "missing {}", desc.name);
        }
        assert_eq!(snapshot.measurements.len(), 5);
        assert_eq!(snapshot.server.as_ref().map(|s| s.id), Some(100));
        assert_eq!(
            snapshot.value(MetricKind::DownloadSpeed),
            Some(93.5 * 125_000.0)
        );
        assert_eq!(snapshot.value(MetricKind::UploadSpeed), Some(3_750_000.0));
    }

    #[tokio::test]
    async fn test_download_failure_keeps_other_phases() {
        let provider = Arc::new(ScriptedProvider::new().failing_download());
        let snapshot = exporter(provider.clone()).run_cycle().await;

        assert!(!snapshot.success);
        assert_eq!(snapshot.value(MetricKind::Up), Some(0.0));
        assert!(snapshot.measurement(MetricKind::ScrapeDuration).is_some());
        assert!(snapshot.measurement(MetricKind::Latency).is_some());
        assert!(snapshot.measurement(MetricKind::UploadSpeed).is_some());
        assert!(snapshot.measurement(MetricKind::DownloadSpeed).is_none());

        let failed: Vec<_> = snapshot
            .phases
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.phase)
            .collect();
        assert_eq!(failed, vec![Phase::Download]);
        assert_eq!(provider.calls().upload, 1);
    }

    #[tokio::test]
    async fn test_identity_failure_emits_only_up_and_duration() {
        let provider = Arc::new(ScriptedProvider::new().failing_identity());
        let snapshot = exporter(provider.clone()).run_cycle().await;

        assert!(!snapshot.success);
        assert_eq!(snapshot.value(MetricKind::Up), Some(0.0));
        assert!(snapshot.measurement(MetricKind::ScrapeDuration).is_some());
        assert_eq!(snapshot.measurements.len(), 2);

        let calls = provider.calls();
        assert_eq!(calls.candidates, 0);
        assert_eq!(calls.ping + calls.download + calls.upload, 0);
    }

    #[tokio::test]
    async fn test_candidate_failure_aborts_before_phases() {
        let provider = Arc::new(ScriptedProvider::new().failing_candidates());
        let snapshot = exporter(provider.clone()).run_cycle().await;

        assert_eq!(snapshot.value(MetricKind::Up), Some(0.0));
        assert_eq!(snapshot.measurements.len(), 2);
        assert!(snapshot.phases.is_empty());
        assert_eq!(provider.calls().ping, 0);
    }

    #[tokio::test]
    async fn test_empty_server_list_fails_cycle() {
        let provider = Arc::new(ScriptedProvider::new().with_candidates(Vec::new()));
        let snapshot = exporter(provider.clone()).run_cycle().await;

        assert!(!snapshot.success);
        assert_eq!(snapshot.measurements.len(), 2);
        assert_eq!(provider.calls().ping, 0);
    }

    #[tokio::test]
    async fn test_unavailable_server_without_fallback() {
        let provider = Arc::new(ScriptedProvider::new());
        let exporter = Exporter::new(
            provider.clone(),
            Arc::new(MetricCatalog::default()),
            ServerPreference::Id(999),
            false,
        );
        let snapshot = exporter.run_cycle().await;

        assert!(!snapshot.success);
        assert!(snapshot.server.is_none());
        assert_eq!(snapshot.measurements.len(), 2);
        assert_eq!(provider.calls().ping, 0);
    }

    #[tokio::test]
    async fn test_unavailable_server_with_fallback() {
        let provider = Arc::new(ScriptedProvider::new());
        let exporter = Exporter::new(
            provider,
            Arc::new(MetricCatalog::default()),
            ServerPreference::Id(999),
            true,
        );
        let snapshot = exporter.run_cycle().await;

        assert!(snapshot.success);
        assert_eq!(snapshot.server.map(|s| s.id), Some(100));
    }

    #[tokio::test]
    async fn test_negative_server_id_is_looked_up_not_closest() {
        let config = Config::parse("server_id = -5\nserver_fallback = false").unwrap();
        let provider = Arc::new(ScriptedProvider::new());
        let exporter = Exporter::new(
            provider.clone(),
            Arc::new(MetricCatalog::default()),
            config.preference(),
            config.server_fallback,
        );
        let snapshot = exporter.run_cycle().await;

        assert!(!snapshot.success);
        assert_eq!(snapshot.value(MetricKind::Up), Some(0.0));
        assert!(snapshot.server.is_none());
        assert_eq!(provider.calls().ping, 0);
    }

    #[tokio::test]
    async fn test_each_cycle_gets_its_own_uuid() {
        let exporter = exporter(Arc::new(ScriptedProvider::new()));
        let first = exporter.run_cycle().await;
        let second = exporter.run_cycle().await;
        assert_ne!(first.test_uuid, second.test_uuid);
    }

    #[tokio::test]
    async fn test_collect_renders_cycle() {
        let exporter = exporter(Arc::new(ScriptedProvider::new().failing_ping()));
        let text = exporter.collect().await.unwrap();

        assert!(text.contains("speedtest_up{"));
        assert!(text.contains("speedtest_scrape_duration_seconds{"));
        assert!(text.contains("speedtest_download_speed_Bps{"));
        assert!(!text.contains("speedtest_latency_seconds{"));
    }
}
