use crate::error::ExporterError;
use crate::normalize::normalize_speed;
use crate::traits::SpeedtestProvider;
use crate::types::{Candidate, Measurement, MetricSink, Phase, PhaseResult, ProbeContext};
use tracing::{error, info};

/// Runs the latency, download and upload phases against one server.
///
/// Each phase reports its own outcome; a failure is logged and never stops
/// the phases after it.
pub struct PhaseRunner<'a> {
    provider: &'a dyn SpeedtestProvider,
    server: &'a Candidate,
    context: ProbeContext,
}

impl<'a> PhaseRunner<'a> {
    pub fn new(
        provider: &'a dyn SpeedtestProvider,
        server: &'a Candidate,
        context: ProbeContext,
    ) -> Self {
        Self {
            provider,
            server,
            context,
        }
    }

    /// All three phases, in order, unconditionally.
    pub async fn run_all(&self, sink: &mut dyn MetricSink) -> Vec<PhaseResult> {
        let mut results = Vec::with_capacity(Phase::ALL.len());
        results.push(self.latency(sink).await);
        results.push(self.download(sink).await);
        results.push(self.upload(sink).await);
        results
    }

    pub async fn latency(&self, sink: &mut dyn MetricSink) -> PhaseResult {
        match self.provider.ping(self.server).await {
            Ok(latency) => {
                info!("Ping test successful. Latency: {:?}", latency);
                self.emit(sink, Phase::Latency, latency.as_secs_f64())
            }
            Err(e) => fail(Phase::Latency, e),
        }
    }

    pub async fn download(&self, sink: &mut dyn MetricSink) -> PhaseResult {
        match self.provider.download(self.server, false).await {
            Ok(raw) => {
                let speed = normalize_speed(raw);
                info!(
                    "Download test successful. Speed: {:.2} B/s ({:.2} MB/s)",
                    speed,
                    speed / 1000.0 / 1000.0
                );
                self.emit(sink, Phase::Download, speed)
            }
            Err(e) => fail(Phase::Download, e),
        }
    }

    pub async fn upload(&self, sink: &mut dyn MetricSink) -> PhaseResult {
        match self.provider.upload(self.server, false).await {
            Ok(raw) => {
                let speed = normalize_speed(raw);
                info!(
                    "Upload test successful. Speed: {:.2} B/s ({:.2} MB/s)",
                    speed,
                    speed / 1000.0 / 1000.0
                );
                self.emit(sink, Phase::Upload, speed)
            }
            Err(e) => fail(Phase::Upload, e),
        }
    }

    fn emit(&self, sink: &mut dyn MetricSink, phase: Phase, value: f64) -> PhaseResult {
        sink.emit(Measurement {
            kind: phase.metric_kind(),
            value,
            context: Some(self.context.clone()),
        });
        PhaseResult::succeeded(phase, value)
    }
}

fn fail(phase: Phase, cause: ExporterError) -> PhaseResult {
    let err = ExporterError::Phase {
        phase,
        message: cause.to_string(),
    };
    error!("{}", err);
    PhaseResult::failed(phase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_candidate, sample_identity, ScriptedProvider};
    use crate::types::{MetricKind, Snapshot};
    use std::time::Duration;

    fn runner_for<'a>(provider: &'a ScriptedProvider, server: &'a Candidate) -> PhaseRunner<'a> {
        let context = ProbeContext::new(&sample_identity(), server);
        PhaseRunner::new(provider, server, context)
    }

    #[tokio::test]
    async fn test_latency_emits_seconds_with_context() {
        let provider = ScriptedProvider::new().with_latency(Duration::from_millis(25));
        let server = sample_candidate(4242, 12.3456);
        let mut snapshot = Snapshot::new("uuid-1".to_string());

        let result = runner_for(&provider, &server).latency(&mut snapshot).await;

        assert!(result.is_success());
        let m = snapshot.measurement(MetricKind::Latency).unwrap();
        assert_eq!(m.value, 0.025);
        let context = m.context.as_ref().unwrap();
        assert_eq!(context.server_id, "4242");
        assert_eq!(context.distance, "12.345600");
        assert_eq!(context.user_isp, "Example Telecom");
    }

    #[tokio::test]
    async fn test_download_is_normalized() {
        // 250 falls in the Mbps band
        let provider = ScriptedProvider::new().with_download_raw(250.0);
        let server = sample_candidate(1, 3.0);
        let mut snapshot = Snapshot::new("uuid-2".to_string());

        let result = runner_for(&provider, &server).download(&mut snapshot).await;

        assert_eq!(result.value, Some(250.0 * 125_000.0));
        assert_eq!(
            snapshot.value(MetricKind::DownloadSpeed),
            Some(250.0 * 125_000.0)
        );
    }

    #[tokio::test]
    async fn test_failed_phase_emits_nothing() {
        let provider = ScriptedProvider::new().failing_upload();
        let server = sample_candidate(1, 3.0);
        let mut snapshot = Snapshot::new("uuid-3".to_string());

        let result = runner_for(&provider, &server).upload(&mut snapshot).await;

        assert!(!result.is_success());
        assert!(snapshot.measurements.is_empty());
    }

    #[tokio::test]
    async fn test_run_all_continues_after_failures() {
        let provider = ScriptedProvider::new().failing_ping().failing_download();
        let server = sample_candidate(1, 3.0);
        let mut snapshot = Snapshot::new("uuid-4".to_string());

        let results = runner_for(&provider, &server).run_all(&mut snapshot).await;

        assert_eq!(results.len(), 3);
        assert!(!results[0].is_success());
        assert!(!results[1].is_success());
        assert!(results[2].is_success());
        assert_eq!(provider.calls().upload, 1);
        assert_eq!(snapshot.measurements.len(), 1);
        assert_eq!(snapshot.measurements[0].kind, MetricKind::UploadSpeed);
    }
}
