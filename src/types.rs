use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A latitude or longitude. `text` is what the provider sent and is what
/// ends up in labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub degrees: f64,
    pub text: String,
}

impl Coordinate {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let degrees = text.parse::<f64>().ok()?;
        Some(Self {
            degrees,
            text: text.to_string(),
        })
    }

    pub fn from_degrees(degrees: f64) -> Self {
        Self {
            degrees,
            text: degrees.to_string(),
        }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Who is running the test, as reported by the measurement provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub ip: String,
    pub lat: Coordinate,
    pub lon: Coordinate,
    pub isp: String,
}

/// A measurement server the probe can run against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: u32,
    pub name: String,
    pub country: String,
    pub sponsor: String,
    pub lat: Coordinate,
    pub lon: Coordinate,
    pub url: String,
    pub host: String,
    /// Distance from the caller in kilometres.
    pub distance: f64,
}

/// Which server the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerPreference {
    #[default]
    Closest,
    Id(i64),
}

impl ServerPreference {
    /// `-1` means "use the closest server". Every other value is looked up
    /// as a server id, even ones no server can have.
    pub fn from_raw(raw: i64) -> Self {
        match raw {
            -1 => Self::Closest,
            id => Self::Id(id),
        }
    }

    pub fn matches(self, candidate: &Candidate) -> bool {
        match self {
            Self::Closest => false,
            Self::Id(id) => i64::from(candidate.id) == id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Latency,
    Download,
    Upload,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Latency, Phase::Download, Phase::Upload];

    pub fn metric_kind(self) -> MetricKind {
        match self {
            Phase::Latency => MetricKind::Latency,
            Phase::Download => MetricKind::DownloadSpeed,
            Phase::Upload => MetricKind::UploadSpeed,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Latency => "ping",
            Phase::Download => "download",
            Phase::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Outcome of one phase. `value` is seconds for latency and bytes/second
/// for the throughput phases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseResult {
    pub phase: Phase,
    pub value: Option<f64>,
}

impl PhaseResult {
    pub fn succeeded(phase: Phase, value: f64) -> Self {
        Self {
            phase,
            value: Some(value),
        }
    }

    pub fn failed(phase: Phase) -> Self {
        Self { phase, value: None }
    }

    pub fn is_success(&self) -> bool {
        self.value.is_some()
    }
}

/// The five series this exporter knows how to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Up,
    ScrapeDuration,
    Latency,
    DownloadSpeed,
    UploadSpeed,
}

/// Labels describing the user and server a phase measured against.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeContext {
    pub user_lat: String,
    pub user_lon: String,
    pub user_ip: String,
    pub user_isp: String,
    pub server_lat: String,
    pub server_lon: String,
    pub server_id: String,
    pub server_name: String,
    pub server_country: String,
    pub distance: String,
}

impl ProbeContext {
    pub fn new(identity: &Identity, candidate: &Candidate) -> Self {
        Self {
            user_lat: identity.lat.text.clone(),
            user_lon: identity.lon.text.clone(),
            user_ip: identity.ip.clone(),
            user_isp: identity.isp.clone(),
            server_lat: candidate.lat.text.clone(),
            server_lon: candidate.lon.text.clone(),
            server_id: candidate.id.to_string(),
            server_name: candidate.name.clone(),
            server_country: candidate.country.clone(),
            distance: format!("{:.6}", candidate.distance),
        }
    }

    fn values(&self) -> [&str; 10] {
        [
            &self.user_lat,
            &self.user_lon,
            &self.user_ip,
            &self.user_isp,
            &self.server_lat,
            &self.server_lon,
            &self.server_id,
            &self.server_name,
            &self.server_country,
            &self.distance,
        ]
    }
}

/// One emitted sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub kind: MetricKind,
    pub value: f64,
    pub context: Option<ProbeContext>,
}

impl Measurement {
    /// Label values in catalog order, starting with the test uuid.
    pub fn label_values<'a>(&'a self, test_uuid: &'a str) -> Vec<&'a str> {
        let mut values = vec![test_uuid];
        if let Some(ref context) = self.context {
            values.extend(context.values());
        }
        values
    }
}

/// Anything that accepts measurements as a cycle produces them.
pub trait MetricSink: Send {
    fn emit(&mut self, measurement: Measurement);
}

/// Result of a single collection cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub test_uuid: String,
    pub success: bool,
    pub duration: Duration,
    pub server: Option<Candidate>,
    pub phases: Vec<PhaseResult>,
    pub measurements: Vec<Measurement>,
}

impl Snapshot {
    pub fn new(test_uuid: String) -> Self {
        Self {
            test_uuid,
            success: false,
            duration: Duration::ZERO,
            server: None,
            phases: Vec::new(),
            measurements: Vec::new(),
        }
    }

    pub fn measurement(&self, kind: MetricKind) -> Option<&Measurement> {
        self.measurements.iter().find(|m| m.kind == kind)
    }

    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        self.measurement(kind).map(|m| m.value)
    }
}

impl MetricSink for Snapshot {
    fn emit(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }
}
