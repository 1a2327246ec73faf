//! Test doubles shared by the unit tests.

use crate::error::{ExporterError, Result};
use crate::traits::SpeedtestProvider;
use crate::types::{Candidate, Coordinate, Identity};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn sample_identity() -> Identity {
    Identity {
        ip: "203.0.113.7".to_string(),
        lat: Coordinate::from_degrees(52.3824),
        lon: Coordinate::from_degrees(4.8995),
        isp: "Example Telecom".to_string(),
    }
}

pub fn sample_candidate(id: u32, distance: f64) -> Candidate {
    Candidate {
        id,
        name: "Amsterdam".to_string(),
        country: "Netherlands".to_string(),
        sponsor: "Example Hosting".to_string(),
        lat: Coordinate::from_degrees(52.37),
        lon: Coordinate::from_degrees(4.89),
        url: format!("http://speed{}.example:8080/speedtest/upload.php", id),
        host: format!("speed{}.example:8080", id),
        distance,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub identity: usize,
    pub candidates: usize,
    pub ping: usize,
    pub download: usize,
    pub upload: usize,
}

/// Provider whose answers and failures are fixed up front.
pub struct ScriptedProvider {
    candidates: Vec<Candidate>,
    latency: Duration,
    download_raw: f64,
    upload_raw: f64,
    fail_identity: bool,
    fail_candidates: bool,
    fail_ping: bool,
    fail_download: bool,
    fail_upload: bool,
    identity_calls: AtomicUsize,
    candidate_calls: AtomicUsize,
    ping_calls: AtomicUsize,
    download_calls: AtomicUsize,
    upload_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            candidates: vec![sample_candidate(100, 2.5), sample_candidate(200, 30.0)],
            latency: Duration::from_millis(12),
            download_raw: 93.5,
            upload_raw: 41.2,
            fail_identity: false,
            fail_candidates: false,
            fail_ping: false,
            fail_download: false,
            fail_upload: false,
            identity_calls: AtomicUsize::new(0),
            candidate_calls: AtomicUsize::new(0),
            ping_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_download_raw(mut self, raw: f64) -> Self {
        self.download_raw = raw;
        self
    }

    pub fn with_upload_raw(mut self, raw: f64) -> Self {
        self.upload_raw = raw;
        self
    }

    pub fn failing_identity(mut self) -> Self {
        self.fail_identity = true;
        self
    }

    pub fn failing_candidates(mut self) -> Self {
        self.fail_candidates = true;
        self
    }

    pub fn failing_ping(mut self) -> Self {
        self.fail_ping = true;
        self
    }

    pub fn failing_download(mut self) -> Self {
        self.fail_download = true;
        self
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            identity: self.identity_calls.load(Ordering::SeqCst),
            candidates: self.candidate_calls.load(Ordering::SeqCst),
            ping: self.ping_calls.load(Ordering::SeqCst),
            download: self.download_calls.load(Ordering::SeqCst),
            upload: self.upload_calls.load(Ordering::SeqCst),
        }
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn scripted_failure(what: &str) -> ExporterError {
    ExporterError::Custom(format!("scripted {} failure", what))
}

#[async_trait]
impl SpeedtestProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_identity(&self) -> Result<Identity> {
        self.identity_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_identity {
            return Err(ExporterError::IdentityFetch("scripted".to_string()));
        }
        Ok(sample_identity())
    }

    async fn fetch_candidates(&self, _identity: &Identity) -> Result<Vec<Candidate>> {
        self.candidate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_candidates {
            return Err(ExporterError::CandidateFetch("scripted".to_string()));
        }
        Ok(self.candidates.clone())
    }

    async fn ping(&self, _candidate: &Candidate) -> Result<Duration> {
        self.ping_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_ping {
            return Err(scripted_failure("ping"));
        }
        Ok(self.latency)
    }

    async fn download(&self, _candidate: &Candidate, _account_bytes: bool) -> Result<f64> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_download {
            return Err(scripted_failure("download"));
        }
        Ok(self.download_raw)
    }

    async fn upload(&self, _candidate: &Candidate, _account_bytes: bool) -> Result<f64> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_upload {
            return Err(scripted_failure("upload"));
        }
        Ok(self.upload_raw)
    }
}
