use crate::error::Result;
use crate::types::{Candidate, Identity};
use async_trait::async_trait;
use std::time::Duration;

/// SpeedtestProvider: the network measurement backend a cycle runs against.
///
/// Throughput results are returned raw, in whatever unit the backend
/// reports; the caller normalizes them.
#[async_trait]
pub trait SpeedtestProvider: Sync + Send {
    /// Provider name (e.g. "speedtest-net")
    fn name(&self) -> &'static str;

    /// Geolocation, IP and ISP of the caller
    async fn fetch_identity(&self) -> Result<Identity>;

    /// Candidate servers, closest first
    async fn fetch_candidates(&self, identity: &Identity) -> Result<Vec<Candidate>>;

    /// Round-trip latency to the server
    async fn ping(&self, candidate: &Candidate) -> Result<Duration>;

    /// Raw download throughput. `account_bytes` selects the reduced-traffic mode.
    async fn download(&self, candidate: &Candidate, account_bytes: bool) -> Result<f64>;

    /// Raw upload throughput. `account_bytes` selects the reduced-traffic mode.
    async fn upload(&self, candidate: &Candidate, account_bytes: bool) -> Result<f64>;
}
