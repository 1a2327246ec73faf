use crate::config::ProviderSettings;
use crate::error::{ExporterError, Result};
use crate::traits::SpeedtestProvider;
use crate::types::{Candidate, Coordinate, Identity};
use crate::utils;
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

// Reduced-traffic mode: one stream, smallest image
const SAVING_DOWNLOAD_SIZE: u32 = 350;
const SAVING_UPLOAD_DIVISOR: usize = 4;

/// Measurement provider backed by the public speedtest.net infrastructure.
///
/// Throughput is reported in megabits per second.
pub struct SpeedtestNet {
    client: Client,
    settings: ProviderSettings,
}

impl SpeedtestNet {
    pub fn new(settings: ProviderSettings) -> Result<Self> {
        let client = utils::build_client(settings.request_timeout())?;
        Ok(Self { client, settings })
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl SpeedtestProvider for SpeedtestNet {
    fn name(&self) -> &'static str {
        "speedtest-net"
    }

    async fn fetch_identity(&self) -> Result<Identity> {
        let body = self
            .get_text(&self.settings.config_url)
            .await
            .map_err(|e| ExporterError::IdentityFetch(e.to_string()))?;
        parse_identity(&body)
    }

    async fn fetch_candidates(&self, identity: &Identity) -> Result<Vec<Candidate>> {
        let body = self
            .get_text(&self.settings.servers_url)
            .await
            .map_err(|e| ExporterError::CandidateFetch(e.to_string()))?;
        parse_candidates(&body, identity)
    }

    async fn ping(&self, candidate: &Candidate) -> Result<Duration> {
        let url = format!("{}/latency.txt", utils::server_base_url(&candidate.url));
        let mut best: Option<Duration> = None;

        for _ in 0..self.settings.ping_samples {
            let start = Instant::now();
            let resp = self.client.get(&url).send().await?.error_for_status()?;
            resp.bytes().await?;
            let rtt = start.elapsed();
            best = Some(best.map_or(rtt, |b| b.min(rtt)));
        }

        debug!("ping {} -> {:?}", url, best);
        best.ok_or_else(|| ExporterError::Custom("no ping samples configured".to_string()))
    }

    async fn download(&self, candidate: &Candidate, account_bytes: bool) -> Result<f64> {
        let (size, streams) = if account_bytes {
            (SAVING_DOWNLOAD_SIZE, 1)
        } else {
            (self.settings.download_size, self.settings.download_streams)
        };
        let url = format!(
            "{}/random{}x{}.jpg",
            utils::server_base_url(&candidate.url),
            size,
            size
        );

        let start = Instant::now();
        let tasks = (0..streams).map(|_| fetch_len(&self.client, &url));
        let sizes = futures::future::join_all(tasks)
            .await
            .into_iter()
            .collect::<Result<Vec<u64>>>()?;
        let elapsed = start.elapsed();

        let total: u64 = sizes.iter().sum();
        if total == 0 {
            return Err(ExporterError::Custom(format!("{} returned no data", url)));
        }
        debug!("downloaded {} bytes in {:?} from {}", total, elapsed, url);
        Ok(utils::megabits_per_second(total, elapsed))
    }

    async fn upload(&self, candidate: &Candidate, account_bytes: bool) -> Result<f64> {
        let (size, streams) = if account_bytes {
            (self.settings.upload_size / SAVING_UPLOAD_DIVISOR, 1)
        } else {
            (self.settings.upload_size, self.settings.upload_streams)
        };
        let payload = upload_payload(size);

        let start = Instant::now();
        let tasks = (0..streams).map(|_| post_payload(&self.client, &candidate.url, payload.clone()));
        futures::future::join_all(tasks)
            .await
            .into_iter()
            .collect::<Result<Vec<()>>>()?;
        let elapsed = start.elapsed();

        let total = (payload.len() * streams) as u64;
        debug!("uploaded {} bytes in {:?} to {}", total, elapsed, candidate.url);
        Ok(utils::megabits_per_second(total, elapsed))
    }
}

async fn fetch_len(client: &Client, url: &str) -> Result<u64> {
    let resp = client.get(url).send().await?.error_for_status()?;
    let body = resp.bytes().await?;
    Ok(body.len() as u64)
}

async fn post_payload(client: &Client, url: &str, payload: Vec<u8>) -> Result<()> {
    let resp = client
        .post(url)
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(payload)
        .send()
        .await?;
    resp.error_for_status()?;
    Ok(())
}

/// Form body accepted by the upload.php handlers.
fn upload_payload(size: usize) -> Vec<u8> {
    const PREFIX: &[u8] = b"content1=";
    const FILLER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    let mut payload = Vec::with_capacity(size.max(PREFIX.len()));
    payload.extend_from_slice(PREFIX);
    payload.extend(FILLER.iter().cycle().take(size.saturating_sub(PREFIX.len())));
    payload
}

/// Pull the `<client ip=".." lat=".." lon=".." isp=".."/>` element out of
/// speedtest-config.php.
fn parse_identity(xml: &str) -> Result<Identity> {
    let element = Regex::new(r"<client\s+([^>]*?)/?>")?;
    let attribute = Regex::new(r#"(\w+)="([^"]*)""#)?;

    let Some(caps) = element.captures(xml) else {
        return Err(ExporterError::IdentityFetch(
            "no <client> element in speedtest config".to_string(),
        ));
    };

    let attrs: HashMap<&str, &str> = attribute
        .captures_iter(caps.get(1).map_or("", |m| m.as_str()))
        .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str())))
        .collect();

    let coordinate = |key: &str| -> Result<Coordinate> {
        attrs
            .get(key)
            .and_then(|v| Coordinate::parse(v))
            .ok_or_else(|| ExporterError::IdentityFetch(format!("client element has no valid '{}'", key)))
    };

    Ok(Identity {
        ip: attrs.get("ip").copied().unwrap_or_default().to_string(),
        lat: coordinate("lat")?,
        lon: coordinate("lon")?,
        isp: attrs.get("isp").copied().unwrap_or_default().to_string(),
    })
}

/// The servers API mixes string and numeric encodings for the same fields.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Number(f64),
    Text(String),
}

impl Loose {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Loose::Number(n) => Some(*n),
            Loose::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_coordinate(&self) -> Option<Coordinate> {
        match self {
            Loose::Number(n) => Some(Coordinate::from_degrees(*n)),
            Loose::Text(s) => Coordinate::parse(s),
        }
    }
}

#[derive(Deserialize)]
struct ServerRecord {
    url: String,
    lat: Loose,
    lon: Loose,
    name: String,
    country: String,
    #[serde(default)]
    sponsor: String,
    id: Loose,
    #[serde(default)]
    host: String,
}

fn parse_candidates(json: &str, identity: &Identity) -> Result<Vec<Candidate>> {
    let records: Vec<ServerRecord> = serde_json::from_str(json)
        .map_err(|e| ExporterError::CandidateFetch(format!("invalid server list: {}", e)))?;

    let mut candidates: Vec<Candidate> = records
        .into_iter()
        .filter_map(|r| {
            let id = r.id.as_f64().filter(|id| *id >= 0.0 && *id <= u32::MAX as f64)? as u32;
            let lat = r.lat.as_coordinate()?;
            let lon = r.lon.as_coordinate()?;
            Some(Candidate {
                id,
                distance: utils::haversine_km(
                    identity.lat.degrees,
                    identity.lon.degrees,
                    lat.degrees,
                    lon.degrees,
                ),
                name: r.name,
                country: r.country,
                sponsor: r.sponsor,
                lat,
                lon,
                url: r.url,
                host: r.host,
            })
        })
        .collect();

    candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(candidates)
}
