use crate::error::Result;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use std::time::Duration;

const EARTH_RADIUS_KM: f64 = 6371.0;

const USER_AGENT: &str = concat!("speedtest-exporter/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client. The timeout bounds every single request so a stalled
/// server cannot hang a scrape forever.
pub fn build_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Great-circle distance in kilometres between two coordinates.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Directory of a speedtest server, derived from its upload URL.
///
/// `http://host:8080/speedtest/upload.php` -> `http://host:8080/speedtest`
pub fn server_base_url(url: &str) -> &str {
    match url.rfind("/upload.php") {
        Some(index) => &url[..index],
        None => url.trim_end_matches('/'),
    }
}

/// Megabits per second for `bytes` moved in `elapsed`.
pub fn megabits_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / 1_000_000.0 / secs
}

/// Spinner for the interactive commands.
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
