mod config;
mod cycle;
mod error;
mod http;
mod logging;
mod metrics;
mod normalize;
mod phases;
mod providers;
mod selection;
#[cfg(test)]
mod testing;
mod traits;
mod types;
mod utils;

use anyhow::{bail, Context, Result};
use std::fmt::Write as _;
use clap::{Args, Parser, Subcommand};
use config::Config;
use cycle::Exporter;
use logging::LogConfig;
use metrics::MetricCatalog;
use providers::get_provider;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use types::{Phase, Snapshot};

#[derive(Parser)]
#[command(name = "speedtest-exporter")]
#[command(about = "Prometheus exporter that runs a speedtest on every scrape", long_about = None)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true, env = "SPEEDTEST_CONFIG")]
    config: Option<PathBuf>,

    /// Log level or filter directive (e.g. debug, speedtest_exporter=trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format: pretty, compact or json
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Default)]
struct ServerArgs {
    /// Speedtest server ID to test against (-1 for the closest)
    #[arg(long, allow_negative_numbers = true)]
    server_id: Option<i64>,

    /// Fall back to the closest server if the chosen one is not available
    /// (`--server-fallback false` turns it off)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    server_fallback: Option<bool>,
}

impl ServerArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(id) = self.server_id {
            config.server_id = id;
        }
        if let Some(fallback) = self.server_fallback {
            config.server_fallback = fallback;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve metrics over HTTP (default)
    Serve {
        /// Address to listen on (e.g. 0.0.0.0:9090)
        #[arg(long)]
        listen: Option<String>,

        /// Path the metrics are served under
        #[arg(long)]
        metrics_path: Option<String>,

        #[command(flatten)]
        server: ServerArgs,
    },
    /// Run a single speedtest and print the result
    Probe {
        #[command(flatten)]
        server: ServerArgs,
    },
    /// List candidate servers, closest first
    Servers {
        #[command(flatten)]
        server: ServerArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;

    let log_config = LogConfig::resolve(
        cli.log_level.as_deref(),
        cli.log_format.as_deref(),
        &config.log.level,
        &config.log.format,
    );
    logging::init_logging(&log_config)?;

    let command = cli.command.unwrap_or(Commands::Serve {
        listen: None,
        metrics_path: None,
        server: ServerArgs::default(),
    });

    match command {
        Commands::Serve {
            listen,
            metrics_path,
            server,
        } => handle_serve(config, listen, metrics_path, &server).await?,
        Commands::Probe { server } => handle_probe(config, &server).await?,
        Commands::Servers { server } => handle_servers(config, &server).await?,
    }

    Ok(())
}

fn build_exporter(config: &Config) -> Result<Exporter> {
    let provider = get_provider(&config.provider)?;
    let catalog = Arc::new(MetricCatalog::default());
    Ok(Exporter::new(
        provider,
        catalog,
        config.preference(),
        config.server_fallback,
    ))
}

// --- Handlers ---

async fn handle_serve(
    mut config: Config,
    listen: Option<String>,
    metrics_path: Option<String>,
    server: &ServerArgs,
) -> Result<()> {
    if let Some(listen) = listen {
        config.listen_address = listen;
    }
    if let Some(path) = metrics_path {
        config.metrics_path = path;
    }
    server.apply(&mut config);
    config.validate()?;

    let addr: SocketAddr = config
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address '{}'", config.listen_address))?;

    let exporter = build_exporter(&config)?;
    info!(
        "Starting speedtest exporter (provider: {}, server_id: {}, server_fallback: {})",
        exporter.provider().name(),
        config.server_id,
        config.server_fallback
    );

    let state = http::HttpState {
        exporter: Arc::new(exporter),
        metrics_path: config.metrics_path.clone(),
        version: env!("CARGO_PKG_VERSION"),
    };
    http::serve(addr, state).await?;

    Ok(())
}

async fn handle_probe(mut config: Config, server: &ServerArgs) -> Result<()> {
    server.apply(&mut config);
    let exporter = build_exporter(&config)?;

    let pb = utils::spinner("Running speedtest...");
    let snapshot = exporter.run_cycle().await;
    pb.finish_and_clear();

    print!("{}", probe_report(&snapshot, exporter.catalog())?);

    if !snapshot.success {
        bail!("Speedtest failed. Run with --log-level debug for details.");
    }
    Ok(())
}

/// Result table followed by the metrics a scrape of this cycle would return.
fn probe_report(snapshot: &Snapshot, catalog: &MetricCatalog) -> Result<String> {
    let mut out = String::new();

    writeln!(out, "Test UUID: {}", snapshot.test_uuid)?;
    match snapshot.server {
        Some(ref s) => writeln!(
            out,
            "Server:    {} ({}, {}) [id: {}] {:.1} km",
            s.name, s.country, s.host, s.id, s.distance
        )?,
        None => writeln!(out, "Server:    none selected")?,
    }
    writeln!(out)?;

    writeln!(out, "{:<10} {:<8} {:<44} SERIES", "PHASE", "STATUS", "VALUE")?;
    writeln!(out, "{}", "-".repeat(96))?;

    for phase in Phase::ALL {
        let kind = phase.metric_kind();
        let ran = snapshot.phases.iter().any(|r| r.phase == phase);
        let (status, value) = match snapshot.value(kind) {
            Some(v) => ("ok", format_phase_value(phase, v)),
            None if ran => ("FAILED", "-".to_string()),
            None => ("skipped", "-".to_string()),
        };
        let series = catalog.desc(kind).map_or("-", |d| d.name.as_str());
        writeln!(out, "{:<10} {:<8} {:<44} {}", phase.to_string(), status, value, series)?;
    }

    writeln!(out, "{}", "-".repeat(96))?;
    writeln!(
        out,
        "Overall: {} in {:.1}s",
        if snapshot.success { "success" } else { "failure" },
        snapshot.duration.as_secs_f64()
    )?;
    writeln!(out)?;

    writeln!(out, "Metrics:")?;
    out.push_str(&catalog.render(snapshot)?);
    Ok(out)
}

fn format_phase_value(phase: Phase, value: f64) -> String {
    match phase {
        Phase::Latency => format!("{:.2} ms", value * 1000.0),
        Phase::Download | Phase::Upload => format!(
            "{:.0} B/s ({:.2} MB/s, {:.2} Mbit/s)",
            value,
            value / 1000.0 / 1000.0,
            value * 8.0 / 1000.0 / 1000.0
        ),
    }
}

async fn handle_servers(mut config: Config, server: &ServerArgs) -> Result<()> {
    server.apply(&mut config);
    let provider = get_provider(&config.provider)?;

    let pb = utils::spinner("Fetching server list...");
    let user = provider.fetch_identity().await;
    let candidates = match user {
        Ok(ref user) => provider.fetch_candidates(user).await,
        Err(_) => Ok(Vec::new()),
    };
    pb.finish_and_clear();

    let user = user?;
    let candidates = candidates?;

    println!(
        "You: {} ({}) at {}, {}",
        user.ip, user.isp, user.lat, user.lon
    );
    println!();

    let chosen = selection::select_server(
        config.preference(),
        config.server_fallback,
        candidates.clone(),
    );

    println!(
        "{:<4} {:<8} {:<10} {:<24} {:<16} HOST",
        "RANK", "ID", "DISTANCE", "NAME", "COUNTRY"
    );
    println!("{}", "-".repeat(80));

    for (i, c) in candidates.iter().enumerate() {
        let marker = match chosen {
            Ok(ref s) if s.id == c.id => "*",
            _ => " ",
        };
        println!(
            "{:<4} {:<8} {:<10} {:<24} {:<16} {}",
            format!("{}{}", i + 1, marker),
            c.id,
            format!("{:.1} km", c.distance),
            c.name,
            c.country,
            c.host
        );
    }

    println!("{}", "-".repeat(80));
    match chosen {
        Ok(s) => println!("Selected: {} [id: {}] ({})", s.name, s.id, s.url),
        Err(e) => println!("No server would be selected: {}", e),
    }

    Ok(())
}
