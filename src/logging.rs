//! Structured logging initialization.

use anyhow::Result;
use tracing::Subscriber;
use tracing_subscriber::{fmt, util::SubscriberInitExt, EnvFilter};

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-friendly, multi-line logs.
    Pretty,
    /// JSON-formatted logs for machine parsing.
    Json,
    /// Compact single-line logs.
    Compact,
}

impl LogFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (trace, debug, info, warn, error, off).
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LogConfig {
    /// Resolve level and format. Precedence: explicit value, then
    /// `SPEEDTEST_LOG_LEVEL` / `SPEEDTEST_LOG_FORMAT`, then the config file.
    pub fn resolve(
        level: Option<&str>,
        format: Option<&str>,
        file_level: &str,
        file_format: &str,
    ) -> Self {
        let env_level = std::env::var("SPEEDTEST_LOG_LEVEL").ok();
        let env_format = std::env::var("SPEEDTEST_LOG_FORMAT").ok();

        let level = level
            .map(str::to_string)
            .or(env_level)
            .unwrap_or_else(|| file_level.to_string());
        let format = format
            .map(str::to_string)
            .or(env_format)
            .and_then(|f| LogFormat::parse(&f))
            .or_else(|| LogFormat::parse(file_format))
            .unwrap_or(LogFormat::Pretty);

        Self { level, format }
    }

    /// Build the effective EnvFilter, honoring RUST_LOG if set.
    pub fn env_filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global subscriber. Logs go to stderr so table output on
/// stdout stays clean.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = config.env_filter();

    match config.format {
        LogFormat::Pretty => finish(
            fmt::Subscriber::builder()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .pretty()
                .finish(),
        ),
        LogFormat::Json => finish(
            fmt::Subscriber::builder()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .with_ansi(false)
                .json()
                .finish(),
        ),
        LogFormat::Compact => finish(
            fmt::Subscriber::builder()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .compact()
                .finish(),
        ),
    }
}

fn finish<S>(subscriber: S) -> Result<()>
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = subscriber.try_init() {
        if err.to_string().contains("already initialized") {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse(" compact "), Some(LogFormat::Compact));
        assert_eq!(LogFormat::parse("xml"), None);
    }

    #[test]
    fn test_explicit_values_win() {
        let config = LogConfig::resolve(Some("debug"), Some("json"), "warn", "pretty");
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_unknown_format_falls_back_to_file() {
        let config = LogConfig::resolve(Some("info"), Some("xml"), "info", "compact");
        assert_eq!(config.format, LogFormat::Compact);
    }
}
