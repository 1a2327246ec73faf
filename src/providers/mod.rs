pub mod speedtest_net;

use crate::config::ProviderSettings;
use crate::error::{ExporterError, Result};
use crate::traits::SpeedtestProvider;
use std::sync::Arc;

pub const SUPPORTED_PROVIDERS: &[&str] = &["speedtest-net"];

pub fn get_provider(settings: &ProviderSettings) -> Result<Arc<dyn SpeedtestProvider>> {
    match settings.kind.to_lowercase().as_str() {
        "speedtest-net" | "speedtest.net" => Ok(Arc::new(speedtest_net::SpeedtestNet::new(
            settings.clone(),
        )?)),
        _ => Err(ExporterError::UnknownProvider(format!(
            "Unsupported provider: '{}'. Available: {}",
            settings.kind,
            SUPPORTED_PROVIDERS.join(", ")
        ))),
    }
}
