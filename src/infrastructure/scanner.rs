use crate::config::PluginConfig;
use crate::services::runner::SystemRunner;
use crate::services::scanner::{AvastScanner, VirusScanner};
use std::sync::Arc;
use tracing::info;

pub fn setup_scanner(config: &PluginConfig) -> Arc<AvastScanner> {
    Arc::new(AvastScanner::new(Arc::new(SystemRunner), config))
}

/// Probe the scanner once at service start and log whether it answered
pub async fn announce_scanner(scanner: &dyn VirusScanner, probe_bin: &str) -> bool {
    let healthy = scanner.health_check().await;
    if healthy {
        info!("🦠 Avast scanner found at {}", probe_bin);
    } else {
        tracing::warn!(
            "⚠️  {} did not answer a version probe! Scans will fail until it does.",
            probe_bin
        );
    }
    healthy
}
