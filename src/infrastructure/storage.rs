use crate::config::PluginConfig;
use crate::services::error::ScanError;
use crate::services::sink::{ResultSink, create_sink};
use std::sync::Arc;
use tracing::info;

pub async fn setup_sink(config: &PluginConfig, url: String) -> Result<Arc<dyn ResultSink>, ScanError> {
    info!("🗄️  Result storage: {} ({})", config.storage_backend, url);

    let sink: Arc<dyn ResultSink> = create_sink(&config.storage_backend, url).into();
    sink.init().await?;
    Ok(sink)
}
