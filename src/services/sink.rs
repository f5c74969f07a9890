use crate::models::{PLUGIN_CATEGORY, PLUGIN_NAME, PluginResults, ScanResults};
use crate::services::error::ScanError;
use serde_json::{Map, Value, json};

/// Index every plugin result is written to
pub const INDEX: &str = "malice";

/// Shape a verdict into the record handed to a sink
pub fn to_record(results: &ScanResults, id: &str) -> PluginResults {
    let data = match serde_json::to_value(results) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    PluginResults {
        id: id.to_string(),
        name: PLUGIN_NAME.to_string(),
        category: PLUGIN_CATEGORY.to_string(),
        data,
    }
}

/// Trait for result storage backends
#[async_trait::async_trait]
pub trait ResultSink: Send + Sync {
    /// Make sure the backend is reachable and ready to accept records
    async fn init(&self) -> Result<(), ScanError>;

    /// Upsert one plugin's results under the record's id
    async fn store(&self, record: &PluginResults) -> Result<(), ScanError>;
}

/// Elasticsearch document store reached over its REST API
pub struct ElasticsearchSink {
    url: String,
    client: reqwest::Client,
}

impl ElasticsearchSink {
    pub fn new(url: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn init_failure(reason: impl ToString) -> ScanError {
        ScanError::StorageFailure {
            context: "failed to initialize elasticsearch".to_string(),
            reason: reason.to_string(),
        }
    }

    fn store_failure(reason: impl ToString) -> ScanError {
        ScanError::StorageFailure {
            context: format!("failed to index malice/{} results", PLUGIN_NAME),
            reason: reason.to_string(),
        }
    }

    /// Partial document merged into an existing sample, plus the full
    /// document used when the sample has not been indexed yet.
    fn update_body(record: &PluginResults) -> Value {
        let plugins = json!({ &record.category: { &record.name: &record.data } });
        json!({
            "doc": { "plugins": plugins },
            "upsert": {
                "id": &record.id,
                "name": &record.name,
                "scan_date": chrono::Utc::now(),
                "plugins": plugins,
            },
        })
    }
}

#[async_trait::async_trait]
impl ResultSink for ElasticsearchSink {
    async fn init(&self) -> Result<(), ScanError> {
        let ping = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(Self::init_failure)?;
        if !ping.status().is_success() {
            return Err(Self::init_failure(format!(
                "{} answered {}",
                self.url,
                ping.status()
            )));
        }

        let index_url = format!("{}/{}", self.url, INDEX);
        let exists = self
            .client
            .head(&index_url)
            .send()
            .await
            .map_err(Self::init_failure)?;
        if exists.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::info!("creating elasticsearch index {}", INDEX);
            let created = self
                .client
                .put(&index_url)
                .send()
                .await
                .map_err(Self::init_failure)?;
            if !created.status().is_success() {
                return Err(Self::init_failure(format!(
                    "index creation answered {}",
                    created.status()
                )));
            }
        }

        Ok(())
    }

    async fn store(&self, record: &PluginResults) -> Result<(), ScanError> {
        let url = format!(
            "{}/{}/_update/{}?retry_on_conflict=3",
            self.url, INDEX, record.id
        );
        let response = self
            .client
            .post(&url)
            .json(&Self::update_body(record))
            .send()
            .await
            .map_err(Self::store_failure)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::store_failure(format!("{}: {}", status, body)));
        }

        tracing::debug!(
            plugin = PLUGIN_NAME,
            category = PLUGIN_CATEGORY,
            id = %record.id,
            "stored results in elasticsearch"
        );
        Ok(())
    }
}

/// Sink that drops every record
pub struct NoOpSink;

#[async_trait::async_trait]
impl ResultSink for NoOpSink {
    async fn init(&self) -> Result<(), ScanError> {
        Ok(())
    }

    async fn store(&self, record: &PluginResults) -> Result<(), ScanError> {
        tracing::warn!("NoOpSink: discarding results for {}", record.id);
        Ok(())
    }
}

/// Factory function to create the sink selected by config
pub fn create_sink(backend: &str, url: String) -> Box<dyn ResultSink> {
    match backend.to_lowercase().as_str() {
        "elasticsearch" | "es" => Box::new(ElasticsearchSink::new(url)),
        "noop" | "none" | "disabled" => Box::new(NoOpSink),
        _ => {
            tracing::warn!("Unknown storage backend '{}', using NoOpSink", backend);
            Box::new(NoOpSink)
        }
    }
}
