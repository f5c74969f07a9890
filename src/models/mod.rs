use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Plugin name used in logs, storage records and the JSON envelope.
pub const PLUGIN_NAME: &str = "avast";
/// Plugin category used in logs and storage records.
pub const PLUGIN_CATEGORY: &str = "av";

/// Verdict for a single scanned file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResults {
    pub infected: bool,
    /// Signature name reported by the engine, empty when clean
    #[serde(rename = "result")]
    pub signature_match: String,
    pub engine: String,
    pub database: String,
    pub updated: String,
    /// Rendered markdown table; cleared before the verdict goes on the wire
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub markdown: String,
}

/// JSON envelope: `{"avast": {...}}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvastReport {
    #[serde(rename = "avast")]
    pub results: ScanResults,
}

impl AvastReport {
    pub fn new(results: ScanResults) -> Self {
        Self { results }
    }
}

/// Generic record handed to a result sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginResults {
    pub id: String,
    pub name: String,
    pub category: String,
    pub data: Map<String, Value>,
}
