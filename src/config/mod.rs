use crate::services::runner::SubprocessPolicy;
use std::env;
use std::path::PathBuf;

/// Host layout and behaviour switches for the Avast plugin
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Scan command run against the target (default: "scan")
    pub scan_bin: String,

    /// Binary queried for engine and database versions (default: "/bin/scan")
    pub probe_bin: String,

    /// Init script that starts avastd (default: "/etc/init.d/avast")
    pub daemon_init: String,

    /// Vendor signature update script
    pub update_bin: String,

    /// Avast license file (default: "/etc/avast/license.avastlic")
    pub license_file: PathBuf,

    /// Sentinel holding the last signature update date (default: "/opt/malice/UPDATED")
    pub updated_file: PathBuf,

    /// Directory web uploads are staged in (default: "/malware")
    pub upload_dir: PathBuf,

    /// Port for the web service (default: 3993)
    pub web_port: u16,

    /// Maximum accepted upload size in bytes (default: 1 GB)
    pub max_file_size: usize,

    /// Accept "exit status 1" from the daemon start command (default: false)
    pub tolerate_exit_status_one: bool,

    /// Result sink backend: "elasticsearch" or "none" (default: "elasticsearch")
    pub storage_backend: String,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            scan_bin: "scan".to_string(),
            probe_bin: "/bin/scan".to_string(),
            daemon_init: "/etc/init.d/avast".to_string(),
            update_bin: "/var/lib/avast/Setup/avast.vpsupdate".to_string(),
            license_file: PathBuf::from("/etc/avast/license.avastlic"),
            updated_file: PathBuf::from("/opt/malice/UPDATED"),
            upload_dir: PathBuf::from("/malware"),
            web_port: 3993,
            max_file_size: 1024 * 1024 * 1024, // 1 GB
            tolerate_exit_status_one: false,
            storage_backend: "elasticsearch".to_string(),
        }
    }
}

impl PluginConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            scan_bin: env::var("AVAST_SCAN_BIN").unwrap_or(default.scan_bin),

            probe_bin: env::var("AVAST_PROBE_BIN").unwrap_or(default.probe_bin),

            daemon_init: env::var("AVAST_DAEMON_INIT").unwrap_or(default.daemon_init),

            update_bin: env::var("AVAST_UPDATE_BIN").unwrap_or(default.update_bin),

            license_file: env::var("AVAST_LICENSE_FILE")
                .map(PathBuf::from)
                .unwrap_or(default.license_file),

            updated_file: env::var("MALICE_UPDATED_FILE")
                .map(PathBuf::from)
                .unwrap_or(default.updated_file),

            upload_dir: env::var("MALICE_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.upload_dir),

            web_port: env::var("AVAST_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.web_port),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            tolerate_exit_status_one: env::var("AVAST_TOLERATE_EXIT_STATUS_1")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.tolerate_exit_status_one),

            storage_backend: env::var("MALICE_STORAGE_BACKEND")
                .unwrap_or(default.storage_backend),
        }
    }

    /// Exit status policy for starting avastd
    pub fn daemon_policy(&self) -> SubprocessPolicy {
        if self.tolerate_exit_status_one {
            SubprocessPolicy::TolerateExitStatusOne
        } else {
            SubprocessPolicy::Strict
        }
    }
}

/// Resolve the Elasticsearch URL: an explicit URL wins, otherwise a bare
/// host from `MALICE_ELASTICSEARCH` is expanded to `http://<host>:9200`.
pub fn resolve_elasticsearch_url(url: Option<String>) -> Option<String> {
    url.filter(|u| !u.is_empty()).or_else(|| {
        env::var("MALICE_ELASTICSEARCH")
            .ok()
            .filter(|h| !h.is_empty())
            .map(|host| format!("http://{}:9200", host))
    })
}

/// Proxy for the webhook callback: `MALICE_PROXY`, only when `--proxy` is on
pub fn webhook_proxy(enabled: bool) -> Option<String> {
    getopt("MALICE_PROXY").filter(|_| enabled)
}

/// Read an env var, treating empty values as unset
pub fn getopt(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PluginConfig::default();
        assert_eq!(config.scan_bin, "scan");
        assert_eq!(config.updated_file, PathBuf::from("/opt/malice/UPDATED"));
        assert_eq!(config.web_port, 3993);
        assert!(!config.tolerate_exit_status_one);
        assert_eq!(config.daemon_policy(), SubprocessPolicy::Strict);
    }

    #[test]
    fn test_tolerant_policy_from_env() {
        unsafe { env::set_var("AVAST_TOLERATE_EXIT_STATUS_1", "true") };
        let config = PluginConfig::from_env();
        unsafe { env::remove_var("AVAST_TOLERATE_EXIT_STATUS_1") };
        assert_eq!(
            config.daemon_policy(),
            SubprocessPolicy::TolerateExitStatusOne
        );
    }

    #[test]
    fn test_explicit_elasticsearch_url_wins() {
        assert_eq!(
            resolve_elasticsearch_url(Some("http://es:9200".to_string())),
            Some("http://es:9200".to_string())
        );
    }

    #[test]
    fn test_elasticsearch_host_fallback() {
        unsafe { env::set_var("MALICE_ELASTICSEARCH", "elastic") };
        let url = resolve_elasticsearch_url(Some(String::new()));
        unsafe { env::remove_var("MALICE_ELASTICSEARCH") };
        assert_eq!(url, Some("http://elastic:9200".to_string()));
    }

    #[test]
    fn test_webhook_proxy_requires_flag() {
        unsafe { env::set_var("MALICE_PROXY", "http://proxy.local:3128") };
        let off = webhook_proxy(false);
        let on = webhook_proxy(true);
        unsafe { env::remove_var("MALICE_PROXY") };
        assert_eq!(off, None);
        assert_eq!(on, Some("http://proxy.local:3128".to_string()));
        assert_eq!(webhook_proxy(true), None);
    }
}
