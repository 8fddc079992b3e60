//! Client configuration: environment first, optional YAML file on top.

use annomatrix::{ClipRange, ExplorerDefaults};
use anno_protocol::ServerConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_prefix: String,
    pub api_version: String,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ClientConfig {
    /// Build from a key lookup; missing or unparsable keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            base_url: lookup("ANNO_BASE_URL").unwrap_or_else(|| "http://localhost:5005".to_string()),
            api_prefix: lookup("ANNO_API_PREFIX").unwrap_or_else(|| "/api/".to_string()),
            api_version: lookup("ANNO_API_VERSION").unwrap_or_else(|| "v0.2/".to_string()),
            request_timeout: Duration::from_secs(
                lookup("ANNO_REQUEST_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Absolute URL of an API endpoint, e.g. `schema` or `data/obs`.
    pub fn api_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_matches('/'),
            self.api_version.trim_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

/// Configuration from the process environment. Call `dotenvy::dotenv()`
/// first to pick up a `.env` file.
pub fn load_config() -> ClientConfig {
    ClientConfig::from_lookup(|key| std::env::var(key).ok())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    base_url: Option<String>,
    api_prefix: Option<String>,
    api_version: Option<String>,
    request_timeout_secs: Option<u64>,
}

/// Environment configuration overridden by the keys set in a YAML file.
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<ClientConfig> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).context(format!("Failed to read client config: {:?}", path))?;
    let file: ConfigFile = serde_yaml::from_str(&raw).context("Failed to parse client config")?;
    Ok(apply_file(load_config(), file))
}

fn apply_file(mut config: ClientConfig, file: ConfigFile) -> ClientConfig {
    if let Some(base_url) = file.base_url {
        config.base_url = base_url;
    }
    if let Some(prefix) = file.api_prefix {
        config.api_prefix = prefix;
    }
    if let Some(version) = file.api_version {
        config.api_version = version;
    }
    if let Some(secs) = file.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    config
}

/// Server parameters merged over the built-in defaults.
pub fn explorer_defaults(server: &ServerConfig) -> ExplorerDefaults {
    let mut defaults = ExplorerDefaults::default();
    let params = &server.parameters;
    if let Some(max) = params.max_category_items {
        defaults.max_category_items = max;
    }
    if let Some([min, max]) = params.clip_quantiles {
        match ClipRange::new(min, max) {
            Ok(range) => defaults.clip_quantiles = range,
            Err(e) => warn!(error = %e, "ignoring server clip quantiles"),
        }
    }
    defaults
}

#[cfg(test)]
mod config_test {
    use super::*;
    use anno_protocol::ServerParameters;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_and_overrides() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url("schema"), "http://localhost:5005/api/v0.2/schema");
        assert_eq!(config.request_timeout, Duration::from_secs(30));

        let env: HashMap<&str, &str> = [
            ("ANNO_BASE_URL", "https://cells.example.org/"),
            ("ANNO_REQUEST_TIMEOUT_SECS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_url("/data/obs"), "https://cells.example.org/api/v0.2/data/obs");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_yaml_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "baseUrl: http://10.0.0.2:8080\nrequestTimeoutSecs: 5").unwrap();

        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.base_url, "http://10.0.0.2:8080");
        assert_eq!(config.request_timeout, Duration::from_secs(5));

        assert!(load_config_file("/nonexistent/anno.yml").is_err());
    }

    #[test]
    fn test_server_parameters_merge() {
        let server = ServerConfig {
            parameters: ServerParameters {
                max_category_items: Some(50),
                clip_quantiles: Some([0.9, 0.1]),
                dataset_title: None,
            },
        };
        let defaults = explorer_defaults(&server);
        assert_eq!(defaults.max_category_items, 50);
        // inverted range is dropped
        assert_eq!(defaults.clip_quantiles, ClipRange::FULL);
    }
}
