//! Extension configuration.
//!
//! Built either from a JSON file ([`ExtensionConfig::load`]) or from
//! environment variables ([`ExtensionConfig::from_env`]). Every field has a
//! default so partial files are accepted; the access pair is validated when
//! the extension is constructed, not here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::credentials::AccessCredentials;
use crate::error::ExtensionError;

/// Relative path of the registration endpoint.
pub const REGISTER_URL: &str = "/api/v1/collector/register";
/// Relative path of the heartbeat endpoint.
pub const HEARTBEAT_URL: &str = "/api/v1/collector/heartbeat";

pub const DEFAULT_API_BASE_URL: &str = "https://open-collectors.sumologic.com";
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_EXTENSION_ID: &str = "collector_identity";

/// Directory under `$HOME` holding stored credentials by default.
const CREDENTIALS_DIRECTORY: &str = ".collector-identity/credentials";

/// Configuration of a [`CollectorExtension`](crate::CollectorExtension).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtensionConfig {
    /// Identifier of this extension instance within the host.
    pub extension_id: String,
    /// Access pair used for the registration call.
    pub credentials: AccessCredentials,
    /// Collector name. When empty a `<hostname>-<uuid>` name is generated
    /// on first registration and reused from the store afterwards.
    pub collector_name: String,
    pub collector_description: String,
    pub collector_category: String,
    /// Free-form fields attached to the collector on registration.
    pub collector_fields: serde_json::Map<String, serde_json::Value>,
    pub api_base_url: String,
    /// Heartbeat period in milliseconds; `0` selects the default.
    pub heartbeat_interval_ms: u64,
    /// Where credentials are persisted. `None` selects the default
    /// directory under the user's home.
    pub collector_credentials_directory: Option<PathBuf>,
    /// Re-register even when stored credentials exist.
    pub clobber: bool,
    /// Ask the backend to delete the collector after a period of
    /// inactivity.
    pub ephemeral: bool,
    pub time_zone: String,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            extension_id: DEFAULT_EXTENSION_ID.to_string(),
            credentials: AccessCredentials::default(),
            collector_name: String::new(),
            collector_description: String::new(),
            collector_category: String::new(),
            collector_fields: serde_json::Map::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            heartbeat_interval_ms: 0,
            collector_credentials_directory: None,
            clobber: false,
            ephemeral: false,
            time_zone: String::new(),
        }
    }
}

impl ExtensionConfig {
    /// Read a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ExtensionError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ExtensionError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| ExtensionError::Config(format!("invalid {}: {e}", path.display())))
    }

    /// Build the configuration from environment variables.
    ///
    /// | Variable                           | Default                                   |
    /// |------------------------------------|-------------------------------------------|
    /// | `COLLECTOR_ACCESS_ID`              | —                                         |
    /// | `COLLECTOR_ACCESS_KEY`             | —                                         |
    /// | `COLLECTOR_NAME`                   | generated                                 |
    /// | `COLLECTOR_DESCRIPTION`            | empty                                     |
    /// | `COLLECTOR_CATEGORY`               | empty                                     |
    /// | `COLLECTOR_API_BASE_URL`           | `https://open-collectors.sumologic.com`   |
    /// | `COLLECTOR_HEARTBEAT_INTERVAL_MS`  | `15000`                                   |
    /// | `COLLECTOR_CREDENTIALS_DIR`        | `$HOME/.collector-identity/credentials`   |
    /// | `COLLECTOR_CLOBBER`                | `false`                                   |
    /// | `COLLECTOR_EPHEMERAL`              | `false`                                   |
    /// | `COLLECTOR_TIME_ZONE`              | empty                                     |
    /// | `COLLECTOR_EXTENSION_ID`           | `collector_identity`                      |
    ///
    /// Flags accept `true`/`false`, `1`/`0`, `yes`/`no` and `on`/`off`, in any
    /// case. Anything else leaves the flag off.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build the configuration from `lookup`, which resolves the variables
    /// documented on [`from_env`](Self::from_env).
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = &lookup;
        let flag = |name: &str| var(name).and_then(|v| parse_flag(&v)).unwrap_or(false);

        Self {
            extension_id: var("COLLECTOR_EXTENSION_ID").unwrap_or(defaults.extension_id),
            credentials: AccessCredentials::new(
                var("COLLECTOR_ACCESS_ID").unwrap_or_default(),
                var("COLLECTOR_ACCESS_KEY").unwrap_or_default(),
            ),
            collector_name: var("COLLECTOR_NAME").unwrap_or_default(),
            collector_description: var("COLLECTOR_DESCRIPTION").unwrap_or_default(),
            collector_category: var("COLLECTOR_CATEGORY").unwrap_or_default(),
            collector_fields: defaults.collector_fields,
            api_base_url: var("COLLECTOR_API_BASE_URL").unwrap_or(defaults.api_base_url),
            heartbeat_interval_ms: var("COLLECTOR_HEARTBEAT_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.heartbeat_interval_ms),
            collector_credentials_directory: var("COLLECTOR_CREDENTIALS_DIR").map(PathBuf::from),
            clobber: flag("COLLECTOR_CLOBBER"),
            ephemeral: flag("COLLECTOR_EPHEMERAL"),
            time_zone: var("COLLECTOR_TIME_ZONE").unwrap_or_default(),
        }
    }

    /// Effective heartbeat period.
    pub fn heartbeat_interval(&self) -> Duration {
        if self.heartbeat_interval_ms == 0 {
            DEFAULT_HEARTBEAT_INTERVAL
        } else {
            Duration::from_millis(self.heartbeat_interval_ms)
        }
    }

    /// Effective credentials directory.
    pub fn credentials_directory(&self) -> PathBuf {
        self.collector_credentials_directory
            .clone()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(CREDENTIALS_DIRECTORY))
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let cfg = ExtensionConfig::default();
        assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(15));
        assert_eq!(cfg.extension_id, "collector_identity");
        assert!(!cfg.clobber);
        assert!(cfg
            .credentials_directory()
            .ends_with(".collector-identity/credentials"));
    }

    #[test]
    fn explicit_interval_and_directory() {
        let cfg = ExtensionConfig {
            heartbeat_interval_ms: 250,
            collector_credentials_directory: Some(PathBuf::from("/var/lib/collector")),
            ..ExtensionConfig::default()
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_millis(250));
        assert_eq!(cfg.credentials_directory(), PathBuf::from("/var/lib/collector"));
    }

    #[test]
    fn partial_json_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collector.json");
        std::fs::write(
            &path,
            r#"{
                "credentials": { "accessId": "A", "accessKey": "B" },
                "collectorFields": { "team": "infra" },
                "clobber": true
            }"#,
        )
        .unwrap();

        let cfg = ExtensionConfig::load(&path).unwrap();
        assert_eq!(cfg.credentials, AccessCredentials::new("A", "B"));
        assert!(cfg.clobber);
        assert_eq!(cfg.collector_fields["team"], "infra");
        assert_eq!(cfg.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn unreadable_file_is_config_error() {
        let err = ExtensionConfig::load("/nonexistent/collector.json").unwrap_err();
        assert!(matches!(err, ExtensionError::Config(_)));
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn reads_collector_variables() {
        let cfg = ExtensionConfig::from_vars(vars(&[
            ("COLLECTOR_ACCESS_ID", "env-id"),
            ("COLLECTOR_ACCESS_KEY", "env-key"),
            ("COLLECTOR_HEARTBEAT_INTERVAL_MS", "500"),
            ("COLLECTOR_CLOBBER", "true"),
        ]));
        assert_eq!(cfg.credentials, AccessCredentials::new("env-id", "env-key"));
        assert_eq!(cfg.heartbeat_interval(), Duration::from_millis(500));
        assert!(cfg.clobber);
        assert!(!cfg.ephemeral);
    }

    #[test]
    fn missing_variables_use_defaults() {
        let cfg = ExtensionConfig::from_vars(|_| None);
        let defaults = ExtensionConfig::default();
        assert_eq!(cfg.api_base_url, defaults.api_base_url);
        assert_eq!(cfg.extension_id, defaults.extension_id);
        assert_eq!(cfg.heartbeat_interval(), DEFAULT_HEARTBEAT_INTERVAL);
        assert!(!cfg.clobber);
    }

    #[test]
    fn flags_accept_common_spellings() {
        for value in ["1", "yes", "YES", "on", "True", " true "] {
            let cfg = ExtensionConfig::from_vars(vars(&[("COLLECTOR_EPHEMERAL", value)]));
            assert!(cfg.ephemeral, "{value:?} should enable the flag");
        }
        for value in ["0", "no", "off", "false", "", "maybe"] {
            let cfg = ExtensionConfig::from_vars(vars(&[("COLLECTOR_EPHEMERAL", value)]));
            assert!(!cfg.ephemeral, "{value:?} should leave the flag off");
        }
    }
}
