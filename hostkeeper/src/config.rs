//! Client configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

impl ClientConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults; any other read failure is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

/// Where the auth and hosts backends live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL shared by both services
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Period of the background renew-and-refresh cycle
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Lifetime of a persisted token, in days
    #[serde(default = "default_token_expiry")]
    pub token_expiry_days: u32,
}

impl SessionConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            token_expiry_days: default_token_expiry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// JSON file holding the persisted host id and token
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_timeout() -> u64 { 30 }
fn default_refresh_interval() -> u64 { 3600 }
fn default_token_expiry() -> u32 { 7 }
fn default_credentials_path() -> PathBuf {
    PathBuf::from("hostkeeper-credentials.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [gateway]
            base_url = "https://hosts.example.org"

            [session]
            refresh_interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.gateway.base_url, "https://hosts.example.org");
        assert_eq!(config.gateway.timeout_secs, 30);
        assert_eq!(config.session.refresh_interval(), Duration::from_secs(60));
        assert_eq!(config.session.token_expiry_days, 7);
        assert_eq!(config.credentials.path, PathBuf::from("hostkeeper-credentials.json"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.session.refresh_interval_secs, 3600);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[session\nrefresh_interval_secs = ").unwrap();
        assert!(matches!(ClientConfig::load(&path), Err(ConfigError::Parse(_))));
    }
}
