//! Configuration management with YAML support

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Error;
use crate::remote::PrivacyLevel;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub mirror: MirrorConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub journal: JournalConfig,
}

/// E-reader database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_path")]
    pub path: String,

    /// Write resolved ISBN-13s back into `content.ISBN`
    #[serde(default)]
    pub write_back_isbn: bool,
}

/// Local mirror database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default = "default_mirror_path")]
    pub path: String,
}

/// Remote journal service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Name of the environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Extra PEM trust root for the service host
    #[serde(default)]
    pub ca_cert_path: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Defaults applied to every posted journal entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub privacy: PrivacyLevel,

    #[serde(default)]
    pub spoiler: bool,
}

pub const SOURCE_PATH_ENV: &str = "KSCRIBBLER_DB_PATH";
pub const MIRROR_PATH_ENV: &str = "KSCRIBBLER_MIRROR_PATH";

// Default value functions
fn default_source_path() -> String {
    "/mnt/onboard/.kobo/KoboReader.sqlite".to_string()
}

fn default_mirror_path() -> String {
    "/mnt/onboard/.adds/kscribbler.sqlite".to_string()
}

fn default_endpoint() -> String {
    "https://api.hardcover.app/v1/graphql".to_string()
}

fn default_token_env() -> String {
    "HARDCOVER_API_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            write_back_isbn: false,
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            path: default_mirror_path(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token_env: default_token_env(),
            ca_cert_path: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            privacy: PrivacyLevel::Public,
            spoiler: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./kscribbler.yaml (current directory)
    /// 3. ~/.config/kscribbler/kscribbler.yaml
    ///
    /// Environment overrides are applied afterwards.
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "kscribbler.yaml".to_string(),
            shellexpand::tilde("~/.config/kscribbler/kscribbler.yaml").to_string(),
        ];

        let mut config = Config::default();
        for search_path in &search_paths {
            if std::path::Path::new(search_path).exists() {
                let content = std::fs::read_to_string(search_path)?;
                config = serde_yaml::from_str(&content)?;
                break;
            }
        }

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(path) = non_empty_env(SOURCE_PATH_ENV) {
            self.source.path = path;
        }
        if let Some(path) = non_empty_env(MIRROR_PATH_ENV) {
            self.mirror.path = path;
        }
    }

    pub fn source_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.source.path).to_string())
    }

    pub fn mirror_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.mirror.path).to_string())
    }

    pub fn ca_cert_path(&self) -> Option<PathBuf> {
        self.remote
            .ca_cert_path
            .as_ref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
    }

    /// Bearer token for the remote service. Absent or blank is fatal.
    pub fn api_token(&self) -> crate::Result<String> {
        non_empty_env(&self.remote.token_env)
            .ok_or_else(|| Error::MissingCredential(self.remote.token_env.clone()))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
