//! Configuration for ingest-jobs
//!
//! Bootstrap settings come from a TOML file located by
//! [`ingest_common::config::resolve_config_path`]: `--config` →
//! `INGEST_CONFIG` → platform config file → built-in defaults. A few
//! deployment-specific values can then be overridden from the environment.

use ingest_common::config::{default_data_dir, env_override, load_toml, resolve_config_path, LoggingConfig};
use ingest_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "catalog-ingest";
pub const CONFIG_ENV_VAR: &str = "INGEST_CONFIG";

/// Top-level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// SQLite database holding import jobs
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub messaging: MessagingConfig,

    #[serde(default)]
    pub import: ImportConfig,
}

/// STOMP broker connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    /// Virtual host sent in the CONNECT frame (defaults to `host`)
    #[serde(default)]
    pub vhost: Option<String>,

    #[serde(default)]
    pub login: Option<String>,

    #[serde(default)]
    pub passcode: Option<String>,

    /// Bound on connecting and on each broker reply
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Logical topic → broker destination
    #[serde(default = "default_destinations")]
    pub destinations: BTreeMap<String, String>,
}

/// Import workflow settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Base URL jobs are addressed by
    #[serde(default = "default_job_url_base")]
    pub job_url_base: String,

    /// Local directory listing the available binaries archives
    #[serde(default = "default_binaries_dir")]
    pub binaries_dir: PathBuf,

    /// Location prefix the worker resolves archives against
    #[serde(default)]
    pub binaries_base_location: String,

    /// Jobs per listing page
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_database_path() -> PathBuf {
    default_data_dir(APP_NAME).join("ingest.db")
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    61613
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_destinations() -> BTreeMap<String, String> {
    let mut destinations = BTreeMap::new();
    destinations.insert("jobs".to_string(), "/queue/import.jobs".to_string());
    destinations.insert("status".to_string(), "/topic/import.jobs.status".to_string());
    destinations
}

fn default_job_url_base() -> String {
    "http://localhost:3000".to_string()
}

fn default_binaries_dir() -> PathBuf {
    default_data_dir(APP_NAME).join("binaries")
}

fn default_page_size() -> u32 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            logging: LoggingConfig::default(),
            messaging: MessagingConfig::default(),
            import: ImportConfig::default(),
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            vhost: None,
            login: None,
            passcode: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            destinations: default_destinations(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            job_url_base: default_job_url_base(),
            binaries_dir: default_binaries_dir(),
            binaries_base_location: String::new(),
            page_size: default_page_size(),
        }
    }
}

impl MessagingConfig {
    /// Broker destination for a logical topic
    ///
    /// Unmapped topics are sent to `/queue/<topic>`.
    pub fn destination(&self, topic: &str) -> String {
        self.destinations
            .get(topic)
            .cloned()
            .unwrap_or_else(|| format!("/queue/{}", topic))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ServiceConfig {
    /// Configuration file to use, if any
    pub fn resolve_path(cli_path: Option<&Path>) -> Option<PathBuf> {
        resolve_config_path(cli_path, CONFIG_ENV_VAR, APP_NAME)
    }

    /// Load from `path` (or built-in defaults), then apply environment
    /// overrides and validate
    ///
    /// Runs before logging is set up, so it logs nothing itself.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => load_toml::<ServiceConfig>(path)?,
            None => ServiceConfig::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `INGEST_DATABASE_PATH`, `INGEST_BROKER_HOST`, `INGEST_BROKER_PORT`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(path) = env_override("INGEST_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(host) = env_override("INGEST_BROKER_HOST") {
            self.messaging.host = host;
        }
        if let Some(port) = env_override("INGEST_BROKER_PORT") {
            self.messaging.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid INGEST_BROKER_PORT '{}': {}", port, e)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.import.page_size == 0 {
            return Err(Error::Config("import.page_size must be at least 1".to_string()));
        }
        if self.messaging.connect_timeout_ms == 0 {
            return Err(Error::Config(
                "messaging.connect_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
