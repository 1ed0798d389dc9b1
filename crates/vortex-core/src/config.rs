//! Layered configuration: compiled-in defaults, an optional `config.yml`, and
//! `VORTEX_`-prefixed environment variable overrides.
//!
//! There is no mutable global configuration singleton (the re-architecture point
//! the original design notes call out): `Configuration::load` is called once in
//! `main`, and the resulting value is passed by reference or clone into the
//! Source, Sink, and Coordinator constructors.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_FILE_STEM: &str = "config";
const ENV_PREFIX: &str = "VORTEX";

/// Errors specific to loading or initializing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `init` was asked to write a config file that already exists. Distinct
    /// from other I/O failures so callers can treat it as a soft, expected error.
    #[error("configuration file already exists")]
    AlreadyExists,

    #[error("could not read configuration: {0}")]
    Read(#[source] anyhow::Error),

    #[error("could not write configuration: {0}")]
    Write(#[source] std::io::Error),

    #[error("could not parse configuration: {0}")]
    Parse(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub kafka: KafkaConfig,
    pub mongo: MongoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KafkaConfig {
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,
    #[serde(default = "default_group_name")]
    pub group_name: String,
    #[serde(default = "default_session_timeout_sec")]
    pub session_timeout_sec: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoConfig {
    #[serde(default = "default_mongo_url")]
    pub url: String,
    #[serde(default = "default_mongo_database")]
    pub database: String,
    #[serde(default = "default_mongo_collection")]
    pub collection: String,
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
    #[serde(default = "default_flush_interval_sec")]
    pub flush_interval_sec: u64,
    #[serde(default)]
    pub write_concern: MongoWriteConcern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoWriteConcern {
    #[serde(default = "default_writes")]
    pub writes: i32,
    #[serde(default)]
    pub journal: bool,
}

impl Default for MongoWriteConcern {
    fn default() -> Self {
        Self {
            writes: default_writes(),
            journal: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}
fn default_topics() -> Vec<String> {
    vec!["status".to_string()]
}
fn default_group_name() -> String {
    "vortex".to_string()
}
fn default_session_timeout_sec() -> u64 {
    40
}
fn default_mongo_url() -> String {
    "mongodb://localhost:27017".to_string()
}
fn default_mongo_database() -> String {
    "horizon".to_string()
}
fn default_mongo_collection() -> String {
    "status".to_string()
}
fn default_bulk_size() -> usize {
    500
}
fn default_flush_interval_sec() -> u64 {
    30
}
fn default_writes() -> i32 {
    1
}
fn default_metrics_port() -> u16 {
    8080
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics: MetricsConfig::default(),
            kafka: KafkaConfig {
                brokers: default_brokers(),
                topics: default_topics(),
                group_name: default_group_name(),
                session_timeout_sec: default_session_timeout_sec(),
            },
            mongo: MongoConfig {
                url: default_mongo_url(),
                database: default_mongo_database(),
                collection: default_mongo_collection(),
                bulk_size: default_bulk_size(),
                flush_interval_sec: default_flush_interval_sec(),
                write_concern: MongoWriteConcern::default(),
            },
        }
    }
}

impl Configuration {
    /// Loads configuration from `dir/config.yml` (if present) layered over compiled-in
    /// defaults, with `VORTEX_`-prefixed environment variables (`.` replaced by `_`)
    /// taking highest precedence.
    ///
    /// A missing file is not an error: `serve` is expected to fall back to defaults
    /// and the environment, logging that fact at the call site.
    pub fn load(dir: &Path) -> Result<(Self, bool), ConfigError> {
        let config_path = dir.join(CONFIG_FILE_STEM);
        let file_found = config_path.with_extension("yml").exists()
            || config_path.with_extension("yaml").exists();

        let builder = config::Config::builder()
            .set_default("logLevel", default_log_level())
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("metrics.enabled", false)
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("metrics.port", default_metrics_port() as i64)
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("kafka.brokers", default_brokers())
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("kafka.topics", default_topics())
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("kafka.groupName", default_group_name())
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("kafka.sessionTimeoutSec", default_session_timeout_sec() as i64)
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("mongo.url", default_mongo_url())
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("mongo.database", default_mongo_database())
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("mongo.collection", default_mongo_collection())
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("mongo.bulkSize", default_bulk_size() as i64)
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("mongo.flushIntervalSec", default_flush_interval_sec() as i64)
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("mongo.writeConcern.writes", default_writes() as i64)
            .map_err(|e| ConfigError::Parse(e.into()))?
            .set_default("mongo.writeConcern.journal", false)
            .map_err(|e| ConfigError::Parse(e.into()))?
            .add_source(config::File::from(config_path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("_")
                    .try_parsing(true),
            );

        let raw = builder.build().map_err(|e| ConfigError::Read(e.into()))?;
        let configuration: Configuration = raw.try_deserialize().map_err(|e| ConfigError::Parse(e.into()))?;
        Ok((configuration, file_found))
    }

    /// Writes the compiled-in defaults to `dir/config.yml`, for `vortex init`.
    ///
    /// Returns [`ConfigError::AlreadyExists`] (not a generic I/O error) if the file
    /// is already there, mirroring the distinction the original draws between
    /// "file exists" and other write failures.
    pub fn init_default_file(dir: &Path) -> Result<(), ConfigError> {
        let path = dir.join(format!("{CONFIG_FILE_STEM}.yml"));
        if path.exists() {
            return Err(ConfigError::AlreadyExists);
        }
        let yaml = serde_yaml::to_string(&Configuration::default())
            .map_err(|e| ConfigError::Parse(e.into()))?;
        std::fs::write(&path, yaml).map_err(ConfigError::Write)
    }

    /// Parses `logLevel` into a `tracing` filter directive, returning the typed
    /// error the original panics on ("unknown log level").
    pub fn parsed_log_level(&self) -> Result<tracing::Level, crate::VortexError> {
        self.log_level
            .parse()
            .map_err(|_| crate::VortexError::UnknownLogLevel(self.log_level.clone()))
    }
}
