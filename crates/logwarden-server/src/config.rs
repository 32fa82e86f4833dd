use anyhow::{bail, Context};
use logwarden_ingest::BatchConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            database: DatabaseConfig::default(),
            broker: BrokerConfig::default(),
            ingest: IngestConfig::default(),
            alert: AlertConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    /// In-process broker; records arrive through `POST /v1/logs`.
    Memory,
    /// Kafka consumer group. Needs the `kafka` feature.
    Kafka,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_kind")]
    pub kind: BrokerKind,
    #[serde(default = "default_brokers")]
    pub brokers: Vec<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// `earliest` or `latest`, used when the group has no committed offset.
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// Partition count of the in-process broker.
    #[serde(default = "default_memory_partitions")]
    pub memory_partitions: i32,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            kind: default_broker_kind(),
            brokers: default_brokers(),
            topic: default_topic(),
            group_id: default_group_id(),
            auto_offset_reset: default_auto_offset_reset(),
            memory_partitions: default_memory_partitions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_batch_max_records")]
    pub batch_max_records: usize,
    #[serde(default = "default_batch_max_wait_ms")]
    pub batch_max_wait_ms: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_retry_backoff_ms")]
    pub max_retry_backoff_ms: u64,
    #[serde(default = "default_shutdown_flush_attempts")]
    pub shutdown_flush_attempts: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_max_records: default_batch_max_records(),
            batch_max_wait_ms: default_batch_max_wait_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_retry_backoff_ms: default_max_retry_backoff_ms(),
            shutdown_flush_attempts: default_shutdown_flush_attempts(),
        }
    }
}

impl IngestConfig {
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_records: self.batch_max_records,
            max_wait: Duration::from_millis(self.batch_max_wait_ms),
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            max_retry_backoff: Duration::from_millis(self.max_retry_backoff_ms),
            shutdown_flush_attempts: self.shutdown_flush_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_alert_enabled")]
    pub enabled: bool,
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: default_alert_enabled(),
            evaluation_interval_secs: default_evaluation_interval_secs(),
        }
    }
}

impl AlertConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_db_path() -> String {
    "data/logwarden.db".to_string()
}

fn default_broker_kind() -> BrokerKind {
    BrokerKind::Memory
}

fn default_brokers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_topic() -> String {
    "logs".to_string()
}

fn default_group_id() -> String {
    "log-processor-final".to_string()
}

fn default_auto_offset_reset() -> String {
    "latest".to_string()
}

fn default_memory_partitions() -> i32 {
    4
}

fn default_batch_max_records() -> usize {
    20
}

fn default_batch_max_wait_ms() -> u64 {
    2000
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_max_retry_backoff_ms() -> u64 {
    30_000
}

fn default_shutdown_flush_attempts() -> u32 {
    3
}

fn default_alert_enabled() -> bool {
    true
}

fn default_evaluation_interval_secs() -> u64 {
    30
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

impl ServerConfig {
    /// Read `path`, apply environment overrides and validate.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{path}'"))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut config: ServerConfig =
            toml::from_str(content).context("Failed to parse server config")?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override broker and database settings from the environment.
    /// `lookup` is `std::env::var` outside of tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(brokers) = lookup("KAFKA_BROKERS") {
            let brokers: Vec<String> = brokers
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect();
            if !brokers.is_empty() {
                self.broker.brokers = brokers;
            }
        }
        if let Some(topic) = lookup("KAFKA_TOPIC") {
            self.broker.topic = topic;
        }
        if let Some(group) = lookup("KAFKA_GROUP_ID") {
            self.broker.group_id = group;
        }
        if let Some(path) = lookup("LOGWARDEN_DB_PATH") {
            self.database.path = path;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ingest.batch_max_records == 0 {
            bail!("ingest.batch_max_records must be at least 1");
        }
        if self.ingest.batch_max_wait_ms == 0 {
            bail!("ingest.batch_max_wait_ms must be at least 1");
        }
        if self.ingest.retry_backoff_ms == 0 {
            bail!("ingest.retry_backoff_ms must be at least 1");
        }
        if self.ingest.max_retry_backoff_ms < self.ingest.retry_backoff_ms {
            bail!("ingest.max_retry_backoff_ms must not be below ingest.retry_backoff_ms");
        }
        if self.alert.evaluation_interval_secs == 0 {
            bail!("alert.evaluation_interval_secs must be at least 1");
        }
        if self.broker.topic.trim().is_empty() {
            bail!("broker.topic must not be empty");
        }
        if self.broker.group_id.trim().is_empty() {
            bail!("broker.group_id must not be empty");
        }
        if self.broker.memory_partitions < 1 {
            bail!("broker.memory_partitions must be at least 1");
        }
        if self.broker.kind == BrokerKind::Kafka && self.broker.brokers.is_empty() {
            bail!("broker.brokers must list at least one address");
        }
        Ok(())
    }
}
