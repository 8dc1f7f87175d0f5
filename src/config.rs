use std::env;
use std::time::Duration;

use crate::error::ConfigError;

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub kafka: KafkaConfig,
    pub consumer: ConsumerConfig,
}

impl Config {
    /// Reads `.env` (if present) and the process environment.
    /// Missing broker credentials are fatal at startup.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Ok(Self {
            server: ServerConfig::load()?,
            kafka: KafkaConfig::load()?,
            consumer: ConsumerConfig::load()?,
        })
    }
}

// --- MODULES ---

// SERVER
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            host: get_env("SERVER_HOST", "0.0.0.0")?,
            port: get_env("SERVER_PORT", "3000")?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// KAFKA
#[derive(Clone)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub ca: String,
    pub private_key: String,
    pub certificate: String,
    pub client_id: String,
    pub topics: Vec<String>,
    pub connection_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub retry_backoff_ms: u64,
}

impl KafkaConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            brokers:               split_list(&require_env("KAFKA_BROKERS")?),
            ca:                    require_env("KAFKA_CA")?,
            private_key:           require_env("KAFKA_PRIVATE_KEY")?,
            certificate:           require_env("KAFKA_CERTIFICATE")?,
            client_id:             get_env("KAFKA_CLIENT_ID", "spillerom-kafkaviewer")?,
            topics:                split_list(&get_env::<String>("KAFKA_TOPICS", "speilvendt.spillerom-behandlinger")?),
            connection_timeout_ms: get_env("KAFKA_CONNECTION_TIMEOUT_MS", "3000")?,
            request_timeout_ms:    get_env("KAFKA_REQUEST_TIMEOUT_MS", "30000")?,
            retry_backoff_ms:      get_env("KAFKA_RETRY_BACKOFF_MS", "100")?,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// Credentials stay out of logs.
impl std::fmt::Debug for KafkaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaConfig")
            .field("brokers", &self.brokers)
            .field("client_id", &self.client_id)
            .field("topics", &self.topics)
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish_non_exhaustive()
    }
}

// CONSUMER
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub buffer_capacity: usize,
    pub batch_size: usize,
    pub batch_window_ms: u64,
    pub close_timeout_ms: u64,
    pub default_max_messages: usize,
}

impl ConsumerConfig {
    fn load() -> Result<Self, ConfigError> {
        let config = Self {
            buffer_capacity:      get_env("CONSUMER_BUFFER_CAPACITY", "10000")?,
            batch_size:           get_env("CONSUMER_BATCH_SIZE", "500")?,
            batch_window_ms:      get_env("CONSUMER_BATCH_WINDOW_MS", "250")?,
            close_timeout_ms:     get_env("CONSUMER_CLOSE_TIMEOUT_MS", "5000")?,
            default_max_messages: get_env("CONSUMER_DEFAULT_MAX_MESSAGES", "100")?,
        };
        if config.buffer_capacity == 0 {
            return Err(ConfigError::Invalid { key: "CONSUMER_BUFFER_CAPACITY", value: "0".to_string() });
        }
        if config.batch_size == 0 {
            return Err(ConfigError::Invalid { key: "CONSUMER_BATCH_SIZE", value: "0".to_string() });
        }
        Ok(config)
    }

    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10_000,
            batch_size: 500,
            batch_window_ms: 250,
            close_timeout_ms: 5_000,
            default_max_messages: 100,
        }
    }
}

// --- PRIVATE HELPERS ---

fn get_env<T: std::str::FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError> {
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|_| ConfigError::Invalid { key, value })
}

fn require_env(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
