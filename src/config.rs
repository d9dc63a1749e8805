//! Configuration loader and validator for the playlist → Kafka watcher.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub youtube: Youtube,
    pub kafka: Kafka,
    pub schema_registry: SchemaRegistry,
}

/// YouTube Data API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Youtube {
    pub api_key: String,
    pub playlist_id: String,
    #[serde(default = "default_youtube_base_url")]
    pub base_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Kafka producer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Kafka {
    pub bootstrap_servers: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u64,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
    /// Turn failed or unresolved deliveries into a failed run.
    #[serde(default)]
    pub fail_on_delivery_error: bool,
    /// Extra librdkafka properties, passed through verbatim.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// Confluent-compatible schema registry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaRegistry {
    pub url: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_youtube_base_url() -> String {
    "https://www.googleapis.com/youtube/v3/".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_topic() -> String {
    "youtube_videos".to_string()
}

fn default_message_timeout_ms() -> u64 {
    30_000
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_subject() -> String {
    "youtube_videos-value".to_string()
}

impl Kafka {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Youtube {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - A non-empty `YOUTUBE_API_KEY` environment variable replaces `youtube.api_key`.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        if !key.trim().is_empty() {
            cfg.youtube.api_key = key;
        }
    }
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.youtube.api_key.trim().is_empty() {
        return Err(ConfigError::Invalid("youtube.api_key must be non-empty"));
    }
    if cfg.youtube.playlist_id.trim().is_empty() {
        return Err(ConfigError::Invalid("youtube.playlist_id must be non-empty"));
    }
    if reqwest::Url::parse(&cfg.youtube.base_url).is_err() {
        return Err(ConfigError::Invalid("youtube.base_url must be a valid URL"));
    }
    // The API caps maxResults at 50.
    if cfg.youtube.page_size == 0 || cfg.youtube.page_size > 50 {
        return Err(ConfigError::Invalid("youtube.page_size must be in 1..=50"));
    }
    if cfg.youtube.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("youtube.request_timeout_secs must be > 0"));
    }

    if cfg.kafka.bootstrap_servers.trim().is_empty() {
        return Err(ConfigError::Invalid("kafka.bootstrap_servers must be non-empty"));
    }
    if cfg.kafka.topic.trim().is_empty() {
        return Err(ConfigError::Invalid("kafka.topic must be non-empty"));
    }
    if cfg.kafka.message_timeout_ms == 0 {
        return Err(ConfigError::Invalid("kafka.message_timeout_ms must be > 0"));
    }
    if cfg.kafka.drain_timeout_secs == 0 {
        return Err(ConfigError::Invalid("kafka.drain_timeout_secs must be > 0"));
    }

    if reqwest::Url::parse(&cfg.schema_registry.url).is_err() {
        return Err(ConfigError::Invalid("schema_registry.url must be a valid URL"));
    }
    if cfg.schema_registry.subject.trim().is_empty() {
        return Err(ConfigError::Invalid("schema_registry.subject must be non-empty"));
    }
    if cfg.schema_registry.username.is_some() != cfg.schema_registry.password.is_some() {
        return Err(ConfigError::Invalid(
            "schema_registry.username and schema_registry.password must be set together",
        ));
    }

    Ok(())
}

/// Returns a complete example YAML document.
pub fn example() -> &'static str {
    r#"youtube:
  api_key: "YOUR_GOOGLE_API_KEY"
  playlist_id: "PLAYLIST_ID"
  page_size: 50

kafka:
  bootstrap_servers: "localhost:9092"
  topic: "youtube_videos"
  message_timeout_ms: 30000
  drain_timeout_secs: 30
  properties:
    acks: "all"

schema_registry:
  url: "http://localhost:8081"
  subject: "youtube_videos-value"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.youtube.base_url, "https://www.googleapis.com/youtube/v3/");
        assert_eq!(cfg.youtube.request_timeout_secs, 30);
        assert!(!cfg.kafka.fail_on_delivery_error);
        assert_eq!(cfg.kafka.properties.get("acks").map(String::as_str), Some("all"));
        assert!(cfg.schema_registry.username.is_none());
    }

    #[test]
    fn invalid_api_key() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.youtube.api_key = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("youtube.api_key")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_page_size() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.youtube.page_size = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        cfg.youtube.page_size = 51;
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("page_size")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_kafka_and_registry() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.kafka.bootstrap_servers = "".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("bootstrap_servers")), _ => panic!("wrong error") }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.schema_registry.url = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.schema_registry.username = Some("user".into());
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("together")), _ => panic!("wrong error") }
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.youtube.playlist_id, "PLAYLIST_ID");
        assert_eq!(cfg.kafka.drain_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("missing.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
