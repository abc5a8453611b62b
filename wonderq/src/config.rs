//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use wonderq_queue::QueueConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub queue: QueueSettings,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QueueSettings {
    /// Queue served on the root routes
    #[serde(default = "default_queue_name")]
    pub name: String,

    /// Lease duration applied when a push has no timeout
    #[serde(default = "default_lease_timeout_ms")]
    pub lease_timeout_ms: u64,

    /// Messages leased by a GET on the default queue without `amount`
    #[serde(default = "default_receive_amount")]
    pub receive_amount: usize,

    /// Messages leased by a GET on a named queue without `amount`
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: default_queue_name(),
            lease_timeout_ms: default_lease_timeout_ms(),
            receive_amount: default_receive_amount(),
            batch_size: default_batch_size(),
        }
    }
}

impl QueueSettings {
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            lease_duration: Duration::from_millis(self.lease_timeout_ms),
            receive_batch: self.batch_size,
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_queue_name() -> String {
    "wonderq".to_string()
}

fn default_lease_timeout_ms() -> u64 {
    1000
}

fn default_receive_amount() -> usize {
    1
}

fn default_batch_size() -> usize {
    10
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Without an explicit path, an optional `wonderq.toml` in the working
    /// directory is used. Environment variables look like
    /// `WONDERQ__QUEUE__LEASE_TIMEOUT_MS`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("wonderq").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("WONDERQ")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.queue.name, "wonderq");
        assert_eq!(
            config.queue.queue_config(),
            QueueConfig {
                lease_duration: Duration::from_millis(1000),
                receive_batch: 10,
            }
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [queue]
            lease_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.queue.lease_timeout_ms, 250);
        assert_eq!(config.queue.receive_amount, 1);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("wonderq-test-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[server]\nport = 8080\n\n[queue]\nname = \"jobs\"\nbatch_size = 4\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.queue.name, "jobs");
        assert_eq!(config.queue.batch_size, 4);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let path = std::env::temp_dir().join("wonderq-does-not-exist.toml");
        assert!(Config::load(Some(&path)).is_err());
    }
}
