//! backend settings
//!
//! Every field has a default, so an empty file (or no file at all) is a valid configuration. Values are read from
//! (lowest priority first)
//! 1. the defaults below
//! 2. an optional TOML file
//! 3. environment variables prefixed with `KVWATCH__` (e.g. `KVWATCH__STREAM__POLL_INTERVAL_MS=1000`)
use crate::error::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub stream: StreamConfig,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Config::builder();

        if let Some(path) = path {
            tracing::info!(path = %path.display(), "loading settings");
            config = config.add_source(File::from(path).required(true));
        }

        config = config.add_source(
            Environment::with_prefix("KVWATCH")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("metadata.backend_nodes")
                .try_parsing(true),
        );

        Ok(config.build()?.try_deserialize()?)
    }
}

/// Startup probe backoff
///
/// Probes are retried with a delay starting at `base_delay_ms` and doubling each attempt, until the delays add up to
/// `max_elapsed_ms`.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct BootstrapPolicy {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_elapsed_ms")]
    pub max_elapsed_ms: u64,
}

impl BootstrapPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }
}

impl Default for BootstrapPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_elapsed_ms: default_max_elapsed_ms(),
        }
    }
}

/// HTTP metadata service
#[derive(Debug, Deserialize, Clone, Default)]
pub struct MetadataConfig {
    /// `host:port` entries, only the first one is used
    #[serde(default)]
    pub backend_nodes: Vec<String>,

    #[serde(default)]
    pub bootstrap: BootstrapPolicy,
}

impl MetadataConfig {
    pub const DEFAULT_URL: &'static str = "http://rancher-metadata";

    pub fn url(&self) -> String {
        match self.backend_nodes.first() {
            Some(node) if !node.is_empty() => format!("http://{node}"),
            _ => Self::DEFAULT_URL.to_string(),
        }
    }
}

/// Parameter store change stream
#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    #[serde(default = "default_stream_name")]
    pub stream_name: String,

    /// Wait before the first fetch of every watch call
    #[serde(default = "default_stream_interval_ms")]
    pub resume_delay_ms: u64,

    /// Wait between fetches that did not contain a relevant change
    #[serde(default = "default_stream_interval_ms")]
    pub poll_interval_ms: u64,
}

impl StreamConfig {
    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_name: default_stream_name(),
            resume_delay_ms: default_stream_interval_ms(),
            poll_interval_ms: default_stream_interval_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_elapsed_ms() -> u64 {
    20_000
}
fn default_stream_name() -> String {
    "test".to_string()
}
fn default_stream_interval_ms() -> u64 {
    5000
}
