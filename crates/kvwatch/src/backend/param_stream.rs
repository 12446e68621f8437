//! parameter store backend with a separate change stream
//!
//! Values live in a flat parameter store (names look like paths). Changes are not announced by the store itself but
//! published as JSON events on an ordered stream. The watch cursor is a position in that stream.
use crate::backend::{is_stopped, matches_any, Backend, Cursor, Snapshot, StopSignal};
use crate::config::StreamConfig;
use crate::error::{Error, Result, WatchError};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParameterPage {
    pub parameters: Vec<Parameter>,
    /// Set when more pages follow
    pub next_token: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ParameterStore: Send + Sync {
    /// One page of all parameters below `path`, recursive and decrypted
    async fn parameters_by_path(
        &self,
        path: &str,
        next_token: Option<String>,
    ) -> Result<ParameterPage>;

    /// Single parameter by exact name, [Error::NotFound] if there is none
    async fn parameter(&self, name: &str) -> Result<Parameter>;
}

#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: Vec<Vec<u8>>,
    /// Position to continue reading from
    pub next_position: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EventStream: Send + Sync {
    async fn shards(&self, stream: &str) -> Result<Vec<String>>;

    /// Position just behind the newest record of `shard`
    async fn latest_position(&self, stream: &str, shard: &str) -> Result<String>;

    async fn records(&self, position: &str) -> Result<RecordBatch>;
}

/// Change event as published on the stream
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChangeEvent {
    pub version: String,
    pub id: String,
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    pub source: String,
    pub account: String,
    pub time: Option<chrono::DateTime<chrono::Utc>>,
    pub region: String,
    pub resources: Vec<String>,
    pub detail: ChangeDetail,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChangeDetail {
    /// Name of the changed parameter
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub operation: String,
}

/// [Backend] for parameter stores paired with an event stream
#[derive(derive_new::new)]
pub struct ParamStreamBackend {
    parameters: Box<dyn ParameterStore>,
    events: Box<dyn EventStream>,
    config: StreamConfig,
}

impl ParamStreamBackend {
    async fn parameters_with_prefix(&self, path: &str) -> Result<Snapshot> {
        let mut parameters = Snapshot::new();
        let mut next_token = None;

        loop {
            let page = self
                .parameters
                .parameters_by_path(path, next_token.take())
                .await?;

            parameters.extend(page.parameters.into_iter().map(|p| (p.name, p.value)));

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(parameters),
            }
        }
    }

    async fn latest_position(&self) -> Result<Cursor> {
        let stream = self.config.stream_name.as_str();
        let shards = self.events.shards(stream).await?;
        let Some(shard) = shards.first() else {
            return Err(Error::NotFound(format!("shards of stream {stream}")));
        };

        tracing::debug!(stream, shard, "requesting latest position");
        Ok(self.events.latest_position(stream, shard).await?.into())
    }
}

#[async_trait::async_trait]
impl Backend for ParamStreamBackend {
    fn name(&self) -> &'static str {
        "param-stream"
    }

    async fn get_values(&self, keys: &[String]) -> Result<Snapshot> {
        let mut vars = Snapshot::new();

        for key in keys {
            tracing::debug!(%key, "processing key");
            let mut found = self.parameters_with_prefix(key).await?;

            if found.is_empty() {
                match self.parameters.parameter(key).await {
                    Ok(parameter) => {
                        found.insert(parameter.name, parameter.value);
                    }
                    Err(err) if err.is_not_found() => {
                        tracing::trace!(%key, "no such parameter");
                    }
                    Err(err) => return Err(err),
                }
            }

            vars.extend(found);
        }

        Ok(vars)
    }

    /// Polls the stream until an event names a key starting with one of `keys`
    ///
    /// `stop` is only checked between polls, never while a fetch or a wait is in progress.
    #[tracing::instrument(level = "debug", skip_all, fields(%prefix, %cursor))]
    async fn watch_prefix(
        &self,
        prefix: &str,
        keys: &[String],
        cursor: Cursor,
        stop: StopSignal,
    ) -> std::result::Result<Cursor, WatchError> {
        let mut position = if cursor.is_latest() {
            match self.latest_position().await {
                Ok(position) => position,
                Err(err) => return Err(WatchError::new(cursor, err)),
            }
        } else {
            tracing::debug!("resuming from previous position");
            cursor
        };

        tokio::time::sleep(self.config.resume_delay()).await;

        loop {
            let batch = match self.events.records(position.as_str()).await {
                Ok(batch) => batch,
                Err(err) => return Err(WatchError::new(position, err)),
            };
            position = Cursor::from(batch.next_position);
            tracing::trace!(records = batch.records.len(), "received records");

            for record in &batch.records {
                let event: ChangeEvent = match serde_json::from_slice(record) {
                    Ok(event) => event,
                    Err(err) => return Err(WatchError::new(position, err)),
                };
                tracing::debug!(
                    name = %event.detail.name,
                    operation = %event.detail.operation,
                    time = ?event.time,
                    "change event"
                );

                if matches_any(&event.detail.name, keys) {
                    return Ok(position);
                }
            }

            tokio::time::sleep(self.config.poll_interval()).await;

            if is_stopped(&stop) {
                tracing::debug!("watch stopped");
                return Ok(position);
            }
        }
    }
}
