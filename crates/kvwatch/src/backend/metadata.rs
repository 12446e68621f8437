//! HTTP metadata service backend
//!
//! The service answers `GET <path>` with a JSON document describing everything below `path`. It has no way to notify
//! about changes: [MetadataBackend::watch_prefix] returns immediately and callers re-poll on their own schedule.
use crate::backend::{Backend, Cursor, Snapshot, StopSignal};
use crate::bootstrap::probe_with_backoff;
use crate::config::{BootstrapPolicy, MetadataConfig};
use crate::error::{Result, WatchError};
use crate::value::{flatten_into, Value};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataTransport: Send + Sync {
    /// Raw response body for `path`
    async fn fetch(&self, path: &str) -> Result<Vec<u8>>;
}

pub struct HttpMetadataTransport {
    url: String,
    client: reqwest::Client,
}

impl HttpMetadataTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl MetadataTransport for HttpMetadataTransport {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(format!("{}{}", self.url, path))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}

/// [Backend] for the HTTP metadata service
pub struct MetadataBackend {
    transport: Box<dyn MetadataTransport>,
}

impl MetadataBackend {
    /// Connect to the service named in `config`, waiting for it to come up
    pub async fn from_config(config: &MetadataConfig) -> Result<Self> {
        let url = config.url();
        tracing::info!(%url, "using metadata service");

        Self::connect(Box::new(HttpMetadataTransport::new(url)), &config.bootstrap).await
    }

    /// Probe the service root until it answers, see [probe_with_backoff]
    pub async fn connect(
        transport: Box<dyn MetadataTransport>,
        policy: &BootstrapPolicy,
    ) -> Result<Self> {
        let root = &transport;
        probe_with_backoff(policy, move || async move { root.fetch("/").await.map(|_| ()) }).await?;

        Ok(Self { transport })
    }
}

#[async_trait::async_trait]
impl Backend for MetadataBackend {
    fn name(&self) -> &'static str {
        "metadata"
    }

    async fn get_values(&self, keys: &[String]) -> Result<Snapshot> {
        let mut vars = Snapshot::new();

        for key in keys {
            let body = self.transport.fetch(key).await?;
            let document: serde_json::Value = serde_json::from_slice(&body)?;

            flatten_into(key, &Value::from(document), &mut vars);
        }

        Ok(vars)
    }

    /// The service has no change notification, the cursor is handed back as is
    async fn watch_prefix(
        &self,
        prefix: &str,
        _keys: &[String],
        cursor: Cursor,
        _stop: StopSignal,
    ) -> std::result::Result<Cursor, WatchError> {
        tracing::trace!(prefix, "watch not supported, returning immediately");
        Ok(cursor)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::Error;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn reachable() -> MockMetadataTransport {
        let mut transport = MockMetadataTransport::new();
        transport
            .expect_fetch()
            .withf(|path| path == "/")
            .returning(|_| Ok(b"{}".to_vec()));
        transport
    }

    #[tokio::test]
    async fn get_values_flattens_documents() {
        let mut transport = reachable();
        transport
            .expect_fetch()
            .withf(|path| path == "/self/service")
            .returning(|_| {
                Ok(br#"{"name":"web","ports":["80","443"],"labels":{"tier":"front"}}"#.to_vec())
            });
        transport
            .expect_fetch()
            .withf(|path| path == "/hosts")
            .returning(|_| Ok(br#"[{"name":"h1","ip":"10.0.0.1"}]"#.to_vec()));
        let backend = MetadataBackend::connect(Box::new(transport), &BootstrapPolicy::default())
            .await
            .unwrap();

        let values = backend
            .get_values(&keys(&["/self/service", "/hosts"]))
            .await
            .unwrap();

        let expected: Snapshot = [
            ("/hosts/h1/ip", "10.0.0.1"),
            ("/self/service/labels/tier", "front"),
            ("/self/service/name", "web"),
            ("/self/service/ports/0", "80"),
            ("/self/service/ports/1", "443"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn get_values_rejects_invalid_json() {
        let mut transport = reachable();
        transport
            .expect_fetch()
            .withf(|path| path == "/broken")
            .returning(|_| Ok(b"<html>".to_vec()));
        let backend = MetadataBackend::connect(Box::new(transport), &BootstrapPolicy::default())
            .await
            .unwrap();

        let err = backend.get_values(&keys(&["/broken"])).await.unwrap_err();

        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn watch_returns_cursor_unchanged() {
        let backend = MetadataBackend::connect(Box::new(reachable()), &BootstrapPolicy::default())
            .await
            .unwrap();
        let (_stop_tx, stop) = tokio::sync::watch::channel(());

        for cursor in [Cursor::latest(), Cursor::from("42")] {
            let returned = tokio::time::timeout(
                Duration::from_millis(100),
                backend.watch_prefix("/any", &keys(&["/x", "/y"]), cursor.clone(), stop.clone()),
            )
            .await
            .expect("returns immediately")
            .unwrap();

            assert_eq!(returned, cursor);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn connect_fails_when_service_stays_down() {
        let mut transport = MockMetadataTransport::new();
        transport
            .expect_fetch()
            .times(6)
            .returning(|_| Err(Error::transport("connection refused")));

        let result = MetadataBackend::connect(Box::new(transport), &BootstrapPolicy::default()).await;

        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
