//! backend contract
//!
//! Every backend answers two questions:
//! - [Backend::get_values]: what is stored below these prefixes right now (as a flat [Snapshot])
//! - [Backend::watch_prefix]: block until something below a prefix changed (or the caller stops us)
//!
//! How a backend notices changes differs a lot:
//!
//! | backend                         | notification primitive                         | cursor                 |
//! |---------------------------------|------------------------------------------------|------------------------|
//! | [node_store::NodeStoreBackend]  | one-shot subscriptions per node, fanned out    | passed through         |
//! | [param_stream::ParamStreamBackend] | ordered event stream polled at a position   | stream position        |
//! | [metadata::MetadataBackend]     | none, returns immediately                      | passed through         |
//!
//! A watch may coalesce several changes into one wakeup, but never misses one.
pub mod metadata;
pub mod node_store;
pub mod param_stream;

use crate::error::{Result, WatchError};

/// Flat key -> value mapping produced by one [Backend::get_values] call
pub type Snapshot = std::collections::BTreeMap<String, String>;

/// Receive-only stop signal for [Backend::watch_prefix]
///
/// The watch stops once the sender sends a value or is dropped.
pub type StopSignal = tokio::sync::watch::Receiver<()>;

/// Opaque position in a backend's change stream
///
/// Only the backend that produced a cursor may interpret it. The empty cursor means "start from the latest position".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl Cursor {
    pub fn latest() -> Self {
        Self::default()
    }

    pub fn is_latest(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_latest() {
            f.write_str("<latest>")
        } else {
            f.write_str(&self.0)
        }
    }
}

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Short backend name for diagnostics
    fn name(&self) -> &'static str;

    /// Read everything below `keys` into one flat snapshot
    async fn get_values(&self, keys: &[String]) -> Result<Snapshot>;

    /// Block until a key below `prefix` that starts with one of `keys` changed, or `stop` fires
    ///
    /// Returns the cursor to pass into the next call. On failure the error carries the last known cursor.
    async fn watch_prefix(
        &self,
        prefix: &str,
        keys: &[String],
        cursor: Cursor,
        stop: StopSignal,
    ) -> std::result::Result<Cursor, WatchError>;
}

/// Whether `key` starts with any of the `filters`
pub(crate) fn matches_any(key: &str, filters: &[String]) -> bool {
    filters.iter().any(|filter| key.starts_with(filter.as_str()))
}

/// Non-blocking check whether the stop signal fired
pub fn is_stopped(stop: &StopSignal) -> bool {
    // Err: sender dropped
    !matches!(stop.has_changed(), Ok(false))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefix_filters() {
        let filters = vec!["/app/db".to_string(), "/other".to_string()];

        assert!(matches_any("/app/db/host", &filters));
        assert!(matches_any("/other", &filters));
        assert!(!matches_any("/app/web", &filters));
        assert!(!matches_any("/app/db/host", &[]));
    }

    #[test]
    fn stop_signal() {
        let (tx, rx) = tokio::sync::watch::channel(());
        assert!(!is_stopped(&rx));

        tx.send(()).unwrap();
        assert!(is_stopped(&rx));

        let (tx, rx) = tokio::sync::watch::channel(());
        drop(tx);
        assert!(is_stopped(&rx));
    }

    #[test]
    fn cursor_display() {
        assert_eq!(Cursor::latest().to_string(), "<latest>");
        assert!(Cursor::latest().is_latest());
        assert_eq!(Cursor::from("shard-1:42").to_string(), "shard-1:42");
    }
}
