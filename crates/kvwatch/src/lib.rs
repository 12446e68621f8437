//! # kvwatch - read and watch key/value configuration backends
//!
//! `kvwatch` gives a configuration renderer one contract ([backend::Backend]) for very different key/value stores.
//!
//! ## Introduction for developers
//!
//! ### Snapshots
//!
//! Every backend answers [backend::Backend::get_values] with a flat [backend::Snapshot]: `/`-joined keys mapped to
//! string values. Backends that hand out documents instead of single values (JSON trees, ...) are normalized with
//! [value::flatten]:
//!
//! ```json
//! { "regions": [ { "name": "eu", "val": 1 }, { "name": "us", "val": 2 } ] }
//! ```
//!
//! flattened at `/` becomes
//!
//! | **key**              | **value** |
//! |----------------------|-----------|
//! | `/regions/eu/val`    | `1`       |
//! | `/regions/us/val`    | `2`       |
//!
//! ### Watching
//!
//! [backend::Backend::watch_prefix] blocks until something relevant changed and returns a [backend::Cursor] to pass
//! into the next call. A wakeup is guaranteed after every relevant change, but several changes may share one.
//!
//! - [backend::node_store]: fans out one-shot subscriptions over every watched node, the first event wins
//! - [backend::param_stream]: polls an ordered event stream, the cursor is the stream position
//! - [backend::metadata]: no notification at all, returns at once
//!
//! Callers own the retry policy between watch calls. A failed watch hands back the last known cursor
//! ([error::WatchError]) so nothing is read twice or skipped.
//!
//! ### Startup
//!
//! Backends without a session concept are probed on construction, see [bootstrap::probe_with_backoff].
//!
pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod error;
#[cfg(test)]
pub(crate) mod test_utils;
pub mod value;

pub use backend::{Backend, Cursor, Snapshot, StopSignal};
pub use error::{Error, Result, WatchError};
