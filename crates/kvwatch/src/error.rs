//! error types shared by all backends
use crate::backend::Cursor;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Key or node does not exist
    #[error("key not found: {0}")]
    NotFound(String),

    /// Network or session failure talking to the backend
    #[error("transport error: {0}")]
    Transport(Box<dyn std::error::Error + Send + Sync>),

    /// Payload could not be parsed
    #[error("unable to decode payload")]
    Decode(#[from] serde_json::Error),

    #[error("invalid configuration")]
    Config(#[from] config::ConfigError),
}

impl Error {
    pub fn transport(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Transport(err.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Transport(Box::new(value))
    }
}

/// A failed watch together with the last cursor it knew about
///
/// Passing `cursor` to the next `watch_prefix` call resumes where the failed one stopped.
#[derive(thiserror::Error, Debug)]
#[error("watch failed at cursor {cursor}: {source}")]
pub struct WatchError {
    pub cursor: Cursor,
    #[source]
    pub source: Error,
}

impl WatchError {
    pub fn new(cursor: Cursor, source: impl Into<Error>) -> Self {
        Self {
            cursor,
            source: source.into(),
        }
    }
}
