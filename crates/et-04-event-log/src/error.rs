//! Error types for the Event Log Sink
//!
//! These never reach callers of `EventSink::append`; the writer logs them.
//! They surface only from `flush`, `close` and store construction.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Event log writer has stopped")]
    WriterStopped,

    #[error("Event log writer did not respond within {0:?}")]
    Timeout(std::time::Duration),
}

impl EventLogError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

pub type EventLogResult<T> = Result<T, EventLogError>;
