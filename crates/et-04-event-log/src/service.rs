//! Event Log Sink service
//!
//! `append` pushes into the query window and hands the record to a writer
//! task over an unbounded channel, so callers never wait on storage.
//! The writer owns the store and moves it into a short `spawn_blocking`
//! call per batch of queued commands; no blocking-pool thread is held
//! between batches. Storage errors stop at the writer and are counted and
//! logged.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use shared_types::{EventRecord, EventSink};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::{EventSummary, EventWindow};
use crate::error::{EventLogError, EventLogResult};
use crate::ports::inbound::EventLogApi;
use crate::ports::outbound::EventStore;

/// Event log configuration
#[derive(Clone, Debug)]
pub struct EventLogConfig {
    /// Records kept in memory for `query` and `summarize`.
    pub window_capacity: usize,
    /// Upper bound on `flush` and `close`.
    pub flush_timeout: Duration,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            window_capacity: 10_000,
            flush_timeout: Duration::from_secs(2),
        }
    }
}

/// Commands handed to one `spawn_blocking` call at most.
const WRITE_BATCH: usize = 256;

enum WriterCommand {
    Append(EventRecord),
    Flush(oneshot::Sender<EventLogResult<()>>),
}

pub struct EventLogSink {
    config: EventLogConfig,
    tx: Mutex<Option<mpsc::UnboundedSender<WriterCommand>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    window: RwLock<EventWindow>,
    appended: AtomicU64,
    write_failures: Arc<AtomicU64>,
}

impl EventLogSink {
    /// Warm the window from the store's latest history and start the
    /// writer task. Must be called inside a Tokio runtime.
    pub fn start<S: EventStore>(config: EventLogConfig, store: S) -> Self {
        let mut window = EventWindow::new(config.window_capacity);
        match store.load_latest() {
            Ok(history) => {
                debug!(records = history.len(), "[et-04] Query window warmed");
                window.extend(history);
            }
            Err(e) => warn!(error = %e, "[et-04] Could not load event history"),
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let write_failures = Arc::new(AtomicU64::new(0));
        let failures = Arc::clone(&write_failures);
        let writer = tokio::spawn(run_writer(store, rx, failures));
        info!(window = config.window_capacity, "[et-04] Event log sink started");

        Self {
            config,
            tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(writer)),
            window: RwLock::new(window),
            appended: AtomicU64::new(0),
            write_failures,
        }
    }

    /// Wait until every record appended so far has reached the store.
    pub async fn flush(&self) -> EventLogResult<()> {
        let (reply, done) = oneshot::channel();
        let sent = self
            .tx
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(WriterCommand::Flush(reply)).is_ok());
        if !sent {
            return Err(EventLogError::WriterStopped);
        }
        match tokio::time::timeout(self.config.flush_timeout, done).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(EventLogError::WriterStopped),
            Err(_) => Err(EventLogError::Timeout(self.config.flush_timeout)),
        }
    }

    /// Drain queued records, flush and stop the writer. Records appended
    /// afterwards stay in the query window only.
    pub async fn close(&self) -> EventLogResult<()> {
        drop(self.tx.lock().take());
        let Some(writer) = self.writer.lock().take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.config.flush_timeout, writer).await {
            Ok(Ok(())) => {
                info!(
                    appended = self.appended.load(Ordering::Relaxed),
                    failures = self.write_failures(),
                    "[et-04] Event log sink closed"
                );
                Ok(())
            }
            Ok(Err(_)) => Err(EventLogError::WriterStopped),
            Err(_) => Err(EventLogError::Timeout(self.config.flush_timeout)),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Records the store refused.
    #[must_use]
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }
}

async fn run_writer<S: EventStore>(
    mut store: S,
    mut rx: mpsc::UnboundedReceiver<WriterCommand>,
    failures: Arc<AtomicU64>,
) {
    let mut batch = Vec::with_capacity(WRITE_BATCH);
    while rx.recv_many(&mut batch, WRITE_BATCH).await > 0 {
        let commands = std::mem::take(&mut batch);
        let failures = Arc::clone(&failures);
        let written = tokio::task::spawn_blocking(move || {
            write_batch(&mut store, commands, &failures);
            store
        })
        .await;
        store = match written {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "[et-04] Event writer failed, persistence stopped");
                return;
            }
        };
    }
    let flushed = tokio::task::spawn_blocking(move || store.flush()).await;
    if let Ok(Err(e)) = flushed {
        warn!(error = %e, "[et-04] Final flush failed");
    }
    debug!("[et-04] Event writer stopped");
}

fn write_batch<S: EventStore>(store: &mut S, commands: Vec<WriterCommand>, failures: &AtomicU64) {
    for command in commands {
        match command {
            WriterCommand::Append(record) => {
                if let Err(e) = store.append(&record) {
                    failures.fetch_add(1, Ordering::Relaxed);
                    warn!(kind = %record.kind, error = %e, "[et-04] Failed to persist event");
                }
            }
            WriterCommand::Flush(reply) => {
                // Caller may have timed out and gone.
                let _ = reply.send(store.flush());
            }
        }
    }
}

impl EventSink for EventLogSink {
    fn append(&self, record: EventRecord) {
        self.appended.fetch_add(1, Ordering::Relaxed);
        // Window lock held across the send keeps window and store order equal.
        let mut window = self.window.write();
        let queued = self
            .tx
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(WriterCommand::Append(record.clone())).is_ok());
        if !queued {
            debug!(kind = %record.kind, "[et-04] Writer stopped, event kept in memory only");
        }
        window.push(record);
    }
}

impl EventLogApi for EventLogSink {
    fn query(&self, since: Option<DateTime<Utc>>, limit: usize) -> Vec<EventRecord> {
        self.window.read().query(since, limit)
    }

    fn summarize(&self, since: Option<DateTime<Utc>>) -> EventSummary {
        EventSummary::from_records(self.window.read().since(since))
    }

    fn total_recorded(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }
}
