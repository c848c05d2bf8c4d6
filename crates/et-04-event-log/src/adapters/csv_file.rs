//! Daily-rotating CSV file store.
//!
//! One file per UTC day, `<dir>/<YYYY-MM-DD>_events.csv`, chosen by the
//! record's own date. New files start with the header line.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use shared_types::{EventRecord, LOG_HEADER};
use tracing::{debug, info};

use crate::error::{EventLogError, EventLogResult};
use crate::ports::outbound::EventStore;

const FILE_SUFFIX: &str = "_events.csv";

struct OpenLog {
    date: NaiveDate,
    path: PathBuf,
    writer: BufWriter<File>,
}

pub struct CsvFileStore {
    dir: PathBuf,
    current: Option<OpenLog>,
}

impl CsvFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}{FILE_SUFFIX}", date.format("%Y-%m-%d")))
    }

    /// Most recent log file by name, if any.
    pub fn latest_file(&self) -> EventLogResult<Option<PathBuf>> {
        if !self.dir.exists() {
            return Ok(None);
        }
        let entries = fs::read_dir(&self.dir).map_err(EventLogError::io(&self.dir))?;
        let latest = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.ends_with(FILE_SUFFIX))
            })
            .max();
        Ok(latest)
    }

    fn open(&self, date: NaiveDate) -> EventLogResult<OpenLog> {
        fs::create_dir_all(&self.dir).map_err(EventLogError::io(&self.dir))?;
        let path = self.path_for(date);
        let fresh = fs::metadata(&path).map_or(true, |m| m.len() == 0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(EventLogError::io(&path))?;
        let mut writer = BufWriter::new(file);
        if fresh {
            writeln!(writer, "{LOG_HEADER}").map_err(EventLogError::io(&path))?;
        }
        info!(path = %path.display(), "[et-04] Event log file opened");
        Ok(OpenLog { date, path, writer })
    }

    fn writer_for(&mut self, date: NaiveDate) -> EventLogResult<&mut OpenLog> {
        let log = match self.current.take() {
            Some(log) if log.date == date => log,
            previous => {
                if let Some(mut old) = previous {
                    old.writer.flush().map_err(EventLogError::io(&old.path))?;
                }
                self.open(date)?
            }
        };
        Ok(self.current.insert(log))
    }
}

impl EventStore for CsvFileStore {
    fn append(&mut self, record: &EventRecord) -> EventLogResult<()> {
        let log = self.writer_for(record.timestamp.date_naive())?;
        writeln!(log.writer, "{}", record.to_log_line())
            .and_then(|()| log.writer.flush())
            .map_err(EventLogError::io(&log.path))
    }

    fn flush(&mut self) -> EventLogResult<()> {
        match self.current.as_mut() {
            Some(log) => log.writer.flush().map_err(EventLogError::io(&log.path)),
            None => Ok(()),
        }
    }

    fn load_latest(&self) -> EventLogResult<Vec<EventRecord>> {
        let Some(path) = self.latest_file()? else {
            return Ok(Vec::new());
        };
        let text = fs::read_to_string(&path).map_err(EventLogError::io(&path))?;
        let mut records = Vec::new();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() || (n == 0 && line == LOG_HEADER) {
                continue;
            }
            match EventRecord::parse_log_line(line) {
                Ok(record) => records.push(record),
                Err(e) => debug!(path = %path.display(), line = n + 1, error = %e, "[et-04] Skipping unreadable log line"),
            }
        }
        info!(path = %path.display(), records = records.len(), "[et-04] Loaded event history");
        Ok(records)
    }
}
