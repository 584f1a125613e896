//! Per-request audit log.
//!
//! Every fetch attempt can be appended as one CSV row to a file shared by
//! all tasks of a batch, and by other processes polling the same API. Writers
//! serialize on an advisory lock taken on a sibling `<file>.lock`.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use csv::WriterBuilder;
use fs2::FileExt;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::{CrtmError, Result};

pub const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Header of the audit CSV, in column order.
pub const FETCH_LOG_COLUMNS: &str = "actual_date,cod_stop,resp_time,resp_status,resp_length,timeout,connection_error,max_connections,timeout_time";

/// One audit row. Field order is the column order.
///
/// Values are written the way the Python poller writes them (`True`/`False`,
/// `None` for a missing status or length, whole seconds without a fraction),
/// so both tools can share one log file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchRecord {
    pub actual_date: String,
    pub cod_stop: String,
    /// Seconds from request start to answer or failure.
    pub resp_time: f64,
    #[serde(serialize_with = "none_if_missing")]
    pub resp_status: Option<u16>,
    /// Body length in characters.
    #[serde(serialize_with = "none_if_missing")]
    pub resp_length: Option<usize>,
    #[serde(serialize_with = "capitalized_bool")]
    pub timeout: bool,
    #[serde(serialize_with = "capitalized_bool")]
    pub connection_error: bool,
    pub max_connections: usize,
    #[serde(serialize_with = "compact_seconds")]
    pub timeout_time: f64,
}

fn none_if_missing<T, S>(value: &Option<T>, s: S) -> std::result::Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Some(v) => v.serialize(s),
        None => s.serialize_str("None"),
    }
}

fn capitalized_bool<S: Serializer>(value: &bool, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(if *value { "True" } else { "False" })
}

/// `10.0` is written as `10`, `2.5` stays `2.5`.
fn compact_seconds<S: Serializer>(value: &f64, s: S) -> std::result::Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && *value >= 0.0 && *value <= u64::MAX as f64 {
        s.serialize_u64(*value as u64)
    } else {
        s.serialize_f64(*value)
    }
}

impl FetchRecord {
    /// A record with no outcome yet. Callers fill in status or failure flags.
    pub fn started(
        actual_date: DateTime<Local>,
        cod_stop: &str,
        resp_time: Duration,
        config: &FetchConfig,
    ) -> Self {
        Self {
            actual_date: actual_date.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            cod_stop: cod_stop.to_string(),
            resp_time: resp_time.as_secs_f64(),
            resp_status: None,
            resp_length: None,
            timeout: false,
            connection_error: false,
            max_connections: config.max_connections,
            timeout_time: config.timeout.as_secs_f64(),
        }
    }
}

/// Handle to the optional audit file.
///
/// A handle built from `None` accepts records and drops them without touching
/// the filesystem.
#[derive(Debug, Clone)]
pub struct FetchLog {
    path: Option<PathBuf>,
    lock_timeout: Duration,
}

impl FetchLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends `record`, writing the header first when the file is new.
    ///
    /// # Errors
    ///
    /// [`CrtmError::LockTimeout`] when the lock is still held by someone else
    /// after the configured wait, or any I/O and CSV error from the write.
    pub async fn append(&self, record: &FetchRecord) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        debug!(path = %path.display(), cod_stop = %record.cod_stop, "CSV fetch log line");

        let _lock = self.acquire_lock(&lock_path(path)).await?;

        let file_exists = path.exists();
        let file = OpenOptions::new().append(true).create(true).open(path)?;

        let mut writer = WriterBuilder::new()
            .has_headers(!file_exists)
            .from_writer(file);

        writer.serialize(record)?;
        writer.flush()?;

        Ok(())
    }

    /// Polls for the exclusive lock until `lock_timeout` runs out.
    ///
    /// The lock lives as long as the returned file handle.
    async fn acquire_lock(&self, lock_path: &Path) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)?;

        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(file),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if Instant::now() >= deadline {
                        return Err(CrtmError::LockTimeout {
                            path: lock_path.to_path_buf(),
                            waited: self.lock_timeout,
                        });
                    }
                    tokio::time::sleep(LOCK_POLL_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}
