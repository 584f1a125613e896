//! Caller-supplied knobs for a fetch batch.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::error::{CrtmError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Configuration shared by every request of a batch.
///
/// `log` is the optional audit CSV, `timeout` bounds each request attempt and
/// `max_connections` caps how many requests are in flight at once.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub log: Option<PathBuf>,
    pub timeout: Duration,
    pub max_connections: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            log: None,
            timeout: DEFAULT_TIMEOUT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl FetchConfig {
    pub fn new(log: Option<PathBuf>, timeout: Duration, max_connections: usize) -> Self {
        Self {
            log,
            timeout,
            max_connections,
        }
    }

    /// Rejects settings that would stall or instantly fail every request.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(CrtmError::InvalidConfig(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.max_connections > Semaphore::MAX_PERMITS {
            return Err(CrtmError::InvalidConfig(format!(
                "max_connections must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.timeout.is_zero() {
            return Err(CrtmError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
