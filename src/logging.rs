//! Per-run log file.
//!
//! A `RunLog` installs a `tracing` subscriber that appends
//! `<timestamp> <LEVEL> <message>` lines to the configured file. The
//! subscriber is the thread default only while the `RunLog` is alive, so
//! the orchestrator owns the logger for exactly one run.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

use crate::error::Result;

/// Overrides the default `info` filter, e.g. `QRZ_UPLOAD_LOG=debug`.
pub const LOG_FILTER_ENV: &str = "QRZ_UPLOAD_LOG";

pub struct RunLog {
    path: PathBuf,
    _guard: DefaultGuard,
}

impl RunLog {
    /// Opens `path` for appending (creating parent directories) and routes
    /// this thread's `tracing` events into it until the value is dropped.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        let filter =
            EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .finish();

        Ok(RunLog {
            path: path.to_path_buf(),
            _guard: tracing::subscriber::set_default(subscriber),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
