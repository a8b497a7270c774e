//! Append-only, human-readable run log kept next to the pipeline output.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;

use crate::error::{DiaError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Writes start/success/error lines. The file is opened and closed per line.
#[derive(Clone, Debug)]
pub struct RunLogger {
    path: PathBuf,
}

impl RunLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn start(&self, source: &Path, destination: &Path) -> Result<()> {
        self.append(&format!(
            "processing {} in {}",
            source.display(),
            destination.display()
        ))
    }

    pub fn success(&self, source: &Path, destination: &Path, elapsed: Duration) -> Result<()> {
        self.append(&format!(
            "Success!  Processed {} into {} in {} min",
            source.display(),
            destination.display(),
            elapsed_minutes(elapsed)
        ))
    }

    pub fn error(
        &self,
        kind: &str,
        source: &Path,
        destination: &Path,
        elapsed: Duration,
    ) -> Result<()> {
        self.append(&format!(
            "error {kind} {} in {} {} min",
            source.display(),
            destination.display(),
            elapsed_minutes(elapsed)
        ))
    }

    fn append(&self, message: &str) -> Result<()> {
        let wrap = |source: std::io::Error| DiaError::RunLog {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(wrap)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(wrap)?;
        let ts = Local::now().format(TIMESTAMP_FORMAT);
        writeln!(file, "{ts} {message}").map_err(wrap)
    }
}

pub fn elapsed_minutes(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() / 60.0
}
