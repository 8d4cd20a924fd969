//! Result persistence boundary.
//!
//! The controller hands one [`PersistedResult`] to a [`ResultStore`] per
//! completed run. Stores are best-effort: callers log failures and move on.

use crate::config::types::{GreenboxError, Result};
use crate::energy::EnergyReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Record written for each completed analysis.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PersistedResult {
    pub ops: u64,
    pub memory_peak_bytes: u64,
    pub energy_joules: f64,
    pub energy_kwh: f64,
    pub recorded_at: DateTime<Utc>,
    /// SHA-256 of the instrumented script text.
    pub script_fingerprint: String,
}

impl PersistedResult {
    pub fn new(
        ops: u64,
        memory_peak_bytes: u64,
        energy: &EnergyReport,
        script_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            ops,
            memory_peak_bytes,
            energy_joules: energy.energy_joules,
            energy_kwh: energy.energy_kwh,
            recorded_at: Utc::now(),
            script_fingerprint: script_fingerprint.into(),
        }
    }
}

/// Destination for completed results.
pub trait ResultStore: Send + Sync {
    fn name(&self) -> &'static str;
    fn save(&self, record: &PersistedResult) -> Result<()>;
}

/// Store that discards everything.
#[derive(Debug, Clone, Default)]
pub struct NullStore;

impl ResultStore for NullStore {
    fn name(&self) -> &'static str {
        "null"
    }

    fn save(&self, _record: &PersistedResult) -> Result<()> {
        Ok(())
    }
}

/// Append-only JSON-lines file, one record per line.
pub struct JsonLinesStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                GreenboxError::Store(format!(
                    "Failed to create result directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                GreenboxError::Store(format!(
                    "Failed to open result store {}: {}",
                    path.display(),
                    e
                ))
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, oldest first.
    pub fn load_all(&self) -> Result<Vec<PersistedResult>> {
        let file = File::open(&self.path).map_err(|e| {
            GreenboxError::Store(format!("Failed to open {}: {}", self.path.display(), e))
        })?;

        let mut records = Vec::new();
        for (number, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                GreenboxError::Store(format!(
                    "{}:{}: malformed record: {}",
                    self.path.display(),
                    number + 1,
                    e
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

impl ResultStore for JsonLinesStore {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn save(&self, record: &PersistedResult) -> Result<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| GreenboxError::Store(format!("Failed to encode record: {}", e)))?;
        line.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| GreenboxError::Store("result store lock poisoned".to_string()))?;
        file.write_all(&line)
            .and_then(|_| file.flush())
            .map_err(|e| {
                GreenboxError::Store(format!(
                    "Failed to append to {}: {}",
                    self.path.display(),
                    e
                ))
            })
    }
}
