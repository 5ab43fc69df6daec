//! JSON Lines file store for the token cache.
//!
//! Uses JSON Lines format (.jsonl) for robustness:
//! - Each line is a complete JSON object
//! - A corrupt line only loses that record, the rest still loads
//! - Writes go to a temp file that is renamed over the log

use crate::error::PersistenceResult;
use crate::store::{CacheEntry, CacheStore};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File-backed `CacheStore`.
pub struct JsonLinesCache {
    path: PathBuf,
}

impl JsonLinesCache {
    /// Create a store at `path`, creating the parent directory if needed.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(?e, dir = %parent.display(), "Failed to create cache directory");
            }
        }
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl CacheStore for JsonLinesCache {
    fn load(&self) -> PersistenceResult<Vec<CacheEntry>> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<CacheEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    skipped += 1;
                    debug!(error = %e, "Skipping unreadable cache line");
                }
            }
        }

        debug!(
            path = %self.path.display(),
            loaded = entries.len(),
            skipped,
            "Loaded token cache"
        );
        Ok(entries)
    }

    fn store(&self, entries: &[CacheEntry]) -> PersistenceResult<()> {
        let temp = self.temp_path();
        {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp)?;
            let mut writer = BufWriter::new(file);
            for entry in entries {
                let json = serde_json::to_string(entry)?;
                writeln!(writer, "{}", json)?;
            }
            writer.flush()?;
        }
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> PersistenceResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
