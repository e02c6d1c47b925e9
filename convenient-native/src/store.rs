//! Persistent compilation state store, one record per build unit
//!
//! Records are whole-state replacements. Writes go through a temp file in the
//! target directory that is fsynced and renamed over the record, so a reader
//! sees either the old record or the new one. A temp file dropped on an error
//! path is deleted.
//!
//! Anything that cannot be read back as a current-version record for the
//! requested unit loads as "no previous state".

use crate::error::{NativeError, Result};
use crate::state::CompilationState;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Bumped whenever the persisted layout changes
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Keyed storage for [`CompilationState`]
pub trait StateStore: Send + Sync {
    /// Previous state of `unit_id`; `None` when missing or unreadable
    fn load(&self, unit_id: &str) -> Option<CompilationState>;

    /// Replace the state of `unit_id`
    ///
    /// # Errors
    ///
    /// Returns an error if the new state could not be published. The previous
    /// record is then still intact.
    fn store(&self, unit_id: &str, state: &CompilationState) -> Result<()>;

    /// Forget the state of `unit_id`
    ///
    /// # Errors
    ///
    /// Returns an error if an existing record could not be removed.
    fn invalidate(&self, unit_id: &str) -> Result<()>;
}

#[derive(Serialize)]
struct StateRecordRef<'a> {
    version: u32,
    unit_id: &'a str,
    state: &'a CompilationState,
}

#[derive(Deserialize)]
struct StateRecord {
    version: u32,
    unit_id: String,
    state: CompilationState,
}

/// Directory-backed store, one JSON file per unit
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    /// Store records under `root` (created on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Record file for `unit_id`
    #[must_use]
    pub fn record_path(&self, unit_id: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(unit_id.as_bytes());
        self.root.join(format!("{:x}.json", hasher.finalize()))
    }

    fn read_record(&self, unit_id: &str) -> std::result::Result<Option<CompilationState>, String> {
        let path = self.record_path(unit_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };

        let record: StateRecord = serde_json::from_slice(&bytes)
            .map_err(|e| format!("failed to decode {}: {e}", path.display()))?;

        if record.version != STATE_FORMAT_VERSION {
            return Err(format!(
                "format version {} does not match {}",
                record.version, STATE_FORMAT_VERSION
            ));
        }
        if record.unit_id != unit_id {
            return Err(format!("record belongs to unit '{}'", record.unit_id));
        }

        Ok(Some(record.state))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, unit_id: &str) -> Option<CompilationState> {
        match self.read_record(unit_id) {
            Ok(Some(state)) => {
                debug!("Loaded state for {} ({} files)", unit_id, state.files.len());
                Some(state)
            }
            Ok(None) => {
                info!("No previous compilation state for {}", unit_id);
                None
            }
            Err(e) => {
                warn!("Discarding unreadable compilation state for {}: {}", unit_id, e);
                None
            }
        }
    }

    fn store(&self, unit_id: &str, state: &CompilationState) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| NativeError::io(&self.root, e))?;
        let path = self.record_path(unit_id);

        // Deleted on drop unless persisted
        let temp = tempfile::NamedTempFile::new_in(&self.root).map_err(|e| NativeError::io(&self.root, e))?;

        let record = StateRecordRef {
            version: STATE_FORMAT_VERSION,
            unit_id,
            state,
        };
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer(&mut writer, &record)?;
            writer.flush().map_err(|e| NativeError::io(temp.path(), e))?;
        }
        temp.as_file().sync_all().map_err(|e| NativeError::io(temp.path(), e))?;

        let _ = temp.persist(&path).map_err(|e| NativeError::io(&path, e.error))?;

        // Best effort: make the rename itself durable
        if let Ok(dir) = File::open(&self.root) {
            let _ = dir.sync_all();
        }

        debug!("Stored state for {} at {}", unit_id, path.display());
        Ok(())
    }

    fn invalidate(&self, unit_id: &str) -> Result<()> {
        let path = self.record_path(unit_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(NativeError::io(path, e)),
        }
    }
}

/// Process-local store, for embedding and tests
#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    records: Mutex<HashMap<String, CompilationState>>,
}

impl InMemoryStateStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units with a record
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().map_or(0, |records| records.len())
    }

    /// No unit has a record
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self, unit_id: &str) -> Option<CompilationState> {
        self.records.lock().ok()?.get(unit_id).cloned()
    }

    fn store(&self, unit_id: &str, state: &CompilationState) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| NativeError::StateStore("state store lock poisoned".to_string()))?;
        let _ = records.insert(unit_id.to_string(), state.clone());
        Ok(())
    }

    fn invalidate(&self, unit_id: &str) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| NativeError::StateStore("state store lock poisoned".to_string()))?;
        let _ = records.remove(unit_id);
        Ok(())
    }
}
