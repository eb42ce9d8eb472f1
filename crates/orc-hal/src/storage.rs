//! Persisted key-value store with a single guard byte.
//!
//! The store models an EEPROM-style device: writes are staged by
//! [`KeyValueStore::save`] / [`KeyValueStore::set_guard_byte`] and only
//! become durable on [`KeyValueStore::commit`].  The guard byte lives at a
//! fixed location and is checked by callers before any record is trusted.
//!
//! Two implementations are provided:
//! - [`MemoryStore`] – volatile, shareable between clones, used by tests and
//!   the simulator.
//! - [`FileStore`] – one file per tag in a directory, used on a host.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use orc_types::OrcError;
use parking_lot::Mutex;
use tracing::debug;

/// Value of an erased guard byte.
pub const ERASED_GUARD: u8 = 0xFF;

/// Byte-addressed persistent storage.
pub trait KeyValueStore: Send {
    /// Current guard byte ([`ERASED_GUARD`] on blank storage).
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::Storage`] if the device cannot be read.
    fn guard_byte(&self) -> Result<u8, OrcError>;

    /// Stage a new guard byte.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::Storage`] if the write cannot be staged.
    fn set_guard_byte(&mut self, value: u8) -> Result<(), OrcError>;

    /// Read the record stored under `tag`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::Storage`] if the device cannot be read.
    fn load(&self, tag: &str) -> Result<Option<Vec<u8>>, OrcError>;

    /// Stage `record` under `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::Storage`] if the write cannot be staged.
    fn save(&mut self, tag: &str, record: &[u8]) -> Result<(), OrcError>;

    /// Make every staged write durable.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::Storage`] if the flush fails; staged writes are
    /// then discarded.
    fn commit(&mut self) -> Result<(), OrcError>;
}

fn check_tag(tag: &str) -> Result<(), OrcError> {
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(OrcError::Storage(format!("invalid record tag '{tag}'")));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// MemoryStore
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    guard: Option<u8>,
    records: HashMap<String, Vec<u8>>,
    staged_guard: Option<u8>,
    staged: HashMap<String, Vec<u8>>,
    fail_commits: bool,
    commits: usize,
}

/// Volatile store.  Clones share the same contents so a test can keep a
/// handle after passing one to the code under test.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Blank storage: erased guard byte, no records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent commits fail (and discard staged writes).
    pub fn set_fail_commits(&self, fail: bool) {
        self.state.lock().fail_commits = fail;
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.state.lock().commits
    }

    /// Durable bytes under `tag`, bypassing staging.
    pub fn committed(&self, tag: &str) -> Option<Vec<u8>> {
        self.state.lock().records.get(tag).cloned()
    }

    /// Overwrite durable contents directly, e.g. to simulate corruption.
    pub fn poke(&self, guard: Option<u8>, tag: &str, record: &[u8]) {
        let mut s = self.state.lock();
        s.guard = guard;
        s.records.insert(tag.to_string(), record.to_vec());
    }
}

impl KeyValueStore for MemoryStore {
    fn guard_byte(&self) -> Result<u8, OrcError> {
        Ok(self.state.lock().guard.unwrap_or(ERASED_GUARD))
    }

    fn set_guard_byte(&mut self, value: u8) -> Result<(), OrcError> {
        self.state.lock().staged_guard = Some(value);
        Ok(())
    }

    fn load(&self, tag: &str) -> Result<Option<Vec<u8>>, OrcError> {
        check_tag(tag)?;
        Ok(self.state.lock().records.get(tag).cloned())
    }

    fn save(&mut self, tag: &str, record: &[u8]) -> Result<(), OrcError> {
        check_tag(tag)?;
        self.state
            .lock()
            .staged
            .insert(tag.to_string(), record.to_vec());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), OrcError> {
        let mut s = self.state.lock();
        let staged = std::mem::take(&mut s.staged);
        let staged_guard = s.staged_guard.take();
        if s.fail_commits {
            return Err(OrcError::Storage("simulated commit failure".to_string()));
        }
        s.records.extend(staged);
        if let Some(g) = staged_guard {
            s.guard = Some(g);
        }
        s.commits += 1;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FileStore
// ────────────────────────────────────────────────────────────────────────────

const GUARD_FILE: &str = "guard.bin";

/// Directory-backed store: `guard.bin` holds the guard byte and each record
/// lives in `<tag>.rec`.
pub struct FileStore {
    dir: PathBuf,
    staged_guard: Option<u8>,
    staged: HashMap<String, Vec<u8>>,
}

impl FileStore {
    /// Open (and create if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::Storage`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, OrcError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| {
            OrcError::Storage(format!("failed to create store at {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            staged_guard: None,
            staged: HashMap::new(),
        })
    }

    fn record_path(&self, tag: &str) -> PathBuf {
        self.dir.join(format!("{tag}.rec"))
    }

    fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, OrcError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(OrcError::Storage(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    fn write(path: &Path, bytes: &[u8]) -> Result<(), OrcError> {
        fs::write(path, bytes)
            .map_err(|e| OrcError::Storage(format!("failed to write {}: {e}", path.display())))
    }
}

impl KeyValueStore for FileStore {
    fn guard_byte(&self) -> Result<u8, OrcError> {
        let bytes = Self::read_optional(&self.dir.join(GUARD_FILE))?;
        Ok(bytes.and_then(|b| b.first().copied()).unwrap_or(ERASED_GUARD))
    }

    fn set_guard_byte(&mut self, value: u8) -> Result<(), OrcError> {
        self.staged_guard = Some(value);
        Ok(())
    }

    fn load(&self, tag: &str) -> Result<Option<Vec<u8>>, OrcError> {
        check_tag(tag)?;
        Self::read_optional(&self.record_path(tag))
    }

    fn save(&mut self, tag: &str, record: &[u8]) -> Result<(), OrcError> {
        check_tag(tag)?;
        self.staged.insert(tag.to_string(), record.to_vec());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), OrcError> {
        let staged = std::mem::take(&mut self.staged);
        let staged_guard = self.staged_guard.take();
        // Records first, guard last: a crash in between leaves the old guard.
        for (tag, bytes) in &staged {
            Self::write(&self.record_path(tag), bytes)?;
        }
        if let Some(g) = staged_guard {
            Self::write(&self.dir.join(GUARD_FILE), &[g])?;
        }
        debug!(dir = %self.dir.display(), records = staged.len(), "store committed");
        Ok(())
    }
}
