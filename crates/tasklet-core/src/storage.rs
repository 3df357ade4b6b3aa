use std::cell::{Cell, RefCell};
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::snapshot::{MigrationRules, Snapshot, decode_snapshot, encode_snapshot};

/// Raw text store the snapshot lives in.
pub trait StorageBackend {
    /// Stored text, or `None` when nothing has been written yet.
    fn read(&self) -> Result<Option<String>, StorageError>;

    fn write(&self, contents: &str) -> Result<(), StorageError>;
}

/// Keeps the snapshot in memory. Writes can be made to fail so callers can
/// exercise their recovery path.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    contents: RefCell<Option<String>>,
    fail_writes: Cell<bool>,
    writes: Cell<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: RefCell::new(Some(contents.into())),
            ..Self::default()
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.borrow().clone()
    }

    /// Number of successful writes.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.contents.borrow().clone())
    }

    fn write(&self, contents: &str) -> Result<(), StorageError> {
        if self.fail_writes.get() {
            return Err(StorageError::Unavailable("memory backend rejecting writes".to_string()));
        }
        *self.contents.borrow_mut() = Some(contents.to_string());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

/// Snapshot stored as a single JSON file, replaced atomically on write.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_err(&self, err: impl std::fmt::Display) -> StorageError {
        StorageError::Write {
            location: self.path.display().to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl StorageBackend for JsonFileBackend {
    #[tracing::instrument(skip(self), fields(file = %self.path.display()))]
    fn read(&self) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("snapshot file does not exist yet");
                Ok(None)
            }
            Err(err) => Err(StorageError::Read {
                location: self.path.display().to_string(),
                message: err.to_string(),
            }),
        }
    }

    #[tracing::instrument(skip(self, contents), fields(file = %self.path.display(), bytes = contents.len()))]
    fn write(&self, contents: &str) -> Result<(), StorageError> {
        use std::io::Write;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|err| self.write_err(err))?;

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|err| self.write_err(err))?;
        temp.write_all(contents.as_bytes()).map_err(|err| self.write_err(err))?;
        temp.flush().map_err(|err| self.write_err(err))?;
        temp.persist(&self.path).map_err(|err| self.write_err(err))?;

        debug!("snapshot written atomically");
        Ok(())
    }
}

/// Loads and saves snapshots through a backend. Loading never fails.
#[derive(Debug)]
pub struct Persistence<B> {
    backend: B,
    rules: MigrationRules,
}

impl<B: StorageBackend> Persistence<B> {
    pub fn new(backend: B, rules: MigrationRules) -> Self {
        Self { backend, rules }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn rules(&self) -> &MigrationRules {
        &self.rules
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Snapshot {
        match self.backend.read() {
            Ok(Some(raw)) => {
                let snapshot = decode_snapshot(&raw, &self.rules);
                info!(tasks = snapshot.tasks.len(), templates = snapshot.templates.len(), "loaded snapshot");
                snapshot
            }
            Ok(None) => {
                info!("no stored snapshot; starting empty");
                Snapshot::empty()
            }
            Err(err) => {
                warn!(error = %err, "snapshot unreadable; starting empty");
                Snapshot::empty()
            }
        }
    }

    #[tracing::instrument(skip(self, snapshot), fields(tasks = snapshot.tasks.len()))]
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let raw = encode_snapshot(snapshot)?;
        self.backend.write(&raw)
    }
}
