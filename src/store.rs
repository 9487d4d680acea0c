use std::fs::File;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::models::MarkerCollection;

/// Trait for loading and persisting the whole marker collection.
pub trait RecordStore: Send + Sync {
    /// Load the full collection. Failures are recovered as an empty collection.
    fn load(&self) -> MarkerCollection;

    /// Load the collection ahead of a write. Unlike `load`, a store that
    /// exists but cannot be read or parsed is an error, so a save never
    /// replaces records it failed to load.
    fn load_for_write(&self) -> Result<MarkerCollection, StorageError>;

    /// Overwrite the stored collection.
    fn save(&self, collection: &MarkerCollection) -> Result<(), StorageError>;
}

/// Collection persisted as one pretty-printed JSON document.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the backing file with an empty collection if it does not exist.
    pub fn init(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            return Ok(());
        }
        self.save(&MarkerCollection::default())?;
        tracing::info!("Initialized empty {}", self.path.display());
        Ok(())
    }

    fn read(&self) -> Result<MarkerCollection, StorageError> {
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(MarkerCollection::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to a sibling temp file, then rename it over the target.
    fn write_atomic(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = parent.join(format!(
            ".{}.tmp.{}",
            self.path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("markers"),
            std::process::id()
        ));
        if let Err(e) = write_then_rename(&tmp, &self.path, bytes) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }
}

fn write_then_rename(tmp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    {
        let mut f = File::create(tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(tmp, target)
}

impl RecordStore for JsonFileStore {
    fn load(&self) -> MarkerCollection {
        match self.read() {
            Ok(collection) => collection,
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                MarkerCollection::default()
            }
        }
    }

    fn load_for_write(&self) -> Result<MarkerCollection, StorageError> {
        match self.read() {
            Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                Ok(MarkerCollection::default())
            }
            Err(e) => {
                tracing::error!(
                    "Refusing to write over unreadable {}: {}",
                    self.path.display(),
                    e
                );
                Err(e)
            }
            ok => ok,
        }
    }

    fn save(&self, collection: &MarkerCollection) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(collection)?;
        self.write_atomic(json.as_bytes())
    }
}

// In-memory implementation for testing
#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::RwLock;

    /// In-memory record store. Writes can be made to fail on demand.
    #[derive(Default)]
    pub struct InMemoryStore {
        collection: RwLock<MarkerCollection>,
        fail_writes: AtomicBool,
    }

    impl InMemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_collection(collection: MarkerCollection) -> Self {
            Self {
                collection: RwLock::new(collection),
                fail_writes: AtomicBool::new(false),
            }
        }

        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }
    }

    impl RecordStore for InMemoryStore {
        fn load(&self) -> MarkerCollection {
            self.collection.read().unwrap().clone()
        }

        fn load_for_write(&self) -> Result<MarkerCollection, StorageError> {
            Ok(self.load())
        }

        fn save(&self, collection: &MarkerCollection) -> Result<(), StorageError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::other(
                    "simulated write failure",
                )));
            }
            *self.collection.write().unwrap() = collection.clone();
            Ok(())
        }
    }
}
