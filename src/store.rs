//! Non-volatile storage for persisted settings.
//!
//! Values are keyed by dispatch token. A missing key means "never saved" and
//! makes the loader fall back to the entry's factory default.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::codec::Value;

/// Errors from a persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "json-store")]
    #[error("storage encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("read-back mismatch for {token}")]
    Verify { token: String },
}

/// Durable key/value storage surviving a power cycle.
pub trait NonVolatile {
    fn save(&mut self, token: &str, value: Value) -> Result<(), StoreError>;

    fn load(&self, token: &str) -> Option<Value>;
}

/// RAM-backed store. Survives as long as the value does, which is enough to
/// simulate a power cycle by handing it to a fresh target.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl NonVolatile for MemoryStore {
    fn save(&mut self, token: &str, value: Value) -> Result<(), StoreError> {
        self.values.insert(token.to_string(), value);
        self.writes += 1;
        Ok(())
    }

    fn load(&self, token: &str) -> Option<Value> {
        self.values.get(token).copied()
    }
}

impl<S: NonVolatile + ?Sized> NonVolatile for &mut S {
    fn save(&mut self, token: &str, value: Value) -> Result<(), StoreError> {
        (**self).save(token, value)
    }

    fn load(&self, token: &str) -> Option<Value> {
        (**self).load(token)
    }
}

#[cfg(feature = "json-store")]
pub use file::FileStore;

#[cfg(feature = "json-store")]
mod file {
    use std::fs;
    use std::io;
    use std::path::{Path, PathBuf};

    use log::{debug, info, warn};

    use super::*;

    /// JSON file store for host builds.
    ///
    /// The whole map is rewritten on every save and read back to catch
    /// silent write failures.
    #[derive(Debug)]
    pub struct FileStore {
        path: PathBuf,
        values: BTreeMap<String, Value>,
    }

    impl FileStore {
        /// `~/.etarget/settings.json`
        pub fn default_path() -> io::Result<PathBuf> {
            let home = std::env::var("HOME")
                .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
            Ok(PathBuf::from(home).join(".etarget").join("settings.json"))
        }

        /// Open the store at `path`. A missing file is an empty store; an
        /// unreadable one is logged and treated as empty.
        pub fn open(path: impl AsRef<Path>) -> Self {
            let path = path.as_ref().to_path_buf();
            let values = match fs::read_to_string(&path) {
                Ok(text) => match serde_json::from_str(&text) {
                    Ok(values) => values,
                    Err(e) => {
                        warn!("ignoring corrupt settings file {}: {e}", path.display());
                        BTreeMap::new()
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("no settings file at {}", path.display());
                    BTreeMap::new()
                }
                Err(e) => {
                    warn!("failed to read settings file {}: {e}", path.display());
                    BTreeMap::new()
                }
            };
            Self { path, values }
        }

        pub fn path(&self) -> &Path {
            &self.path
        }

        fn flush(&self, values: &BTreeMap<String, Value>, token: &str) -> Result<(), StoreError> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let text = serde_json::to_string_pretty(values)?;
            fs::write(&self.path, &text)?;

            let read_back = fs::read_to_string(&self.path)?;
            if read_back != text {
                return Err(StoreError::Verify {
                    token: token.to_string(),
                });
            }
            Ok(())
        }
    }

    impl NonVolatile for FileStore {
        fn save(&mut self, token: &str, value: Value) -> Result<(), StoreError> {
            // Only the map that reached the disk becomes visible to `load`.
            let mut values = self.values.clone();
            values.insert(token.to_string(), value);
            self.flush(&values, token)?;
            self.values = values;
            info!("saved {token} to {}", self.path.display());
            Ok(())
        }

        fn load(&self, token: &str) -> Option<Value> {
            self.values.get(token).copied()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let mut store = MemoryStore::new();
        assert_eq!(store.load("NAME_ID"), None);
        store.save("NAME_ID", Value::Int16(7)).unwrap();
        store.save("SENSOR", Value::Double(231.0)).unwrap();
        assert_eq!(store.load("NAME_ID"), Some(Value::Int16(7)));
        assert_eq!(store.load("SENSOR"), Some(Value::Double(231.0)));
        assert_eq!(store.writes(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn borrowed_store_writes_through() {
        fn put(mut store: impl NonVolatile) {
            store.save("ECHO", Value::Int16(1)).unwrap();
        }

        let mut store = MemoryStore::new();
        put(&mut store);
        assert_eq!(store.load("ECHO"), Some(Value::Int16(1)));
        assert_eq!(store.writes(), 1);
    }

    #[cfg(feature = "json-store")]
    mod file {
        use std::env;
        use std::path::PathBuf;
        use std::sync::atomic::{AtomicU32, Ordering};

        use super::super::*;

        static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

        fn unique_path() -> PathBuf {
            let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
            env::temp_dir().join(format!("etarget-test-{}-{}.json", std::process::id(), id))
        }

        #[test]
        fn survives_reopen() {
            let path = unique_path();
            let mut store = FileStore::open(&path);
            assert_eq!(store.load("NAME_ID"), None);
            store.save("NAME_ID", Value::Int16(3)).unwrap();
            store.save("SENSOR", Value::Double(229.5)).unwrap();

            let reopened = FileStore::open(&path);
            assert_eq!(reopened.load("NAME_ID"), Some(Value::Int16(3)));
            assert_eq!(reopened.load("SENSOR"), Some(Value::Double(229.5)));

            let _ = std::fs::remove_file(&path);
        }

        #[test]
        fn failed_write_is_not_visible() {
            // A regular file where the parent directory should be.
            let blocker = unique_path();
            std::fs::write(&blocker, "").unwrap();
            let mut store = FileStore::open(blocker.join("settings.json"));

            assert!(matches!(
                store.save("NAME_ID", Value::Int16(5)),
                Err(StoreError::Io(_))
            ));
            assert_eq!(store.load("NAME_ID"), None);

            let _ = std::fs::remove_file(&blocker);
        }

        #[test]
        fn corrupt_file_is_empty() {
            let path = unique_path();
            std::fs::write(&path, "not json").unwrap();
            let store = FileStore::open(&path);
            assert_eq!(store.load("NAME_ID"), None);
            let _ = std::fs::remove_file(&path);
        }
    }
}
