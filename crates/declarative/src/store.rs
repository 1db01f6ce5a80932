//! Persistent per-resource state across runs
//!
//! The harness records the last applied ("system") value of each property so
//! the next run can tell drift from an intentional change. Schedules use the
//! last checked time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;
use crate::types::{ResourceRef, Value};

/// Storage for values that must survive between runs
///
/// Implementations use interior mutability; the harness only holds a shared
/// reference.
pub trait StateStore: Send + Sync {
    /// Last persisted value of a property
    fn system_value(&self, resource: &ResourceRef, property: &str) -> Option<Value>;

    /// Persist the value of a property
    fn set_system_value(&self, resource: &ResourceRef, property: &str, value: Value);

    /// When the resource was last evaluated
    fn checked(&self, resource: &ResourceRef) -> Option<DateTime<Utc>>;

    fn set_checked(&self, resource: &ResourceRef, time: DateTime<Utc>);

    /// When the resource last changed
    fn synced(&self, resource: &ResourceRef) -> Option<DateTime<Utc>>;

    fn set_synced(&self, resource: &ResourceRef, time: DateTime<Utc>);
}

/// Everything recorded about one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    #[serde(default)]
    pub system_values: BTreeMap<String, Value>,
    pub checked: Option<DateTime<Utc>>,
    pub synced: Option<DateTime<Utc>>,
}

type Records = HashMap<String, ResourceRecord>;

fn with_record<T>(records: &Records, resource: &ResourceRef, f: impl FnOnce(&ResourceRecord) -> Option<T>) -> Option<T> {
    records.get(&resource.to_string()).and_then(f)
}

fn record_mut<'a>(records: &'a mut Records, resource: &ResourceRef) -> &'a mut ResourceRecord {
    records.entry(resource.to_string()).or_default()
}

fn lock(records: &Mutex<Records>) -> MutexGuard<'_, Records> {
    records
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

macro_rules! impl_state_store {
    ($store:ty) => {
        impl StateStore for $store {
            fn system_value(&self, resource: &ResourceRef, property: &str) -> Option<Value> {
                with_record(&lock(&self.records), resource, |r| {
                    r.system_values.get(property).cloned()
                })
            }

            fn set_system_value(&self, resource: &ResourceRef, property: &str, value: Value) {
                record_mut(&mut lock(&self.records), resource)
                    .system_values
                    .insert(property.to_string(), value);
            }

            fn checked(&self, resource: &ResourceRef) -> Option<DateTime<Utc>> {
                with_record(&lock(&self.records), resource, |r| r.checked)
            }

            fn set_checked(&self, resource: &ResourceRef, time: DateTime<Utc>) {
                record_mut(&mut lock(&self.records), resource).checked = Some(time);
            }

            fn synced(&self, resource: &ResourceRef) -> Option<DateTime<Utc>> {
                with_record(&lock(&self.records), resource, |r| r.synced)
            }

            fn set_synced(&self, resource: &ResourceRef, time: DateTime<Utc>) {
                record_mut(&mut lock(&self.records), resource).synced = Some(time);
            }
        }
    };
}

/// In-memory store, used for noop previews and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Records>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl_state_store!(MemoryStore);

/// JSON-file backed store
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl FileStore {
    /// Open a store, loading existing state if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let records: Records = serde_json::from_str(&content)?;
            log::debug!("Loaded state for {} resource(s) from {}", records.len(), path.display());
            records
        } else {
            log::debug!("State file {} does not exist, starting empty", path.display());
            Records::new()
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the state to disk atomically
    pub fn save(&self) -> Result<()> {
        let content = {
            let records = lock(&self.records);
            serde_json::to_string_pretty(&*records)?
        };

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(
            ".{}.tmp",
            self.path
                .file_name()
                .map_or_else(|| "state".into(), |n| n.to_string_lossy())
        ));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

impl_state_store!(FileStore);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn r() -> ResourceRef {
        ResourceRef::new("file", "/tmp/a")
    }

    #[test]
    fn test_memory_store_values() {
        let store = MemoryStore::new();
        assert!(store.system_value(&r(), "content").is_none());

        store.set_system_value(&r(), "content", json!(["hello"]));
        assert_eq!(store.system_value(&r(), "content"), Some(json!(["hello"])));
        assert!(store.system_value(&r(), "mode").is_none());
        assert!(store.checked(&r()).is_none());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let now = Utc::now();

        let store = FileStore::open(&path).unwrap();
        store.set_system_value(&r(), "ensure", json!(["present"]));
        store.set_checked(&r(), now);
        store.save().unwrap();
        assert!(path.exists());

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.system_value(&r(), "ensure"), Some(json!(["present"])));
        assert_eq!(reopened.checked(&r()), Some(now));
        assert!(reopened.synced(&r()).is_none());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();
        assert!(FileStore::open(&path).is_err());
    }
}
