use crate::layout::Layout;
use crate::lock::RegistryLock;
use crate::record::{validate_env_name, EnvRecord};
use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// Current registry file format. Incremented on incompatible changes.
pub const REGISTRY_FORMAT_VERSION: u32 = 1;

/// In-memory view of the registry, keyed (and therefore ordered) by name.
pub type Records = BTreeMap<String, EnvRecord>;

#[derive(Debug, Serialize, Deserialize)]
struct RegistryFile {
    format_version: u32,
    environments: Vec<EnvRecord>,
    /// blake3 over the serialized `environments` array. `None` for hand-written files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

fn compute_checksum(environments: &[EnvRecord]) -> Result<String, StoreError> {
    let json = serde_json::to_string(environments)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// Durable name → record mapping stored as a single JSON document.
///
/// Reads take no lock and may observe a snapshot that is stale by the time it
/// is used. All writes go through [`transaction`](Self::transaction), which
/// holds the [`RegistryLock`] across load, mutation and atomic persist.
pub struct Registry {
    layout: Layout,
}

impl Registry {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Load the registry. A missing file is an empty registry.
    pub fn load(&self) -> Result<Records, StoreError> {
        let path = self.layout.registry_file();
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Records::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Records::new());
        }

        let file: RegistryFile = serde_json::from_str(&content)?;
        if file.format_version != REGISTRY_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: REGISTRY_FORMAT_VERSION,
                found: file.format_version,
            });
        }
        if let Some(ref expected) = file.checksum {
            let actual = compute_checksum(&file.environments)?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        let mut records = Records::new();
        for rec in file.environments {
            if records.contains_key(&rec.name) {
                return Err(StoreError::DuplicateRecord(rec.name));
            }
            records.insert(rec.name.clone(), rec);
        }
        Ok(records)
    }

    fn persist(&self, records: &Records) -> Result<(), StoreError> {
        let environments: Vec<EnvRecord> = records.values().cloned().collect();
        let checksum = Some(compute_checksum(&environments)?);
        let file = RegistryFile {
            format_version: REGISTRY_FORMAT_VERSION,
            environments,
            checksum,
        };
        let content = serde_json::to_string_pretty(&file)?;

        let dir = self.layout.config_dir();
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.layout.registry_file())
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(dir)?;
        debug!("registry persisted with {} record(s)", records.len());
        Ok(())
    }

    /// All records, ordered by name ascending.
    pub fn list(&self) -> Result<Vec<EnvRecord>, StoreError> {
        Ok(self.load()?.into_values().collect())
    }

    pub fn get(&self, name: &str) -> Result<EnvRecord, StoreError> {
        self.load()?
            .remove(name)
            .ok_or_else(|| StoreError::EnvNotFound(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.load()?.contains_key(name))
    }

    pub fn lock(&self) -> Result<RegistryLock, StoreError> {
        RegistryLock::acquire(&self.layout.lock_file())
    }

    pub fn try_lock(&self) -> Result<Option<RegistryLock>, StoreError> {
        RegistryLock::try_acquire(&self.layout.lock_file())
    }

    /// Run a read-modify-write cycle under the registry lock.
    ///
    /// The closure sees the freshly loaded records. The registry is persisted
    /// only if the closure succeeds and actually changed something.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Records) -> Result<T, E>,
        E: From<StoreError>,
    {
        let lock = self.lock()?;
        self.transaction_locked(&lock, f)
    }

    /// Same as [`transaction`](Self::transaction) for a caller that already
    /// holds the lock across several steps.
    pub fn transaction_locked<T, E, F>(&self, _lock: &RegistryLock, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Records) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut records = self.load()?;
        let before = records.clone();
        let out = f(&mut records)?;
        if records != before {
            self.persist(&records)?;
        }
        Ok(out)
    }

    pub fn insert(&self, record: EnvRecord) -> Result<(), StoreError> {
        validate_env_name(&record.name)?;
        self.transaction(|records| {
            ensure_unique(records, &record.name, &record.path)?;
            records.insert(record.name.clone(), record);
            Ok(())
        })
    }

    pub fn remove(&self, name: &str) -> Result<EnvRecord, StoreError> {
        self.transaction(|records| {
            records
                .remove(name)
                .ok_or_else(|| StoreError::EnvNotFound(name.to_owned()))
        })
    }

    /// Mutate one record in place and bump its `updated_at`.
    pub fn update<F>(&self, name: &str, f: F) -> Result<EnvRecord, StoreError>
    where
        F: FnOnce(&mut EnvRecord),
    {
        self.transaction(|records| {
            let rec = records
                .get_mut(name)
                .ok_or_else(|| StoreError::EnvNotFound(name.to_owned()))?;
            f(rec);
            rec.touch();
            Ok(rec.clone())
        })
    }
}

/// Reject a candidate whose name is registered, or whose root equals,
/// contains, or lies inside a registered root. Deleting a prefix removes its
/// whole tree, so nested roots would take another prefix's files with them.
pub fn ensure_unique(records: &Records, name: &str, path: &Path) -> Result<(), StoreError> {
    if records.contains_key(name) {
        return Err(StoreError::NameConflict(name.to_owned()));
    }
    for existing in records.values() {
        if existing.path == path {
            return Err(StoreError::PathConflict {
                path: path.display().to_string(),
                existing: existing.name.clone(),
            });
        }
        if path.starts_with(&existing.path) || existing.path.starts_with(path) {
            return Err(StoreError::PathOverlap {
                path: path.display().to_string(),
                existing: existing.name.clone(),
                existing_path: existing.path.display().to_string(),
            });
        }
    }
    Ok(())
}
