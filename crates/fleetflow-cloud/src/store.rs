//! Cluster record persistence
//!
//! Provides the update collaborator used by providers: an atomic
//! read-modify-write over a versioned record. Every successful write bumps the
//! record's `resource_version`; callers must continue with the returned
//! snapshot instead of their local copy.
//!
//! Two backends are provided:
//!
//! - [`MemoryStore`]: process-local, used by controllers that keep their own
//!   source of truth and by tests
//! - [`FileStore`]: one JSON document per record under
//!   `.fleetflow/clusters/`, with a backup of the previous version and a lock
//!   file guarding each write

use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".fleetflow";
const CLUSTERS_DIR: &str = "clusters";

/// A record with an identity and an optimistic-concurrency version
pub trait Versioned: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable record key (the cluster name)
    fn key(&self) -> &str;

    fn resource_version(&self) -> u64;

    fn set_resource_version(&mut self, version: u64);
}

/// Pure patch applied by the store to the latest persisted record
pub type Patch<T> = Box<dyn FnOnce(T) -> T + Send>;

/// Box a closure as a [`Patch`]
pub fn patch<T, F>(f: F) -> Patch<T>
where
    F: FnOnce(T) -> T + Send + 'static,
{
    Box::new(f)
}

/// Versioned record store
#[async_trait]
pub trait ClusterStore<T: Versioned>: Send + Sync {
    /// Fetch the latest persisted record
    async fn get(&self, name: &str) -> Result<T>;

    /// Persist a new record, failing if one already exists
    async fn create(&self, record: T) -> Result<T>;

    /// Apply `patch` to the latest persisted record and return the new snapshot
    async fn update(&self, name: &str, patch: Patch<T>) -> Result<T>;

    /// Overwrite the record if `record` carries the current version
    async fn replace(&self, record: T) -> Result<T>;

    /// Remove the record
    async fn delete(&self, name: &str) -> Result<()>;
}

fn apply_patch<T: Versioned>(name: &str, current: T, patch: Patch<T>) -> Result<T> {
    let version = current.resource_version();
    let mut next = patch(current);
    if next.key() != name {
        return Err(CloudError::StateError(format!(
            "patch renamed record {} to {}",
            name,
            next.key()
        )));
    }
    next.set_resource_version(version + 1);
    Ok(next)
}

fn check_version<T: Versioned>(current: &T, incoming: &T) -> Result<()> {
    if current.resource_version() != incoming.resource_version() {
        return Err(CloudError::Conflict(format!(
            "{} has version {}, got {}",
            current.key(),
            current.resource_version(),
            incoming.resource_version()
        )));
    }
    Ok(())
}

/// In-memory record store
pub struct MemoryStore<T> {
    records: Mutex<HashMap<String, T>>,
}

impl<T: Versioned> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Build a store seeded with `records`
    pub fn with_records(records: impl IntoIterator<Item = T>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.key().to_string(), r))
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }
}

impl<T: Versioned> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Versioned> ClusterStore<T> for MemoryStore<T> {
    async fn get(&self, name: &str) -> Result<T> {
        self.records
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::ResourceNotFound(name.to_string()))
    }

    async fn create(&self, mut record: T) -> Result<T> {
        let mut records = self.records.lock().await;
        if records.contains_key(record.key()) {
            return Err(CloudError::ResourceAlreadyExists(record.key().to_string()));
        }
        record.set_resource_version(1);
        records.insert(record.key().to_string(), record.clone());
        Ok(record)
    }

    async fn update(&self, name: &str, patch: Patch<T>) -> Result<T> {
        let mut records = self.records.lock().await;
        let current = records
            .get(name)
            .cloned()
            .ok_or_else(|| CloudError::ResourceNotFound(name.to_string()))?;
        let next = apply_patch(name, current, patch)?;
        records.insert(name.to_string(), next.clone());
        Ok(next)
    }

    async fn replace(&self, mut record: T) -> Result<T> {
        let mut records = self.records.lock().await;
        let current = records
            .get(record.key())
            .ok_or_else(|| CloudError::ResourceNotFound(record.key().to_string()))?;
        check_version(current, &record)?;
        record.set_resource_version(record.resource_version() + 1);
        records.insert(record.key().to_string(), record.clone());
        Ok(record)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.records
            .lock()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CloudError::ResourceNotFound(name.to_string()))
    }
}

/// On-disk envelope around a record
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord<T> {
    /// State file version
    version: u32,

    /// Last modified timestamp
    updated_at: DateTime<Utc>,

    record: T,
}

/// JSON file backed record store
pub struct FileStore<T> {
    /// Project root directory
    project_root: PathBuf,
    _record: std::marker::PhantomData<fn() -> T>,
}

impl<T: Versioned> FileStore<T> {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            _record: std::marker::PhantomData,
        }
    }

    fn records_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR).join(CLUSTERS_DIR)
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.records_dir().join(format!("{}.json", name))
    }

    fn backup_path(&self, name: &str) -> PathBuf {
        self.records_dir().join(format!("{}.json.backup", name))
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.records_dir().join(format!("{}.lock", name))
    }

    async fn ensure_records_dir(&self) -> Result<()> {
        let dir = self.records_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<T> {
        validate_name(name)?;
        let path = self.record_path(name);
        if !path.exists() {
            return Err(CloudError::ResourceNotFound(name.to_string()));
        }

        let content = fs::read_to_string(&path).await?;
        let stored: StoredRecord<T> = serde_json::from_str(&content)?;

        if stored.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                stored.version, STATE_VERSION
            )));
        }

        Ok(stored.record)
    }

    async fn save(&self, record: &T) -> Result<()> {
        self.ensure_records_dir().await?;

        let name = record.key();
        let path = self.record_path(name);
        let backup = self.backup_path(name);

        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
        }

        let stored = StoredRecord {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            record,
        };
        let content = serde_json::to_string_pretty(&stored)?;
        fs::write(&path, content).await?;

        tracing::debug!(
            "Saved {} at version {}",
            name,
            record.resource_version()
        );
        Ok(())
    }

    /// Acquire the per-record write lock
    ///
    /// The lock file is created exclusively, so at most one writer holds it.
    /// A lock older than an hour is taken over once.
    async fn acquire_lock(&self, name: &str) -> Result<StateLock> {
        validate_name(name)?;
        self.ensure_records_dir().await?;

        let lock_path = self.lock_path(name);
        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&lock_info)?;

        if try_create_lock(&lock_path, &content).await? {
            return Ok(StateLock::new(lock_path));
        }

        let existing = fs::read_to_string(&lock_path).await?;
        let held: LockInfo = serde_json::from_str(&existing)?;

        // Locks older than an hour belong to a crashed writer
        let age = Utc::now().signed_duration_since(held.acquired_at);
        if age.num_hours() < 1 {
            return Err(CloudError::LockError(format!(
                "{} is locked by {} since {}",
                name, held.holder, held.acquired_at
            )));
        }

        tracing::warn!("Removing stale lock on {} from {}", name, held.holder);
        fs::remove_file(&lock_path).await?;

        if try_create_lock(&lock_path, &content).await? {
            Ok(StateLock::new(lock_path))
        } else {
            Err(CloudError::LockError(format!(
                "{} was locked by another writer while taking over a stale lock",
                name
            )))
        }
    }
}

/// Create the lock file if it does not exist yet; `false` when it does
async fn try_create_lock(path: &Path, content: &str) -> Result<bool> {
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await;

    match file {
        Ok(mut file) => {
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Record names become file names and must stay inside the records directory
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(CloudError::StateError(format!(
            "invalid record name {:?}",
            name
        )));
    }
    Ok(())
}

#[async_trait]
impl<T: Versioned> ClusterStore<T> for FileStore<T> {
    async fn get(&self, name: &str) -> Result<T> {
        self.load(name).await
    }

    async fn create(&self, mut record: T) -> Result<T> {
        let lock = self.acquire_lock(record.key()).await?;
        if self.record_path(record.key()).exists() {
            lock.release().await?;
            return Err(CloudError::ResourceAlreadyExists(record.key().to_string()));
        }
        record.set_resource_version(1);
        let saved = self.save(&record).await;
        lock.release().await?;
        saved.map(|_| record)
    }

    async fn update(&self, name: &str, patch: Patch<T>) -> Result<T> {
        let lock = self.acquire_lock(name).await?;
        let result = async {
            let current = self.load(name).await?;
            let next = apply_patch(name, current, patch)?;
            self.save(&next).await?;
            Ok::<T, CloudError>(next)
        }
        .await;
        lock.release().await?;
        result
    }

    async fn replace(&self, mut record: T) -> Result<T> {
        let name = record.key().to_string();
        let lock = self.acquire_lock(&name).await?;
        let result = async {
            let current = self.load(&name).await?;
            check_version(&current, &record)?;
            record.set_resource_version(record.resource_version() + 1);
            self.save(&record).await?;
            Ok::<T, CloudError>(record)
        }
        .await;
        lock.release().await?;
        result
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let lock = self.acquire_lock(name).await?;
        let path = self.record_path(name);
        let result = if path.exists() {
            fs::remove_file(&path).await.map_err(CloudError::from)
        } else {
            Err(CloudError::ResourceNotFound(name.to_string()))
        };
        lock.release().await?;
        result
    }
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for a record lock
struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    fn new(lock_path: PathBuf) -> Self {
        Self {
            lock_path,
            released: false,
        }
    }

    async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
