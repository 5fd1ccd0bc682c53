//! Write coordination: per-key locking, idempotent and atomic persistence.
//!
//! Every mutation of a memory document goes through [`WriteCoordinator`]:
//!
//! 1. Acquire the exclusive lock for the `(trip_id, agent)` key. Locks are
//!    created lazily under a single map mutex, so two callers can never end
//!    up with different locks for the same key.
//! 2. Compare the SHA-256 fingerprint of the new content against the stored
//!    bytes. Equal content returns [`WriteOutcome::Unchanged`] without
//!    touching storage.
//! 3. Stage the content in a fresh temporary file in the target directory,
//!    fsync it, and atomically rename it over the target.
//!
//! Writes hold at most one key lock. Trip cleanup takes every key lock of
//! the trip in [`AgentKind::ALL`] order and retires the entries before
//! releasing them; a writer that was queued on a retired lock retries on
//! the live one. A failed or abandoned write leaves the previous document
//! in place.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::sync::{Mutex as KeyLock, OwnedMutexGuard};
use tracing::{debug, warn};

use wayfarer_core::agent::{AgentKind, EntityKey, validate_trip_id};
use wayfarer_core::error::MemoryError;

use crate::budget::tokens_for_bytes;
use crate::store::DocumentStore;

/// Result of a write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Stored bytes already matched; storage was not touched.
    Unchanged,
    /// A new version was atomically installed.
    Written { bytes: usize },
    /// The update closure declined to produce content.
    Skipped,
}

impl WriteOutcome {
    pub fn mutated(self) -> bool {
        matches!(self, WriteOutcome::Written { .. })
    }
}

/// SHA-256 fingerprint of document bytes.
pub fn fingerprint(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

// ── Atomic file replacement ───────────────────────────────────────────────

/// Content staged in a temporary file next to its target, fsynced but not
/// yet visible. Dropping it without [`StagedWrite::commit`] removes the
/// temporary file and leaves the target untouched.
pub struct StagedWrite {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedWrite {
    /// Create the temporary file in the target's directory, write and fsync.
    /// The staged file takes over the permissions of an existing target.
    pub fn stage(target: &Path, content: &[u8]) -> Result<Self, MemoryError> {
        let dir = target
            .parent()
            .ok_or_else(|| MemoryError::storage(target, "target has no parent directory"))?;
        std::fs::create_dir_all(dir).map_err(|e| MemoryError::storage(dir, e))?;

        let prefix = target
            .file_name()
            .map(|n| format!(".{}.", n.to_string_lossy()))
            .unwrap_or_else(|| ".".to_string());
        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| MemoryError::storage(dir, e))?;

        // On any error below `tmp` is dropped and the file removed.
        if let Ok(meta) = std::fs::metadata(target) {
            tmp.as_file()
                .set_permissions(meta.permissions())
                .map_err(|e| MemoryError::storage(tmp.path(), e))?;
        }
        tmp.write_all(content)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| MemoryError::storage(tmp.path(), e))?;

        Ok(Self {
            tmp,
            target: target.to_path_buf(),
        })
    }

    /// Path of the staged temporary file.
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Atomically rename the staged file over the target.
    pub fn commit(self) -> Result<(), MemoryError> {
        let target = self.target;
        self.tmp
            .persist(&target)
            .map_err(|e| MemoryError::storage(&target, e.error))?;
        sync_parent(&target);
        Ok(())
    }

    /// Abandon the staged file without removing it, as a crashed process
    /// would. Returns the leftover path.
    pub fn abandon(self) -> Result<PathBuf, MemoryError> {
        let (_, path) = self
            .tmp
            .keep()
            .map_err(|e| MemoryError::storage(&self.target, e.error))?;
        Ok(path)
    }
}

/// Make the rename itself durable. Best effort; not all platforms support
/// syncing a directory handle.
fn sync_parent(target: &Path) {
    #[cfg(unix)]
    if let Some(dir) = target.parent()
        && let Ok(handle) = std::fs::File::open(dir)
    {
        let _ = handle.sync_all();
    }
    #[cfg(not(unix))]
    let _ = target;
}

/// Fingerprint check plus atomic replace. Runs on the blocking pool.
fn persist_blocking(target: &Path, content: &[u8]) -> Result<WriteOutcome, MemoryError> {
    match std::fs::read(target) {
        Ok(existing) if fingerprint(&existing) == fingerprint(content) => {
            return Ok(WriteOutcome::Unchanged);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(MemoryError::storage(target, e)),
    }
    StagedWrite::stage(target, content)?.commit()?;
    Ok(WriteOutcome::Written {
        bytes: content.len(),
    })
}

// ── Coordinator ───────────────────────────────────────────────────────────

/// Owns the per-key lock map and is the only component that mutates storage.
///
/// Construct once at startup and share by `Arc`.
pub struct WriteCoordinator {
    store: DocumentStore,
    locks: Mutex<HashMap<EntityKey, Arc<KeyLock<()>>>>,
    size_warn_bytes: usize,
}

impl WriteCoordinator {
    pub fn new(store: DocumentStore, size_warn_bytes: usize) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            size_warn_bytes,
        }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Get or lazily create the lock for `key`.
    fn lock_for(&self, key: &EntityKey) -> Arc<KeyLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(KeyLock::new(())))
            .clone()
    }

    /// Number of live lock entries.
    pub fn lock_count(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether `lock` is still the live lock for `key`.
    fn is_live(&self, key: &EntityKey, lock: &Arc<KeyLock<()>>) -> bool {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .is_some_and(|live| Arc::ptr_eq(live, lock))
    }

    /// Acquire the live lock for `key`. A lock retired by trip cleanup while
    /// we waited on it is released and the live one acquired instead.
    async fn acquire(&self, key: &EntityKey) -> OwnedMutexGuard<()> {
        loop {
            let lock = self.lock_for(key);
            let guard = Arc::clone(&lock).lock_owned().await;
            if self.is_live(key, &lock) {
                return guard;
            }
        }
    }

    /// Drop every lock entry belonging to `trip_id`. Callers hold all of
    /// those locks. Returns how many were removed.
    fn retire_trip(&self, trip_id: &str) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = locks.len();
        locks.retain(|key, _| key.trip_id() != trip_id);
        before - locks.len()
    }

    /// Replace the document for `key` with `content`.
    pub async fn write(&self, key: &EntityKey, content: String) -> Result<WriteOutcome, MemoryError> {
        let _guard = self.acquire(key).await;
        self.persist(key, content).await
    }

    /// Read-modify-write under the key lock.
    ///
    /// `update` receives the stored document (`None` when absent or
    /// unreadable) and returns the new content, or `None` to leave storage
    /// alone.
    pub async fn update<F>(&self, key: &EntityKey, update: F) -> Result<WriteOutcome, MemoryError>
    where
        F: FnOnce(Option<String>) -> Option<String>,
    {
        let _guard = self.acquire(key).await;

        let path = self.store.path_for(key);
        let current = match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Stored document unreadable; rebuilding from scratch");
                None
            }
        };

        match update(current) {
            Some(content) => self.persist(key, content).await,
            None => Ok(WriteOutcome::Skipped),
        }
    }

    /// Caller must hold the key lock.
    async fn persist(&self, key: &EntityKey, content: String) -> Result<WriteOutcome, MemoryError> {
        let path = self.store.path_for(key);
        let bytes = content.into_bytes();
        let size = bytes.len();

        let outcome = tokio::task::spawn_blocking(move || persist_blocking(&path, &bytes))
            .await
            .map_err(|e| MemoryError::TaskFailed(e.to_string()))??;

        match outcome {
            WriteOutcome::Unchanged => debug!(key = %key, "Memory unchanged; write skipped"),
            _ => self.observe_size(key, size),
        }
        Ok(outcome)
    }

    fn observe_size(&self, key: &EntityKey, size: usize) {
        let tokens = tokens_for_bytes(size);
        debug!(key = %key, bytes = size, tokens, "Memory written");
        if size > self.size_warn_bytes {
            warn!(
                key = %key,
                bytes = size,
                tokens,
                limit_kb = self.size_warn_bytes / 1024,
                "Memory document exceeds size threshold"
            );
        }
    }

    /// Remove a trip's directory and its lock entries. Returns whether a
    /// directory was removed.
    ///
    /// Every key lock of the trip is held while the directory is deleted, so
    /// no write is in flight and none can recreate the directory halfway.
    /// Writes queued behind the cleanup run afterwards on fresh locks.
    pub async fn remove_trip(&self, trip_id: &str) -> Result<bool, MemoryError> {
        validate_trip_id(trip_id)?;
        let mut guards = Vec::with_capacity(AgentKind::ALL.len());
        for agent in AgentKind::ALL {
            let key = EntityKey::new(trip_id, agent)?;
            guards.push(self.acquire(&key).await);
        }

        let dir = self.store.trip_dir(trip_id);
        let removed = match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(MemoryError::storage(&dir, e)),
        };
        let locks = self.retire_trip(trip_id);
        drop(guards);

        debug!(trip_id, removed, locks, "Trip memory cleaned up");
        Ok(removed)
    }
}
