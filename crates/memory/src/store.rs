//! On-disk layout of memory documents.
//!
//! Storage location: `<root>/<trip_id>/<agent>.<extension>`
//!
//! Reads here are synchronous: documents are small and the read path must
//! not suspend. All mutation goes through [`crate::writer::WriteCoordinator`].

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use wayfarer_core::agent::{AgentKind, EntityKey};

/// Resolves entity keys to document paths and performs read-only access.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    extension: String,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trip_dir(&self, trip_id: &str) -> PathBuf {
        self.root.join(trip_id)
    }

    pub fn path_for(&self, key: &EntityKey) -> PathBuf {
        self.trip_dir(key.trip_id())
            .join(format!("{}.{}", key.agent().name(), self.extension))
    }

    /// Read a document. A missing file is `Ok(None)`.
    pub fn read(&self, key: &EntityKey) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Agents with a stored document in this trip, in declaration order.
    pub fn agents_in_trip(&self, trip_id: &str) -> Vec<AgentKind> {
        AgentKind::ALL
            .into_iter()
            .filter(|agent| {
                EntityKey::new(trip_id, *agent)
                    .map(|key| self.path_for(&key).is_file())
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Names of all trip directories under the root, sorted.
    pub fn list_trips(&self) -> io::Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut trips = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(name) = entry.file_name().to_str()
            {
                trips.push(name.to_string());
            }
        }
        trips.sort();
        Ok(trips)
    }

    /// Most recent modification time of any file in the trip directory.
    /// `None` when the directory holds no files.
    pub fn latest_modification(&self, trip_id: &str) -> io::Result<Option<SystemTime>> {
        let mut latest: Option<SystemTime> = None;
        for entry in std::fs::read_dir(self.trip_dir(trip_id))? {
            let meta = entry?.metadata()?;
            if meta.is_file() {
                let modified = meta.modified()?;
                latest = Some(latest.map_or(modified, |l| l.max(modified)));
            }
        }
        Ok(latest)
    }
}
