//! `MemoryService`: the composition root.
//!
//! Owns one instance of every component and exposes the two paths the
//! serving layer uses:
//!
//! - **Read path** ([`MemoryService::build_content`], [`MemoryService::build_prompt`]):
//!   builder zones + shared insights + stored notes, optionally fitted into
//!   a prompt. Never fails.
//! - **Write path** ([`MemoryService::build_and_persist`], [`MemoryService::append_notes`]):
//!   serialized per key, idempotent and atomic. Errors surface once to the
//!   caller and are not retried.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wayfarer_config::AppConfig;
use wayfarer_core::agent::{AgentKind, EntityKey, validate_trip_id};
use wayfarer_core::document::{MemoryDocument, NotesZone, has_notes_marker, splice_notes};
use wayfarer_core::error::{ConfigurationError, MemoryError};
use wayfarer_core::snapshot::StateSnapshot;

use crate::budget::{TokenBudgeter, estimate_tokens};
use crate::builder::ContentBuilder;
use crate::notes::{AppendReport, NotesPolicy, NotesStore};
use crate::prompt::PromptFramer;
use crate::shared::{SharedInsight, SharedInsightIndex};
use crate::store::DocumentStore;
use crate::throttle::LogThrottle;
use crate::writer::{WriteCoordinator, WriteOutcome};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Size and notes summary of one stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentStats {
    pub agent: AgentKind,
    pub size_bytes: usize,
    pub estimated_tokens: usize,
    pub has_notes: bool,
}

pub struct MemoryService {
    builder: ContentBuilder,
    writer: Arc<WriteCoordinator>,
    notes: Arc<NotesStore>,
    shared: SharedInsightIndex,
    framer: PromptFramer,
    budgeter: TokenBudgeter,
    stale_after: Duration,
    snapshot_throttle: LogThrottle,
}

impl MemoryService {
    /// Wire every component from configuration.
    ///
    /// Fails when the builder registry does not match the configured memory
    /// agents. Call once at startup, before serving requests.
    pub fn new(config: &AppConfig) -> Result<Self, ConfigurationError> {
        let memory = &config.memory;
        if memory.max_pinned == 0 || memory.max_ephemeral == 0 || memory.max_shared == 0 {
            return Err(ConfigurationError::Invalid(
                "note caps must be greater than zero".into(),
            ));
        }

        let builder = ContentBuilder::new(&memory.agents, &memory.notes_agents)?;
        let store = DocumentStore::new(&memory.storage_root, &memory.extension);
        let writer = Arc::new(WriteCoordinator::new(store, memory.size_warn_bytes));
        let policy = NotesPolicy {
            max_pinned: memory.max_pinned,
            max_ephemeral: memory.max_ephemeral,
            eligible: builder.notes_agents().clone(),
        };
        let notes = Arc::new(NotesStore::new(writer.clone(), policy));
        let shared = SharedInsightIndex::new(notes.clone(), builder.agents(), memory.max_shared);

        info!(
            root = %memory.storage_root.display(),
            agents = builder.agents().count(),
            notes_agents = builder.notes_agents().len(),
            "Memory service ready"
        );

        Ok(Self {
            builder,
            writer,
            notes,
            shared,
            framer: PromptFramer::new(&config.budget),
            budgeter: TokenBudgeter::new(),
            stale_after: Duration::from_secs(u64::from(memory.stale_after_days) * SECS_PER_DAY),
            snapshot_throttle: LogThrottle::default(),
        })
    }

    pub fn builder(&self) -> &ContentBuilder {
        &self.builder
    }

    pub fn store(&self) -> &DocumentStore {
        self.writer.store()
    }

    pub fn writer(&self) -> &Arc<WriteCoordinator> {
        &self.writer
    }

    pub fn budgeter(&self) -> &TokenBudgeter {
        &self.budgeter
    }

    /// Decode a JSON snapshot leniently, logging discarded fields.
    pub fn decode_snapshot(&self, value: &Value) -> StateSnapshot {
        let decoded = StateSnapshot::decode(value);
        if !decoded.degraded_fields.is_empty() && self.snapshot_throttle.should_log() {
            warn!(
                fields = ?decoded.degraded_fields,
                occurrences = self.snapshot_throttle.occurrences(),
                "Malformed snapshot fields ignored"
            );
        }
        decoded.snapshot
    }

    // ── Read path ─────────────────────────────────────────────────────────

    /// Auto-refreshed and cross-agent zones, without notes.
    fn refreshed_document(&self, trip_id: &str, agent: AgentKind, snapshot: &StateSnapshot) -> MemoryDocument {
        let mut doc = self.builder.document(agent, snapshot);
        let cross = self.shared.to_zone(trip_id, agent);
        if !cross.is_empty() {
            doc.zones.push(cross);
        }
        doc
    }

    /// Full document for `agent`: zones, shared insights and stored notes.
    pub fn build_document(&self, trip_id: &str, agent: AgentKind, snapshot: &StateSnapshot) -> MemoryDocument {
        let mut doc = self.refreshed_document(trip_id, agent, snapshot);
        if let Ok(key) = EntityKey::new(trip_id, agent) {
            doc.notes = self.notes.read_notes(&key);
        }
        doc
    }

    /// Rendered memory for `agent`, or an empty string when the agent has no
    /// memory.
    pub fn build_content(&self, trip_id: &str, agent: AgentKind, snapshot: &StateSnapshot) -> String {
        if !self.builder.supports(agent) {
            return String::new();
        }
        self.build_document(trip_id, agent, snapshot).render()
    }

    /// `base_prompt` with the agent's memory fitted and appended.
    pub fn build_prompt(
        &self,
        trip_id: &str,
        agent: AgentKind,
        snapshot: &StateSnapshot,
        base_prompt: &str,
    ) -> String {
        let memory = self.build_content(trip_id, agent, snapshot);
        self.framer.frame(agent, base_prompt, &memory)
    }

    pub fn read_notes(&self, key: &EntityKey) -> NotesZone {
        self.notes.read_notes(key)
    }

    pub fn read_shared(&self, trip_id: &str, exclude: AgentKind) -> Vec<SharedInsight> {
        self.shared.read_shared(trip_id, exclude)
    }

    // ── Write path ────────────────────────────────────────────────────────

    /// Rebuild and store the document for `key`.
    ///
    /// Zones are built outside the lock; the stored notes are re-read under
    /// the lock, so a concurrent append is never overwritten.
    pub async fn build_and_persist(&self, key: &EntityKey, snapshot: &StateSnapshot) -> Result<WriteOutcome, MemoryError> {
        let agent = key.agent();
        if !self.builder.supports(agent) {
            debug!(key = %key, "Agent has no memory; nothing to persist");
            return Ok(WriteOutcome::Skipped);
        }
        let head = self.refreshed_document(key.trip_id(), agent, snapshot).render();
        self.writer
            .update(key, move |current| {
                let notes = current
                    .as_deref()
                    .map(|text| NotesZone::from_document(text, agent))
                    .unwrap_or_default();
                Some(splice_notes(&head, &notes))
            })
            .await
    }

    /// Run [`MemoryService::build_and_persist`] on the runtime, detached from
    /// the caller's response.
    pub fn persist_in_background(
        self: &Arc<Self>,
        key: EntityKey,
        snapshot: StateSnapshot,
    ) -> JoinHandle<Result<WriteOutcome, MemoryError>> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.build_and_persist(&key, &snapshot).await;
            if let Err(e) = &result {
                warn!(key = %key, error = %e, "Background memory persist failed");
            }
            result
        })
    }

    /// Store `content` verbatim for `key`.
    pub async fn write(&self, key: &EntityKey, content: String) -> Result<WriteOutcome, MemoryError> {
        self.writer.write(key, content).await
    }

    pub async fn append_notes<S: AsRef<str>>(
        &self,
        key: &EntityKey,
        candidates: &[S],
    ) -> Result<AppendReport, MemoryError> {
        self.notes.append_notes(key, candidates).await
    }

    // ── Maintenance ───────────────────────────────────────────────────────

    /// Size and token estimates for every stored document of a trip.
    pub fn stats(&self, trip_id: &str) -> Vec<DocumentStats> {
        if validate_trip_id(trip_id).is_err() {
            return Vec::new();
        }
        self.store()
            .agents_in_trip(trip_id)
            .into_iter()
            .filter_map(|agent| {
                let key = EntityKey::new(trip_id, agent).ok()?;
                match self.store().read(&key) {
                    Ok(Some(text)) => Some(DocumentStats {
                        agent,
                        size_bytes: text.len(),
                        estimated_tokens: estimate_tokens(&text),
                        has_notes: has_notes_marker(&text),
                    }),
                    Ok(None) => None,
                    Err(e) => {
                        warn!(key = %key, error = %e, "Skipping unreadable document in stats");
                        None
                    }
                }
            })
            .collect()
    }

    /// Delete every document of a trip and its lock entries.
    pub async fn cleanup_trip(&self, trip_id: &str) -> Result<bool, MemoryError> {
        self.writer.remove_trip(trip_id).await
    }

    /// Remove trips idle for longer than the configured staleness window.
    pub async fn sweep_stale(&self) -> Result<Vec<String>, MemoryError> {
        self.sweep_older_than(self.stale_after).await
    }

    /// Remove trips whose newest document is older than `max_age`.
    pub async fn sweep_older_than(&self, max_age: Duration) -> Result<Vec<String>, MemoryError> {
        match SystemTime::now().checked_sub(max_age) {
            Some(cutoff) => self.sweep_before(cutoff).await,
            None => Ok(Vec::new()),
        }
    }

    /// Remove trips whose newest document was modified before `cutoff`.
    /// Trip directories without files are left alone. Returns removed ids,
    /// sorted.
    pub async fn sweep_before(&self, cutoff: SystemTime) -> Result<Vec<String>, MemoryError> {
        let root = self.store().root().to_path_buf();
        let trips = self
            .store()
            .list_trips()
            .map_err(|e| MemoryError::storage(&root, e))?;

        let mut removed = Vec::new();
        for trip_id in trips {
            let latest = match self.store().latest_modification(&trip_id) {
                Ok(latest) => latest,
                Err(e) => {
                    warn!(trip_id = %trip_id, error = %e, "Cannot inspect trip directory; skipping");
                    continue;
                }
            };
            if latest.is_some_and(|modified| modified < cutoff) && self.cleanup_trip(&trip_id).await? {
                removed.push(trip_id);
            }
        }

        if !removed.is_empty() {
            info!(count = removed.len(), trips = ?removed, "Swept stale trip memory");
        }
        Ok(removed)
    }
}
