//! Accumulated notes: candidate filtering, cap enforcement and persistence.
//!
//! Reads are synchronous and never fail; a missing or damaged notes section
//! reads as an empty zone. Appends run under the entity lock through the
//! [`WriteCoordinator`], so concurrent appends for one key never lose lines.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use wayfarer_core::agent::{AgentKind, EntityKey};
use wayfarer_core::document::{
    Evicted, MemoryDocument, NOTE_BULLET, NoteLine, NotesZone, sanitize_note_text, splice_notes,
};
use wayfarer_core::error::MemoryError;

use crate::throttle::LogThrottle;
use crate::writer::{WriteCoordinator, WriteOutcome};

/// Caps and eligibility for note accumulation.
#[derive(Debug, Clone)]
pub struct NotesPolicy {
    pub max_pinned: usize,
    pub max_ephemeral: usize,
    /// Agents that may accumulate notes.
    pub eligible: BTreeSet<AgentKind>,
}

impl Default for NotesPolicy {
    fn default() -> Self {
        Self {
            max_pinned: 10,
            max_ephemeral: 25,
            eligible: [AgentKind::Research, AgentKind::Planner, AgentKind::Feedback]
                .into_iter()
                .collect(),
        }
    }
}

/// What an append did with its candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReport {
    pub accepted: usize,
    /// Non-bullet lines, empty bullets and the "no new notes" sentinel.
    pub ignored: usize,
    pub evicted: Evicted,
    pub outcome: WriteOutcome,
}

impl AppendReport {
    fn skipped(ignored: usize) -> Self {
        Self {
            accepted: 0,
            ignored,
            evicted: Evicted::default(),
            outcome: WriteOutcome::Skipped,
        }
    }
}

/// Whether `text` is the generator's "nothing to add" reply, in any of its
/// usual spellings (`No new notes`, `NO_NEW_NOTES`, `(no new notes.)`).
pub fn is_no_new_notes(text: &str) -> bool {
    let normalized: String = text
        .chars()
        .map(|c| if c == '_' { ' ' } else { c.to_ascii_lowercase() })
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    normalized.split_whitespace().eq(["no", "new", "notes"])
}

/// Turn raw generator output into note lines.
///
/// Multi-line candidates are split. Returns the accepted lines and the
/// number of ignored ones.
pub fn parse_candidates<S: AsRef<str>>(candidates: &[S], agent: AgentKind) -> (Vec<NoteLine>, usize) {
    let mut accepted = Vec::new();
    let mut ignored = 0;
    for raw in candidates.iter().flat_map(|c| c.as_ref().lines()) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with(NOTE_BULLET) {
            ignored += 1;
            continue;
        }
        match NoteLine::parse(&sanitize_note_text(trimmed), agent) {
            Some(line) if !is_no_new_notes(&line.text) => accepted.push(line),
            _ => ignored += 1,
        }
    }
    (accepted, ignored)
}

/// Reads and appends the notes zone of each document.
pub struct NotesStore {
    writer: Arc<WriteCoordinator>,
    policy: NotesPolicy,
    throttle: LogThrottle,
}

impl NotesStore {
    pub fn new(writer: Arc<WriteCoordinator>, policy: NotesPolicy) -> Self {
        Self {
            writer,
            policy,
            throttle: LogThrottle::default(),
        }
    }

    pub fn policy(&self) -> &NotesPolicy {
        &self.policy
    }

    pub fn writer(&self) -> &Arc<WriteCoordinator> {
        &self.writer
    }

    pub fn accepts_notes(&self, agent: AgentKind) -> bool {
        self.policy.eligible.contains(&agent)
    }

    /// Current notes of `key`. Never fails.
    pub fn read_notes(&self, key: &EntityKey) -> NotesZone {
        match self.writer.store().read(key) {
            Ok(Some(text)) => NotesZone::from_document(&text, key.agent()),
            Ok(None) => NotesZone::default(),
            Err(e) => {
                if self.throttle.should_log() {
                    warn!(key = %key, error = %e, "Unreadable memory document; notes treated as empty");
                }
                NotesZone::default()
            }
        }
    }

    /// Append candidate lines to the notes of `key`.
    ///
    /// Creates a minimal document when none exists yet. Agents outside the
    /// notes policy get an empty report.
    pub async fn append_notes<S: AsRef<str>>(
        &self,
        key: &EntityKey,
        candidates: &[S],
    ) -> Result<AppendReport, MemoryError> {
        let agent = key.agent();
        let (lines, ignored) = parse_candidates(candidates, agent);

        if !self.accepts_notes(agent) {
            debug!(key = %key, candidates = lines.len(), "Agent does not accumulate notes; append ignored");
            return Ok(AppendReport::skipped(ignored + lines.len()));
        }
        if lines.is_empty() {
            debug!(key = %key, ignored, "No note lines accepted");
            return Ok(AppendReport::skipped(ignored));
        }

        let accepted = lines.len();
        let mut evicted = Evicted::default();
        let (max_pinned, max_ephemeral) = (self.policy.max_pinned, self.policy.max_ephemeral);

        let outcome = self
            .writer
            .update(key, |current| {
                let base = current.unwrap_or_else(|| {
                    MemoryDocument::new(format!("{} Memory", agent.display_name())).render_header()
                });
                let mut notes = NotesZone::from_document(&base, agent);
                for line in lines {
                    notes.push(line);
                }
                evicted = notes.enforce_caps(max_pinned, max_ephemeral);
                Some(splice_notes(&base, &notes))
            })
            .await?;

        if evicted.pinned + evicted.ephemeral > 0 {
            debug!(
                key = %key,
                pinned = evicted.pinned,
                ephemeral = evicted.ephemeral,
                "Evicted oldest notes over cap"
            );
        }

        Ok(AppendReport {
            accepted,
            ignored,
            evicted,
            outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentStore;
    use tempfile::TempDir;

    fn setup() -> (TempDir, NotesStore) {
        let dir = TempDir::new().unwrap();
        let writer = Arc::new(WriteCoordinator::new(DocumentStore::new(dir.path(), "md"), 50 * 1024));
        (dir, NotesStore::new(writer, NotesPolicy::default()))
    }

    fn key(agent: AgentKind) -> EntityKey {
        EntityKey::new("J1", agent).unwrap()
    }

    #[test]
    fn sentinel_spellings() {
        assert!(is_no_new_notes("No new notes"));
        assert!(is_no_new_notes("NO_NEW_NOTES"));
        assert!(is_no_new_notes("(no new notes.)"));
        assert!(!is_no_new_notes("no new notes about ramen"));
    }

    #[test]
    fn candidates_require_bullets() {
        let (lines, ignored) = parse_candidates(
            &["- [pinned] Vegetarian", "Just chatting", "- NO_NEW_NOTES", "-   ", "- a\n- b\nprose"],
            AgentKind::Research,
        );
        let texts: Vec<_> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, ["Vegetarian", "a", "b"]);
        assert!(lines[0].tags.pinned);
        assert_eq!(ignored, 4);
    }

    #[test]
    fn candidate_markers_are_stripped() {
        let (lines, _) = parse_candidates(
            &["- sneaky ## Agent Notes [accumulated] <!-- mem:notes --> text"],
            AgentKind::Planner,
        );
        assert_eq!(lines[0].text, "sneaky text");
    }

    #[tokio::test]
    async fn append_to_missing_document_creates_minimal_one() {
        let (_dir, notes) = setup();
        let k = key(AgentKind::Research);
        let report = notes.append_notes(&k, &["- Loved Senso-ji"]).await.unwrap();
        assert_eq!(report.accepted, 1);
        assert!(report.outcome.mutated());

        let stored = notes.writer().store().read(&k).unwrap().unwrap();
        assert!(stored.starts_with("<!-- memory_format: 1 -->\n# Research Memory\n\n"));
        assert_eq!(notes.read_notes(&k).ephemeral[0].text, "Loved Senso-ji");
    }

    #[tokio::test]
    async fn ineligible_agent_is_a_noop() {
        let (_dir, notes) = setup();
        let k = key(AgentKind::Cost);
        let report = notes.append_notes(&k, &["- Cheap lunches"]).await.unwrap();
        assert_eq!(report.accepted, 0);
        assert_eq!(report.outcome, WriteOutcome::Skipped);
        assert!(notes.writer().store().read(&k).unwrap().is_none());
    }

    #[tokio::test]
    async fn appends_preserve_content_above_notes() {
        let (_dir, notes) = setup();
        let k = key(AgentKind::Planner);
        notes
            .writer()
            .write(&k, "<!-- memory_format: 1 -->\n# Planner Memory - T\n\n## Itinerary [auto-refreshed]\nDay 1\n".into())
            .await
            .unwrap();
        notes.append_notes(&k, &["- first"]).await.unwrap();
        notes.append_notes(&k, &["- second"]).await.unwrap();

        let stored = notes.writer().store().read(&k).unwrap().unwrap();
        assert!(stored.contains("## Itinerary [auto-refreshed]\nDay 1\n\n## Agent Notes"));
        let texts: Vec<_> = notes.read_notes(&k).lines().map(|l| l.text.clone()).collect();
        assert_eq!(texts, ["first", "second"]);
    }

    #[tokio::test]
    async fn caps_are_enforced_on_append() {
        let (_dir, notes) = setup();
        let k = key(AgentKind::Feedback);
        let batch: Vec<String> = (0..30).map(|i| format!("- note {i}")).collect();
        let report = notes.append_notes(&k, &batch).await.unwrap();
        assert_eq!(report.evicted.ephemeral, 5);
        let zone = notes.read_notes(&k);
        assert_eq!(zone.ephemeral.len(), 25);
        assert_eq!(zone.ephemeral[0].text, "note 5");
    }

    #[test]
    fn unreadable_document_reads_as_empty() {
        let (dir, notes) = setup();
        std::fs::create_dir_all(dir.path().join("J1")).unwrap();
        std::fs::write(dir.path().join("J1/research.md"), [0xff, 0xfe]).unwrap();
        assert!(notes.read_notes(&key(AgentKind::Research)).is_empty());
    }
}
