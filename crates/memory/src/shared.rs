//! Cross-agent insight propagation.
//!
//! Computed on demand from sibling documents; there is no persisted inbox.
//! A shared note becomes visible to siblings on the first read after the
//! write that stored it has completed.

use std::sync::Arc;

use serde::Serialize;

use wayfarer_core::agent::{AgentKind, EntityKey};
use wayfarer_core::document::{SHARED_TAG, Zone};

use crate::notes::NotesStore;

/// A shared note attributed to the agent that wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedInsight {
    pub source_agent: AgentKind,
    pub text: String,
}

impl SharedInsight {
    /// `[planner] - [shared] Prefers slow mornings`
    pub fn render(&self) -> String {
        format!("[{}] - {SHARED_TAG} {}", self.source_agent, self.text)
    }
}

/// Reads `[shared]` notes across the agents of one trip.
pub struct SharedInsightIndex {
    notes: Arc<NotesStore>,
    /// Memory agents, sorted by name for a stable merge order.
    agents: Vec<AgentKind>,
    max_shared: usize,
}

impl SharedInsightIndex {
    pub fn new(notes: Arc<NotesStore>, agents: impl IntoIterator<Item = AgentKind>, max_shared: usize) -> Self {
        let mut agents: Vec<AgentKind> = agents.into_iter().collect();
        agents.sort_by_key(|a| a.name());
        agents.dedup();
        Self {
            notes,
            agents,
            max_shared,
        }
    }

    /// Shared notes of every sibling of `exclude` in `trip_id`, capped.
    ///
    /// Siblings are visited in agent-name order; each contributes its lines
    /// oldest first.
    pub fn read_shared(&self, trip_id: &str, exclude: AgentKind) -> Vec<SharedInsight> {
        self.agents
            .iter()
            .filter(|agent| **agent != exclude)
            .filter_map(|agent| EntityKey::new(trip_id, *agent).ok())
            .flat_map(|key| {
                let zone = self.notes.read_notes(&key);
                zone.shared()
                    .map(|line| SharedInsight {
                        source_agent: key.agent(),
                        text: line.text.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .take(self.max_shared)
            .collect()
    }

    /// The cross-agent zone for `exclude`'s document. Empty when no sibling
    /// shares anything.
    pub fn to_zone(&self, trip_id: &str, exclude: AgentKind) -> Zone {
        self.read_shared(trip_id, exclude)
            .iter()
            .fold(Zone::cross_agent(), |zone, insight| zone.line(insight.render()))
    }
}
