//! Content builders: pure assembly of auto-refreshed zones from a snapshot.
//!
//! Each [`AgentKind`] maps to exactly one builder through an exhaustive
//! `match`, so adding an agent without a builder does not compile. At
//! startup the registry is checked against the configured set of memory
//! agents; any difference is a [`ConfigurationError`].
//!
//! Building never fails and performs no I/O. Missing snapshot fields leave
//! their zones empty, and empty zones are omitted.

mod agents;
pub mod context;
pub mod sections;

use std::collections::{BTreeMap, BTreeSet};

use wayfarer_core::agent::AgentKind;
use wayfarer_core::document::{MemoryDocument, Zone};
use wayfarer_core::error::ConfigurationError;
use wayfarer_core::snapshot::StateSnapshot;

pub use context::{FieldGroup, format_usd, trip_context};

/// A builder turns a snapshot into an ordered list of zones.
pub type BuildFn = fn(&StateSnapshot) -> Vec<Zone>;

/// The builder for `kind`.
pub fn builder_for(kind: AgentKind) -> BuildFn {
    match kind {
        AgentKind::Research => agents::research,
        AgentKind::Planner => agents::planner,
        AgentKind::Scheduler => agents::scheduler,
        AgentKind::Prioritizer => agents::prioritizer,
        AgentKind::Feedback => agents::feedback,
        AgentKind::Cost => agents::cost,
    }
}

/// `"Research Memory - Japan Trip"`
pub fn document_title(kind: AgentKind, snapshot: &StateSnapshot) -> String {
    format!("{} Memory - {}", kind.display_name(), snapshot.title())
}

/// Validated builder registry.
#[derive(Debug, Clone)]
pub struct ContentBuilder {
    builders: BTreeMap<AgentKind, BuildFn>,
    notes_agents: BTreeSet<AgentKind>,
}

impl ContentBuilder {
    /// Build the registry for every agent kind and check it against the
    /// configured memory agents and notes agents.
    pub fn new<S: AsRef<str>>(agents: &[S], notes_agents: &[S]) -> Result<Self, ConfigurationError> {
        let builders = AgentKind::ALL
            .into_iter()
            .map(|kind| (kind, builder_for(kind)))
            .collect();
        Self::with_builders(builders, agents, notes_agents)
    }

    /// Check an explicit registry against the configured agents.
    pub fn with_builders<S: AsRef<str>>(
        builders: BTreeMap<AgentKind, BuildFn>,
        agents: &[S],
        notes_agents: &[S],
    ) -> Result<Self, ConfigurationError> {
        let configured = parse_agents(agents)?;

        let missing: Vec<String> = configured
            .iter()
            .filter(|kind| !builders.contains_key(kind))
            .map(|kind| kind.name().to_string())
            .collect();
        let unexpected: Vec<String> = builders
            .keys()
            .filter(|kind| !configured.contains(kind))
            .map(|kind| kind.name().to_string())
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(ConfigurationError::RegistryMismatch {
                missing,
                unexpected,
            });
        }

        let mut stray = Vec::new();
        let mut notes = BTreeSet::new();
        for name in notes_agents {
            match name.as_ref().parse::<AgentKind>() {
                Ok(kind) if configured.contains(&kind) => {
                    notes.insert(kind);
                }
                _ => stray.push(name.as_ref().to_string()),
            }
        }
        if !stray.is_empty() {
            return Err(ConfigurationError::NotesNotSubset(stray));
        }

        Ok(Self {
            builders,
            notes_agents: notes,
        })
    }

    /// Registered agents, in declaration order.
    pub fn agents(&self) -> impl Iterator<Item = AgentKind> + '_ {
        self.builders.keys().copied()
    }

    pub fn notes_agents(&self) -> &BTreeSet<AgentKind> {
        &self.notes_agents
    }

    pub fn supports(&self, kind: AgentKind) -> bool {
        self.builders.contains_key(&kind)
    }

    /// Non-empty auto-refreshed zones for `kind`. Unregistered kinds build
    /// nothing.
    pub fn build(&self, kind: AgentKind, snapshot: &StateSnapshot) -> Vec<Zone> {
        self.builders
            .get(&kind)
            .map(|build| build(snapshot))
            .unwrap_or_default()
            .into_iter()
            .filter(|zone| !zone.is_empty())
            .collect()
    }

    /// Titled document holding the auto-refreshed zones only.
    pub fn document(&self, kind: AgentKind, snapshot: &StateSnapshot) -> MemoryDocument {
        let mut doc = MemoryDocument::new(document_title(kind, snapshot));
        doc.zones = self.build(kind, snapshot);
        doc
    }
}

fn parse_agents<S: AsRef<str>>(names: &[S]) -> Result<BTreeSet<AgentKind>, ConfigurationError> {
    names
        .iter()
        .map(|name| {
            name.as_ref()
                .parse::<AgentKind>()
                .map_err(|e| ConfigurationError::UnknownAgent(e.0))
        })
        .collect()
}
