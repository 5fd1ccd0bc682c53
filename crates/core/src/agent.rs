//! Agent kinds and entity keys.
//!
//! Every memory document belongs to exactly one `(trip_id, agent)` pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MemoryError;

/// The specialist agents that own a memory document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Research,
    Planner,
    Scheduler,
    Prioritizer,
    Feedback,
    Cost,
}

impl AgentKind {
    /// Every agent kind, in declaration order.
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Research,
        AgentKind::Planner,
        AgentKind::Scheduler,
        AgentKind::Prioritizer,
        AgentKind::Feedback,
        AgentKind::Cost,
    ];

    /// The storage name (`research`, `planner`, ...).
    pub fn name(self) -> &'static str {
        match self {
            AgentKind::Research => "research",
            AgentKind::Planner => "planner",
            AgentKind::Scheduler => "scheduler",
            AgentKind::Prioritizer => "prioritizer",
            AgentKind::Feedback => "feedback",
            AgentKind::Cost => "cost",
        }
    }

    /// Capitalized name used in document titles.
    pub fn display_name(self) -> &'static str {
        match self {
            AgentKind::Research => "Research",
            AgentKind::Planner => "Planner",
            AgentKind::Scheduler => "Scheduler",
            AgentKind::Prioritizer => "Prioritizer",
            AgentKind::Feedback => "Feedback",
            AgentKind::Cost => "Cost",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a string does not name a memory agent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a memory agent")]
pub struct UnknownAgentKind(pub String);

impl FromStr for AgentKind {
    type Err = UnknownAgentKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| UnknownAgentKind(s.to_string()))
    }
}

/// Identity of one memory document. Also the lock key of the write path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    trip_id: String,
    agent: AgentKind,
}

impl EntityKey {
    /// Build a key, rejecting trip ids that cannot be used as a single
    /// directory name under the storage root.
    pub fn new(trip_id: impl Into<String>, agent: AgentKind) -> Result<Self, MemoryError> {
        let trip_id = trip_id.into();
        validate_trip_id(&trip_id)?;
        Ok(Self { trip_id, agent })
    }

    pub fn trip_id(&self) -> &str {
        &self.trip_id
    }

    pub fn agent(&self) -> AgentKind {
        self.agent
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.trip_id, self.agent)
    }
}

/// Check that a trip id is a plain, non-empty path segment.
pub fn validate_trip_id(trip_id: &str) -> Result<(), MemoryError> {
    if trip_id.trim().is_empty() {
        return Err(MemoryError::InvalidKey("trip id is empty".into()));
    }
    if trip_id == "." || trip_id == ".." {
        return Err(MemoryError::InvalidKey(format!("trip id '{trip_id}' is reserved")));
    }
    if trip_id.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control()) {
        return Err(MemoryError::InvalidKey(format!(
            "trip id '{trip_id}' contains a path separator or control character"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in AgentKind::ALL {
            assert_eq!(kind.name().parse::<AgentKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_agent_is_rejected() {
        let err = "orchestrator".parse::<AgentKind>().unwrap_err();
        assert_eq!(err, UnknownAgentKind("orchestrator".into()));
    }

    #[test]
    fn key_rejects_path_traversal() {
        assert!(EntityKey::new("..", AgentKind::Research).is_err());
        assert!(EntityKey::new("a/b", AgentKind::Research).is_err());
        assert!(EntityKey::new("", AgentKind::Research).is_err());
        assert!(EntityKey::new("J1", AgentKind::Research).is_ok());
    }

    #[test]
    fn key_displays_as_path_like_pair() {
        let key = EntityKey::new("J1", AgentKind::Cost).unwrap();
        assert_eq!(key.to_string(), "J1/cost");
    }

    #[test]
    fn agent_kind_serializes_snake_case() {
        let json = serde_json::to_string(&AgentKind::Prioritizer).unwrap();
        assert_eq!(json, "\"prioritizer\"");
    }
}
