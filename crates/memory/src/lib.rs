//! Per-agent trip memory for Wayfarer.
//!
//! Every `(trip_id, agent)` pair owns one markdown document under the
//! storage root. A document merges auto-refreshed zones (rebuilt from the
//! trip snapshot on every build), a cross-agent insights zone, and an
//! append-only notes zone with bounded growth.
//!
//! Components, leaves first:
//!
//! - [`budget`]: token estimation and deterministic truncation
//! - [`builder`]: pure zone builders per agent
//! - [`notes`]: notes parsing, filtering and capped appends
//! - [`shared`]: `[shared]` notes gathered across sibling agents
//! - [`writer`]: per-key locking with idempotent, atomic persistence
//! - [`service`]: the composition root used by callers

pub mod budget;
pub mod builder;
pub mod notes;
pub mod prompt;
pub mod service;
pub mod shared;
pub mod store;
pub mod throttle;
pub mod writer;

pub use budget::{FitReport, TokenBudgeter, estimate_tokens};
pub use builder::ContentBuilder;
pub use notes::{AppendReport, NotesPolicy, NotesStore};
pub use prompt::PromptFramer;
pub use service::{DocumentStats, MemoryService};
pub use shared::{SharedInsight, SharedInsightIndex};
pub use store::DocumentStore;
pub use throttle::LogThrottle;
pub use writer::{StagedWrite, WriteCoordinator, WriteOutcome};
