//! # Wayfarer Core
//!
//! Domain types and error definitions for the Wayfarer trip memory store.
//! This crate performs **no I/O**. It defines the document model, the
//! entity key, and the state snapshot that the other crates build on.
//!
//! ## Design Philosophy
//!
//! - The document text format lives here, next to the types it renders,
//!   so parsing and rendering can never drift apart.
//! - Snapshot records decode leniently; the read path never fails.
//! - Errors are split per bounded context (write path vs. startup).

pub mod error;
pub mod agent;
pub mod document;
pub mod snapshot;

// Re-export key types at crate root for ergonomics
pub use error::{ConfigurationError, Error, MemoryError, Result};
pub use agent::{AgentKind, EntityKey};
pub use document::{MemoryDocument, NoteLine, NoteTags, NotesZone, Zone, ZoneKind};
pub use snapshot::StateSnapshot;
