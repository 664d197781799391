//! Funnel Flux - Streaming, session-scoped behavioral analytics
//!
//! Flux turns an ordered event scan into product analytics through single-pass
//! session state machines: event store → session runs → analyzers → snapshot →
//! comparison.
//!
//! ## Modules
//!
//! - **Analysis**: funnel conversion, drop-off attribution, path summaries and
//!   time-to-complete over a forward-only cursor
//! - **Snapshot**: per-tenant metric bundles, their history and rule-based diffs
//! - **Store**: event source and funnel definition interfaces with an in-memory
//!   implementation and NDJSON loading

pub mod analysis;
pub mod config;
pub mod error;
pub mod snapshot;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::SnapshotConfig;
pub use error::AnalyticsError;

// Analyzer exports
pub use analysis::{DropoffAttributor, EventCounter, FunnelMatcher, IntervalTimer, PathSummarizer};

// Snapshot exports
pub use snapshot::{SnapshotComparator, SnapshotComposer, SnapshotHistory};

// Store exports
pub use store::{DefinitionStore, EventFilter, EventSource, MemoryStore};

/// Flux version reported by the CLI
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "funnel-flux";
