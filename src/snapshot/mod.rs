//! Snapshots: composition, comparison and history
//!
//! Pipeline: analyzers → SnapshotComposer → Snapshot → SnapshotHistory →
//! SnapshotComparator → ComparisonDiff
//!
//! Snapshots are built fresh per request and never mutated afterwards. The
//! comparator is a pure function of two snapshots; the diff holds no reference to
//! either.

pub mod compare;
pub mod composer;
pub mod history;

pub use compare::SnapshotComparator;
pub use composer::SnapshotComposer;
pub use history::{SnapshotComparison, SnapshotHistory, StoredSnapshot, DEFAULT_HISTORY_WINDOW};

/// Round half away from zero to `places` decimals
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
