//! Snapshot configuration
//!
//! Controls which sub-analyses a snapshot runs. Path summarization, drop-off
//! attribution and time-to-complete each re-scan the event store, so latency
//! sensitive callers can switch them off.

use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;

/// Path depth used by snapshots (shallower than ad-hoc path queries)
pub const SNAPSHOT_PATH_DEPTH: usize = 5;

/// Which sub-analyses a snapshot includes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Run the path summarizer
    #[serde(default = "default_true")]
    pub include_paths: bool,
    /// Convert per-funnel drop-offs into rates
    #[serde(default = "default_true")]
    pub include_dropoffs: bool,
    /// Measure time-to-complete on the first multi-step funnel
    #[serde(default = "default_true")]
    pub include_time: bool,
    /// Count error events
    #[serde(default = "default_true")]
    pub include_error_count: bool,
    /// Analyze at most this many funnel definitions (all when unset)
    #[serde(default)]
    pub max_funnels: Option<usize>,
    /// Depth passed to the path summarizer
    #[serde(default = "default_path_depth")]
    pub path_depth: usize,
}

fn default_true() -> bool {
    true
}

fn default_path_depth() -> usize {
    SNAPSHOT_PATH_DEPTH
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            include_paths: true,
            include_dropoffs: true,
            include_time: true,
            include_error_count: true,
            max_funnels: None,
            path_depth: SNAPSHOT_PATH_DEPTH,
        }
    }
}

impl SnapshotConfig {
    /// Only funnel conversion; every optional scan disabled
    pub fn minimal() -> Self {
        Self {
            include_paths: false,
            include_dropoffs: false,
            include_time: false,
            include_error_count: false,
            ..Self::default()
        }
    }

    /// Load from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, AnalyticsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
