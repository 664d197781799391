//! Stored snapshot history
//!
//! Keeps a rolling window of snapshots per tenant so the newest can be compared
//! against the one before it. The history serializes to JSON for persistence
//! between runs.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::SnapshotComparator;
use crate::error::AnalyticsError;
use crate::types::{ComparisonDiff, Snapshot};

/// Default number of snapshots kept per tenant
pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// A snapshot as persisted by its creator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    pub id: Uuid,
    pub tenant: String,
    pub created_at: DateTime<Utc>,
    pub snapshot: Snapshot,
}

/// Diff of a tenant's two most recent snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotComparison {
    pub previous_id: Uuid,
    pub previous_created_at: DateTime<Utc>,
    pub latest_id: Uuid,
    pub latest_created_at: DateTime<Utc>,
    pub diff: ComparisonDiff,
    pub compared_at: DateTime<Utc>,
}

/// Rolling per-tenant snapshot history, oldest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHistory {
    entries: VecDeque<StoredSnapshot>,
    /// Maximum snapshots kept per tenant
    window_size: usize,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

impl SnapshotHistory {
    /// Create a history keeping `window_size` snapshots per tenant (at least two)
    pub fn new(window_size: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            window_size: window_size.max(2),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Store `snapshot` under its tenant, evicting that tenant's oldest entry
    /// once the window is full
    pub fn record(&mut self, snapshot: Snapshot) -> &StoredSnapshot {
        let stored = StoredSnapshot {
            id: Uuid::new_v4(),
            tenant: snapshot.tenant.clone(),
            created_at: Utc::now(),
            snapshot,
        };
        let tenant = stored.tenant.clone();
        self.entries.push_back(stored);

        while self.count(&tenant) > self.window_size {
            match self.entries.iter().position(|e| e.tenant == tenant) {
                Some(oldest) => {
                    self.entries.remove(oldest);
                }
                None => break,
            }
        }

        debug!(tenant = %tenant, stored = self.count(&tenant), "snapshot recorded");
        &self.entries[self.entries.len() - 1]
    }

    /// Most recent snapshot for `tenant`
    pub fn latest(&self, tenant: &str) -> Option<&StoredSnapshot> {
        self.entries.iter().rev().find(|e| e.tenant == tenant)
    }

    /// Up to `limit` snapshots for `tenant`, newest first
    pub fn list(&self, tenant: &str, limit: usize) -> Vec<&StoredSnapshot> {
        self.entries
            .iter()
            .rev()
            .filter(|e| e.tenant == tenant)
            .take(limit)
            .collect()
    }

    /// Compare the two most recent snapshots for `tenant`
    pub fn compare_latest(&self, tenant: &str) -> Result<SnapshotComparison, AnalyticsError> {
        let recent = self.list(tenant, 2);
        let [latest, previous] = recent.as_slice() else {
            return Err(AnalyticsError::NotEnoughHistory(format!(
                "tenant '{tenant}' has {} stored snapshot(s); at least 2 are needed",
                recent.len()
            )));
        };

        Ok(SnapshotComparison {
            previous_id: previous.id,
            previous_created_at: previous.created_at,
            latest_id: latest.id,
            latest_created_at: latest.created_at,
            diff: SnapshotComparator::compare(&previous.snapshot, &latest.snapshot),
            compared_at: Utc::now(),
        })
    }

    /// Total snapshots across all tenants
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn count(&self, tenant: &str) -> usize {
        self.entries.iter().filter(|e| e.tenant == tenant).count()
    }

    /// Load history from JSON
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        let mut history: Self = serde_json::from_str(json)?;
        history.window_size = history.window_size.max(2);
        Ok(history)
    }

    /// Serialize history to JSON
    pub fn to_json(&self) -> Result<String, AnalyticsError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Trend;
    use pretty_assertions::assert_eq;

    fn snapshot(tenant: &str, conversion_rate: f64, error_count: u64) -> Snapshot {
        Snapshot {
            conversion_rate: Some(conversion_rate),
            error_count,
            ..Snapshot::empty(tenant)
        }
    }

    #[test]
    fn test_compare_needs_two_snapshots() {
        let mut history = SnapshotHistory::default();
        assert!(matches!(
            history.compare_latest("app-key"),
            Err(AnalyticsError::NotEnoughHistory(_))
        ));

        history.record(snapshot("app-key", 0.5, 0));
        assert!(matches!(
            history.compare_latest("app-key"),
            Err(AnalyticsError::NotEnoughHistory(_))
        ));
    }

    #[test]
    fn test_compare_latest_pair() {
        let mut history = SnapshotHistory::default();
        history.record(snapshot("app-key", 0.9, 0));
        let previous_id = history.record(snapshot("app-key", 0.5, 1)).id;
        history.record(snapshot("other", 0.1, 0));
        let latest_id = history.record(snapshot("app-key", 0.4, 6)).id;

        let comparison = history.compare_latest("app-key").unwrap();
        assert_eq!(comparison.previous_id, previous_id);
        assert_eq!(comparison.latest_id, latest_id);
        assert_eq!(
            comparison.diff.issues,
            vec![
                "Conversion rate dropped by 10.0%".to_string(),
                "Error events increased from 1 to 6".to_string(),
            ]
        );
        assert_eq!(comparison.diff.overall_trend, Trend::Degrading);
    }

    #[test]
    fn test_window_is_per_tenant() {
        let mut history = SnapshotHistory::new(2);
        history.record(snapshot("other", 0.1, 0));
        for rate in [0.1, 0.2, 0.3] {
            history.record(snapshot("app-key", rate, 0));
        }

        assert_eq!(history.len(), 3);
        let rates: Vec<Option<f64>> = history
            .list("app-key", 10)
            .iter()
            .map(|s| s.snapshot.conversion_rate)
            .collect();
        assert_eq!(rates, vec![Some(0.3), Some(0.2)]);
        assert!(history.latest("other").is_some());
    }

    #[test]
    fn test_window_floor() {
        assert_eq!(SnapshotHistory::new(0).window_size(), 2);
    }

    #[test]
    fn test_json_roundtrip_keeps_order() {
        let mut history = SnapshotHistory::new(5);
        history.record(snapshot("app-key", 0.2, 0));
        history.record(snapshot("app-key", 0.3, 0));

        let restored = SnapshotHistory::from_json(&history.to_json().unwrap()).unwrap();
        assert_eq!(restored.window_size(), 5);
        assert_eq!(
            restored.latest("app-key").unwrap(),
            history.latest("app-key").unwrap()
        );

        history.clear();
        assert!(history.is_empty());
    }
}
