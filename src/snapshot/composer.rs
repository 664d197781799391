//! Snapshot composition
//!
//! Runs the analyzers for one tenant and folds their outputs into a single
//! [`Snapshot`]. The composer only reads; persisting the snapshot is up to the
//! caller (see [`super::SnapshotHistory`]).
//!
//! The first funnel definition is the primary funnel: its conversion rate becomes
//! the snapshot's top-level `conversion_rate`. Later funnels only appear in
//! `funnels`. Time-to-complete is measured once, on the first definition with at
//! least two steps.

use tracing::{debug, info};

use super::round_to;
use crate::analysis::{DropoffAttributor, EventCounter, FunnelMatcher, IntervalTimer, PathSummarizer};
use crate::config::SnapshotConfig;
use crate::error::AnalyticsError;
use crate::store::{DefinitionStore, EventSource};
use crate::types::{DropoffResult, FunnelDefinition, FunnelResult, Snapshot};

/// Builds snapshots from injected event and definition stores
pub struct SnapshotComposer<'a> {
    events: &'a dyn EventSource,
    definitions: &'a dyn DefinitionStore,
    config: SnapshotConfig,
}

impl<'a> SnapshotComposer<'a> {
    /// Create a composer running every sub-analysis
    pub fn new(events: &'a dyn EventSource, definitions: &'a dyn DefinitionStore) -> Self {
        Self {
            events,
            definitions,
            config: SnapshotConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SnapshotConfig) -> Self {
        self.config = config;
        self
    }

    /// Build a snapshot of every tracked metric for `tenant`
    pub fn compose(&self, tenant: &str) -> Result<Snapshot, AnalyticsError> {
        let config = &self.config;
        let scope = Some(tenant);
        let mut snapshot = Snapshot::empty(tenant);

        if config.include_paths {
            let paths = PathSummarizer::run(self.events, config.path_depth, scope)?;
            snapshot.unique_paths = paths.len() as u64;
            snapshot.paths = paths;
        }

        let definitions = self.load_definitions(tenant)?;
        let mut time_measured = false;

        for (position, definition) in definitions.iter().enumerate() {
            let steps = &definition.steps;
            let funnel = FunnelMatcher::run(self.events, steps, scope)?;
            debug!(
                tenant,
                funnel = %definition.name,
                conversion_rate = funnel.conversion_rate,
                "funnel analyzed"
            );

            if position == 0 {
                snapshot.conversion_rate = Some(funnel.conversion_rate);
            }

            if config.include_dropoffs {
                let dropoff = DropoffAttributor::run(self.events, steps, scope)?;
                for (step, rate) in dropoff_rates(&dropoff, &funnel) {
                    snapshot.dropoff_rates.insert(step, rate);
                }
            }

            if config.include_time && !time_measured && steps.len() >= 2 {
                time_measured = true;
                let interval =
                    IntervalTimer::run(self.events, &steps[0], &steps[steps.len() - 1], scope)?;
                snapshot.avg_time_to_complete_ms = interval.average_ms;
            }

            snapshot.funnels.insert(definition.name.as_str(), funnel);
        }

        if config.include_error_count {
            snapshot.error_count = EventCounter::count_errors(self.events, scope)?;
        }

        info!(
            tenant,
            funnels = snapshot.funnels.len(),
            unique_paths = snapshot.unique_paths,
            error_count = snapshot.error_count,
            "snapshot composed"
        );
        Ok(snapshot)
    }

    fn load_definitions(&self, tenant: &str) -> Result<Vec<FunnelDefinition>, AnalyticsError> {
        let mut definitions = self.definitions.list_definitions(tenant)?;
        if let Some(max) = self.config.max_funnels {
            definitions.truncate(max);
        }
        Ok(definitions)
    }
}

/// Drop-off counts as a share of entered sessions, rounded to 4 decimals.
/// Nothing is produced when no session entered the funnel.
fn dropoff_rates(dropoff: &DropoffResult, funnel: &FunnelResult) -> Vec<(String, f64)> {
    let entered = funnel.sessions_entered;
    if entered == 0 {
        return Vec::new();
    }
    dropoff
        .dropoffs
        .iter()
        .map(|(step, &count)| (step.to_string(), round_to(count as f64 / entered as f64, 4)))
        .collect()
}
