//! Event counting

use tracing::debug;

use crate::error::AnalyticsError;
use crate::store::{EventFilter, EventSource};
use crate::types::EventCounts;

/// Substring marking an event as an error (matched case-insensitively)
pub const ERROR_MARKER: &str = "error";

/// Event frequency counter
pub struct EventCounter;

impl EventCounter {
    /// Events per name, sorted descending by count (ties in first-seen order)
    pub fn count_by_name(
        source: &dyn EventSource,
        tenant: Option<&str>,
    ) -> Result<EventCounts, AnalyticsError> {
        let mut counts = EventCounts::new();
        for event in source.scan(&EventFilter::for_tenant(tenant))? {
            counts.increment(&event?.event_name);
        }
        counts.sort_desc();
        debug!(distinct_events = counts.len(), total = counts.total(), "events counted");
        Ok(counts)
    }

    /// Events whose name contains "error", ignoring case
    pub fn count_errors(source: &dyn EventSource, tenant: Option<&str>) -> Result<u64, AnalyticsError> {
        source.count_matching(tenant, ERROR_MARKER)
    }
}
