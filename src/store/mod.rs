//! Event and definition store interfaces
//!
//! The engine never owns data. It reads events through an [`EventSource`] that
//! yields a forward-only cursor ordered by `(session_id, timestamp_ms)`, and funnel
//! definitions through a [`DefinitionStore`]. Both are injected by the caller.

mod loader;
mod memory;

pub use loader::{parse_definitions, parse_event_array, parse_ndjson, DefinitionRecord, EventRecord};
pub use memory::{MemoryStore, DEFAULT_SCAN_BATCH};

use std::collections::BTreeSet;

use crate::error::AnalyticsError;
use crate::types::{Event, FunnelDefinition};

/// Forward-only cursor over scanned events. A store failure mid-scan surfaces as
/// an `Err` item and aborts whichever analysis is consuming the cursor.
pub type EventCursor<'a> = Box<dyn Iterator<Item = Result<Event, AnalyticsError>> + 'a>;

/// Scan filter: optional tenant equality and optional event-name membership
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Only events owned by this tenant
    pub tenant: Option<String>,
    /// Only events whose name is in this set
    pub event_names: Option<BTreeSet<String>>,
}

impl EventFilter {
    /// Every event of every tenant
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_tenant(tenant: Option<&str>) -> Self {
        Self {
            tenant: tenant.map(str::to_string),
            event_names: None,
        }
    }

    /// Restrict the scan to the given event names
    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches_tenant(&self, tenant: Option<&str>) -> bool {
        match &self.tenant {
            Some(wanted) => tenant == Some(wanted.as_str()),
            None => true,
        }
    }

    pub fn matches_name(&self, event_name: &str) -> bool {
        match &self.event_names {
            Some(names) => names.contains(event_name),
            None => true,
        }
    }
}

/// Source of ordered events
pub trait EventSource {
    /// Open a cursor over events matching `filter`, ordered by
    /// `(session_id, timestamp_ms)` ascending
    fn scan(&self, filter: &EventFilter) -> Result<EventCursor<'_>, AnalyticsError>;

    /// Count events whose name contains `needle`, ignoring case.
    ///
    /// The default implementation walks a full scan; index-backed stores should
    /// override it.
    fn count_matching(&self, tenant: Option<&str>, needle: &str) -> Result<u64, AnalyticsError> {
        let needle = needle.to_lowercase();
        let mut count = 0;
        for event in self.scan(&EventFilter::for_tenant(tenant))? {
            if event?.event_name.to_lowercase().contains(&needle) {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Source of persisted funnel definitions
pub trait DefinitionStore {
    /// Definitions for a tenant, in a stable order
    fn list_definitions(&self, tenant: &str) -> Result<Vec<FunnelDefinition>, AnalyticsError>;
}
