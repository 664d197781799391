//! Shared test fixtures

use crate::error::AnalyticsError;
use crate::store::{EventCursor, EventFilter, EventSource, MemoryStore};
use crate::types::Event;

/// Tenant used by fixtures
pub const TENANT: &str = "app-key";

/// Store holding `(session_id, event_name, timestamp_ms)` rows for [`TENANT`]
pub fn store_with(rows: &[(&str, &str, i64)]) -> MemoryStore {
    let mut store = MemoryStore::new();
    store.ingest(
        Some(TENANT),
        rows.iter().map(|&(s, e, t)| Event::new(s, e, t)),
    );
    store
}

pub fn steps(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Source that yields a few events from one session, then fails
pub struct FailingSource {
    ok_events: usize,
}

impl FailingSource {
    pub fn after(ok_events: usize) -> Self {
        Self { ok_events }
    }
}

impl EventSource for FailingSource {
    fn scan(&self, _filter: &EventFilter) -> Result<EventCursor<'_>, AnalyticsError> {
        let ok = (0..self.ok_events).map(|i| Ok(Event::new("s1", "view", i as i64)));
        let failure = std::iter::once(Err(AnalyticsError::Store(
            "connection reset".to_string(),
        )));
        Ok(Box::new(ok.chain(failure)))
    }
}
