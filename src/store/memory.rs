//! In-memory event and definition store
//!
//! Events are kept sorted by `(session_id, timestamp_ms)`; a stable sort keeps
//! ingestion order for equal timestamps. Cursors copy matching rows out in
//! fixed-size batches rather than materializing the whole scan.

use std::collections::VecDeque;

use super::{DefinitionStore, EventCursor, EventFilter, EventRecord, EventSource};
use crate::error::AnalyticsError;
use crate::types::{Event, FunnelDefinition};

/// Default number of rows a cursor fetches per batch
pub const DEFAULT_SCAN_BATCH: usize = 5000;

#[derive(Debug, Clone)]
struct StoredEvent {
    tenant: Option<String>,
    event: Event,
}

/// Event and definition store backed by sorted vectors
#[derive(Debug, Clone)]
pub struct MemoryStore {
    events: Vec<StoredEvent>,
    definitions: Vec<FunnelDefinition>,
    batch_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_SCAN_BATCH)
    }

    /// Create a store whose cursors fetch `batch_size` rows at a time
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            events: Vec::new(),
            definitions: Vec::new(),
            batch_size: batch_size.max(1),
        }
    }

    /// Add events owned by `tenant` (or by no tenant)
    pub fn ingest<I>(&mut self, tenant: Option<&str>, events: I)
    where
        I: IntoIterator<Item = Event>,
    {
        let tenant = tenant.map(str::to_string);
        self.events.extend(events.into_iter().map(|event| StoredEvent {
            tenant: tenant.clone(),
            event,
        }));
        self.sort();
    }

    /// Add parsed event records, each carrying its own tenant
    pub fn ingest_records<I>(&mut self, records: I)
    where
        I: IntoIterator<Item = EventRecord>,
    {
        self.events.extend(records.into_iter().map(|record| {
            let (tenant, event) = record.into_parts();
            StoredEvent { tenant, event }
        }));
        self.sort();
    }

    pub fn add_definition(&mut self, definition: FunnelDefinition) {
        self.definitions.push(definition);
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn sort(&mut self) {
        self.events.sort_by(|a, b| {
            a.event
                .session_id
                .cmp(&b.event.session_id)
                .then(a.event.timestamp_ms.cmp(&b.event.timestamp_ms))
        });
    }
}

impl EventSource for MemoryStore {
    fn scan(&self, filter: &EventFilter) -> Result<EventCursor<'_>, AnalyticsError> {
        Ok(Box::new(MemoryCursor {
            rows: &self.events,
            filter: filter.clone(),
            position: 0,
            batch: VecDeque::with_capacity(self.batch_size),
            batch_size: self.batch_size,
        }))
    }

    fn count_matching(&self, tenant: Option<&str>, needle: &str) -> Result<u64, AnalyticsError> {
        let filter = EventFilter::for_tenant(tenant);
        let needle = needle.to_lowercase();
        Ok(self
            .events
            .iter()
            .filter(|row| filter.matches_tenant(row.tenant.as_deref()))
            .filter(|row| row.event.event_name.to_lowercase().contains(&needle))
            .count() as u64)
    }
}

impl DefinitionStore for MemoryStore {
    fn list_definitions(&self, tenant: &str) -> Result<Vec<FunnelDefinition>, AnalyticsError> {
        Ok(self
            .definitions
            .iter()
            .filter(|d| d.tenant == tenant)
            .cloned()
            .collect())
    }
}

struct MemoryCursor<'a> {
    rows: &'a [StoredEvent],
    filter: EventFilter,
    position: usize,
    batch: VecDeque<Event>,
    batch_size: usize,
}

impl MemoryCursor<'_> {
    fn fill(&mut self) {
        while self.position < self.rows.len() && self.batch.len() < self.batch_size {
            let row = &self.rows[self.position];
            self.position += 1;
            if self.filter.matches_tenant(row.tenant.as_deref())
                && self.filter.matches_name(&row.event.event_name)
            {
                self.batch.push_back(row.event.clone());
            }
        }
    }
}

impl Iterator for MemoryCursor<'_> {
    type Item = Result<Event, AnalyticsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch.is_empty() {
            self.fill();
        }
        self.batch.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn collect(store: &MemoryStore, filter: &EventFilter) -> Vec<Event> {
        store
            .scan(filter)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_scan_orders_by_session_then_time() {
        let mut store = MemoryStore::new();
        store.ingest(
            Some("key"),
            vec![
                Event::new("s2", "view", 50),
                Event::new("s1", "signup", 200),
                Event::new("s1", "view", 100),
            ],
        );

        let events = collect(&store, &EventFilter::all());
        assert_eq!(
            events,
            vec![
                Event::new("s1", "view", 100),
                Event::new("s1", "signup", 200),
                Event::new("s2", "view", 50),
            ]
        );
    }

    #[test]
    fn test_equal_timestamps_keep_ingestion_order() {
        let mut store = MemoryStore::new();
        store.ingest(
            None,
            vec![Event::new("s1", "b", 10), Event::new("s1", "a", 10)],
        );
        let names: Vec<String> = collect(&store, &EventFilter::all())
            .into_iter()
            .map(|e| e.event_name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_scan_applies_tenant_and_name_filters() {
        let mut store = MemoryStore::new();
        store.ingest(Some("a"), vec![Event::new("s1", "view", 1), Event::new("s1", "click", 2)]);
        store.ingest(Some("b"), vec![Event::new("s2", "view", 1)]);

        let filter = EventFilter::for_tenant(Some("a")).with_names(["view"]);
        assert_eq!(collect(&store, &filter), vec![Event::new("s1", "view", 1)]);
        assert_eq!(collect(&store, &EventFilter::for_tenant(Some("b"))).len(), 1);
        assert_eq!(collect(&store, &EventFilter::all()).len(), 3);
    }

    #[test]
    fn test_small_batches_yield_every_row() {
        let mut store = MemoryStore::with_batch_size(2);
        store.ingest(None, (0..7).map(|i| Event::new("s", "tick", i)));
        let events = collect(&store, &EventFilter::all());
        assert_eq!(events.len(), 7);
        assert_eq!(events.last().unwrap().timestamp_ms, 6);
    }

    #[test]
    fn test_count_matching_is_case_insensitive() {
        let mut store = MemoryStore::new();
        store.ingest(
            Some("key"),
            vec![
                Event::new("s1", "PaymentError", 1),
                Event::new("s1", "error_shown", 2),
                Event::new("s1", "view", 3),
            ],
        );
        store.ingest(Some("other"), vec![Event::new("s2", "ERROR", 1)]);

        assert_eq!(store.count_matching(Some("key"), "error").unwrap(), 2);
        assert_eq!(store.count_matching(None, "error").unwrap(), 3);
    }

    #[test]
    fn test_definitions_are_scoped_and_ordered() {
        let mut store = MemoryStore::new();
        let first = FunnelDefinition::new("a", "first", vec!["x".into()]).unwrap();
        let other = FunnelDefinition::new("b", "other", vec!["x".into()]).unwrap();
        let second = FunnelDefinition::new("a", "second", vec!["y".into()]).unwrap();
        store.add_definition(first);
        store.add_definition(other);
        store.add_definition(second);

        let names: Vec<String> = store
            .list_definitions("a")
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
