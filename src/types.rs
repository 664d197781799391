//! Core data types
//!
//! This module defines the event read model, funnel definitions, and the result
//! shapes produced by the analyzers, the snapshot composer and the comparator.
//! Field names and null-vs-zero semantics are part of the JSON contract consumed
//! downstream, so every result type serializes its `Option` fields as `null`.

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use uuid::Uuid;

use crate::error::AnalyticsError;

/// A single scanned event.
///
/// Scans are ordered by `(session_id, timestamp_ms)`; ties on timestamp keep the
/// store's scan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Client-defined session key
    pub session_id: String,
    /// Event name (e.g. "view", "signup")
    pub event_name: String,
    /// Event time in milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

impl Event {
    pub fn new(session_id: impl Into<String>, event_name: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            session_id: session_id.into(),
            event_name: event_name.into(),
            timestamp_ms,
        }
    }
}

/// A named, persisted funnel step list scoped to a tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelDefinition {
    /// Definition identifier
    pub id: Uuid,
    /// Owning tenant (API key)
    pub tenant: String,
    /// Display name, also the key in `Snapshot::funnels`
    pub name: String,
    /// Ordered step event names; repeats are allowed
    pub steps: Vec<String>,
    /// When the definition was created
    pub created_at: DateTime<Utc>,
}

impl FunnelDefinition {
    /// Create a definition, rejecting an empty step list
    pub fn new(
        tenant: impl Into<String>,
        name: impl Into<String>,
        steps: Vec<String>,
    ) -> Result<Self, AnalyticsError> {
        let name = name.into();
        if steps.is_empty() {
            return Err(AnalyticsError::InvalidDefinition(format!(
                "funnel '{}' must have at least one step",
                name
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            tenant: tenant.into(),
            name,
            steps,
            created_at: Utc::now(),
        })
    }
}

// ============================================================================
// Insertion-ordered map
// ============================================================================

/// Insertion-ordered string-keyed map.
///
/// Serializes as a JSON object whose key order is the entry order, so sorting a
/// tally (stable) yields a deterministic order for equal values.
#[derive(Clone)]
pub struct Tally<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for Tally<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V> Tally<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or overwrite. An overwritten key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Stable sort of the entries
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&V, &V) -> Ordering,
    {
        self.entries.sort_by(|a, b| compare(&a.1, &b.1));
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, (key, _)) in self.entries.iter().enumerate() {
            self.index.insert(key.clone(), i);
        }
    }
}

impl<V: Default> Tally<V> {
    /// Mutable access to a key's value, inserting the default first if absent
    pub fn entry(&mut self, key: &str) -> &mut V {
        let i = match self.index.get(key) {
            Some(&i) => i,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), V::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[i].1
    }
}

impl Tally<u64> {
    pub fn increment(&mut self, key: &str) {
        *self.entry(key) += 1;
    }

    pub fn total(&self) -> u64 {
        self.values().sum()
    }

    /// Stable sort descending by count; equal counts keep first-seen order
    pub fn sort_desc(&mut self) {
        self.sort_by(|a, b| b.cmp(a));
    }
}

impl<V: PartialEq> PartialEq for Tally<V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<V: fmt::Debug> fmt::Debug for Tally<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for Tally<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for (k, v) in iter {
            tally.insert(k, v);
        }
        tally
    }
}

impl<V: Serialize> Serialize for Tally<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct TallyVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for TallyVisitor<V> {
    type Value = Tally<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of string keys")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut tally = Tally::new();
        while let Some((key, value)) = access.next_entry::<String, V>()? {
            tally.insert(key, value);
        }
        Ok(tally)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Tally<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TallyVisitor(PhantomData))
    }
}

// ============================================================================
// Analyzer results
// ============================================================================

/// Funnel conversion for one step list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelResult {
    pub steps: Vec<String>,
    /// Sessions that matched at least the first step
    pub sessions_entered: u64,
    /// Sessions that matched every step in order
    pub sessions_completed: u64,
    /// `sessions_completed / sessions_entered`, 0 when nothing entered
    pub conversion_rate: f64,
}

/// Last-step-reached attribution for one step list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropoffResult {
    pub steps: Vec<String>,
    /// Step name -> sessions whose progress halted at that step.
    /// Every step is present (zero when nobody stopped there); completed
    /// sessions count against the final step.
    pub dropoffs: Tally<u64>,
}

/// Path string -> session count, sorted descending by count
pub type PathCounts = Tally<u64>;

/// Event name -> event count, sorted descending by count
pub type EventCounts = Tally<u64>;

/// Duration statistics between a start and an end event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalResult {
    pub start_event: String,
    pub end_event: String,
    pub count: u64,
    pub average_ms: Option<i64>,
    pub median_ms: Option<i64>,
    pub min_ms: Option<i64>,
    pub max_ms: Option<i64>,
}

impl IntervalResult {
    /// Result with no durations: count 0 and every statistic null
    pub fn empty(start_event: &str, end_event: &str) -> Self {
        Self {
            start_event: start_event.to_string(),
            end_event: end_event.to_string(),
            count: 0,
            average_ms: None,
            median_ms: None,
            min_ms: None,
            max_ms: None,
        }
    }
}

// ============================================================================
// Snapshot and comparison
// ============================================================================

/// Point-in-time bundle of every tracked metric for one tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Tenant (API key) the snapshot was built for
    #[serde(default, alias = "api_key")]
    pub tenant: String,
    /// Conversion rate of the primary (first) funnel
    #[serde(default)]
    pub conversion_rate: Option<f64>,
    /// Step -> drop-off rate (0-1), merged across funnels
    #[serde(default)]
    pub dropoff_rates: Tally<f64>,
    /// Average first-step to last-step duration of the first multi-step funnel
    #[serde(default)]
    pub avg_time_to_complete_ms: Option<i64>,
    /// Number of distinct session paths
    #[serde(default)]
    pub unique_paths: u64,
    /// Events whose name contains "error" (case-insensitive)
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub paths: PathCounts,
    /// Funnel name -> result, in definition order
    #[serde(default)]
    pub funnels: Tally<FunnelResult>,
}

impl Snapshot {
    /// Snapshot with every metric unset
    pub fn empty(tenant: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            conversion_rate: None,
            dropoff_rates: Tally::new(),
            avg_time_to_complete_ms: None,
            unique_paths: 0,
            error_count: 0,
            paths: Tally::new(),
            funnels: Tally::new(),
        }
    }
}

/// Change of a 0-1 rate metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateChange {
    pub previous: f64,
    pub current: f64,
    pub delta: f64,
    /// Relative change in percent; null when the previous value is 0
    pub delta_percent: Option<f64>,
}

/// Change of a single step's drop-off rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRateChange {
    pub previous: f64,
    pub current: f64,
    pub delta: f64,
}

/// Change of the time-to-complete metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationChange {
    pub previous_ms: i64,
    pub current_ms: i64,
    pub delta_ms: i64,
    pub delta_percent: Option<f64>,
}

/// Before/after pair of a counter metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountChange {
    pub previous: u64,
    pub current: u64,
}

/// Metrics recorded by a comparison; absent metrics are omitted from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsChanged {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_rate: Option<RateChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff_rates: Option<Tally<StepRateChange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_complete: Option<DurationChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_diversity: Option<CountChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_count: Option<CountChange>,
}

impl MetricsChanged {
    pub fn is_empty(&self) -> bool {
        self.conversion_rate.is_none()
            && self.dropoff_rates.is_none()
            && self.time_to_complete.is_none()
            && self.path_diversity.is_none()
            && self.error_count.is_none()
    }
}

/// Overall direction of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Degrading,
    Stable,
}

/// Facts derived from two snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonDiff {
    pub metrics_changed: MetricsChanged,
    pub issues: Vec<String>,
    pub improvements: Vec<String>,
    pub overall_trend: Trend,
}
