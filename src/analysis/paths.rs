//! Session path summarization
//!
//! Each session's first `max_depth` event names are joined into a path string
//! ("view → cart → checkout") and counted. Sessions with fewer than two events
//! carry no navigation and are skipped.

use tracing::debug;

use super::{drive, SessionMachine};
use crate::error::AnalyticsError;
use crate::store::{EventFilter, EventSource};
use crate::types::{Event, PathCounts};

/// Separator between event names in a path string
pub const PATH_SEPARATOR: &str = " → ";

/// Default number of leading events kept per session
pub const DEFAULT_PATH_DEPTH: usize = 10;

/// Session prefix-path frequency counter
pub struct PathSummarizer {
    max_depth: usize,
    names: Vec<String>,
    counts: PathCounts,
}

impl PathSummarizer {
    fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            names: Vec::with_capacity(max_depth.min(16)),
            counts: PathCounts::new(),
        }
    }

    /// Count session paths over every event of the tenant.
    ///
    /// The result is sorted descending by count; equal counts keep the order in
    /// which the paths were first seen. A `max_depth` of 0 is treated as 1.
    pub fn run(
        source: &dyn EventSource,
        max_depth: usize,
        tenant: Option<&str>,
    ) -> Result<PathCounts, AnalyticsError> {
        let mut summarizer = PathSummarizer::new(max_depth.max(1));
        let stats = drive(source.scan(&EventFilter::for_tenant(tenant))?, &mut summarizer)?;

        let mut counts = summarizer.counts;
        counts.sort_desc();
        debug!(
            max_depth,
            events_scanned = stats.events_scanned,
            sessions = stats.sessions,
            unique_paths = counts.len(),
            "paths summarized"
        );
        Ok(counts)
    }
}

impl SessionMachine for PathSummarizer {
    fn begin_session(&mut self) {
        self.names.clear();
    }

    fn observe(&mut self, event: &Event) {
        if self.names.len() < self.max_depth {
            self.names.push(event.event_name.clone());
        }
    }

    fn end_session(&mut self) {
        if self.names.len() < 2 {
            return;
        }
        let path = self.names.join(PATH_SEPARATOR);
        self.counts.increment(&path);
    }
}
