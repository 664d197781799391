//! Time-to-complete measurement
//!
//! Per session, at most one duration is taken: from the first `start_event` to
//! the first `end_event` that follows it. The start branch is checked first, so
//! when both names are equal an occurrence can only open the interval and a later
//! occurrence closes it.

use tracing::debug;

use super::{drive, SessionMachine};
use crate::error::AnalyticsError;
use crate::store::{EventFilter, EventSource};
use crate::types::{Event, IntervalResult};

/// First-start to first-end duration extractor
pub struct IntervalTimer<'e> {
    start_event: &'e str,
    end_event: &'e str,
    start_time: Option<i64>,
    found_duration: bool,
    durations: Vec<i64>,
}

impl<'e> IntervalTimer<'e> {
    fn new(start_event: &'e str, end_event: &'e str) -> Self {
        Self {
            start_event,
            end_event,
            start_time: None,
            found_duration: false,
            durations: Vec::new(),
        }
    }

    /// Duration statistics between `start_event` and `end_event`.
    ///
    /// A missing (empty) event name returns the empty result without scanning.
    pub fn run(
        source: &dyn EventSource,
        start_event: &str,
        end_event: &str,
        tenant: Option<&str>,
    ) -> Result<IntervalResult, AnalyticsError> {
        if start_event.is_empty() || end_event.is_empty() {
            return Ok(IntervalResult::empty(start_event, end_event));
        }

        let filter = EventFilter::for_tenant(tenant).with_names([start_event, end_event]);
        let mut timer = IntervalTimer::new(start_event, end_event);
        let stats = drive(source.scan(&filter)?, &mut timer)?;

        debug!(
            start_event,
            end_event,
            events_scanned = stats.events_scanned,
            sessions = stats.sessions,
            durations = timer.durations.len(),
            "intervals measured"
        );
        Ok(summarize(start_event, end_event, timer.durations))
    }
}

impl SessionMachine for IntervalTimer<'_> {
    fn begin_session(&mut self) {
        self.start_time = None;
        self.found_duration = false;
    }

    fn observe(&mut self, event: &Event) {
        if self.found_duration {
            return;
        }
        if event.event_name == self.start_event && self.start_time.is_none() {
            self.start_time = Some(event.timestamp_ms);
        } else if event.event_name == self.end_event {
            if let Some(start) = self.start_time {
                self.durations.push(event.timestamp_ms.saturating_sub(start));
                self.found_duration = true;
            }
        }
    }

    fn end_session(&mut self) {
        // A session that started but never ended contributes nothing
    }
}

/// Count, truncated mean, truncated median and extrema of `durations`
fn summarize(start_event: &str, end_event: &str, mut durations: Vec<i64>) -> IntervalResult {
    if durations.is_empty() {
        return IntervalResult::empty(start_event, end_event);
    }

    durations.sort_unstable();
    let n = durations.len();
    let sum: i128 = durations.iter().map(|&d| d as i128).sum();
    let average = (sum / n as i128) as i64;
    let median = if n % 2 == 1 {
        durations[n / 2]
    } else {
        ((durations[n / 2 - 1] as i128 + durations[n / 2] as i128) / 2) as i64
    };

    IntervalResult {
        start_event: start_event.to_string(),
        end_event: end_event.to_string(),
        count: n as u64,
        average_ms: Some(average),
        median_ms: Some(median),
        min_ms: Some(durations[0]),
        max_ms: Some(durations[n - 1]),
    }
}
