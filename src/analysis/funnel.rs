//! Funnel matching
//!
//! A session enters a funnel when it matches the first step and completes it when
//! it matches every step in order. Matching is subsequence matching: unrelated
//! events (and repeats of already-matched steps) may appear in between.

use tracing::debug;

use super::{drive, SessionMachine};
use crate::error::AnalyticsError;
use crate::store::{EventFilter, EventSource};
use crate::types::{Event, FunnelResult};

/// Progress pointer of one session through an ordered step list
#[derive(Debug, Clone)]
pub(crate) struct StepProgress<'s> {
    steps: &'s [String],
    index: usize,
}

impl<'s> StepProgress<'s> {
    pub(crate) fn new(steps: &'s [String]) -> Self {
        Self { steps, index: 0 }
    }

    pub(crate) fn reset(&mut self) {
        self.index = 0;
    }

    /// Advance when `event_name` is the next expected step
    pub(crate) fn advance(&mut self, event_name: &str) {
        if self.index < self.steps.len() && event_name == self.steps[self.index] {
            self.index += 1;
        }
    }

    pub(crate) fn entered(&self) -> bool {
        self.index > 0
    }

    pub(crate) fn completed(&self) -> bool {
        self.entered() && self.index == self.steps.len()
    }

    /// The last step matched so far
    pub(crate) fn last_reached(&self) -> Option<&'s str> {
        self.index
            .checked_sub(1)
            .map(|i| self.steps[i].as_str())
    }
}

/// Funnel conversion analyzer
pub struct FunnelMatcher<'s> {
    progress: StepProgress<'s>,
    sessions_entered: u64,
    sessions_completed: u64,
}

impl<'s> FunnelMatcher<'s> {
    fn new(steps: &'s [String]) -> Self {
        Self {
            progress: StepProgress::new(steps),
            sessions_entered: 0,
            sessions_completed: 0,
        }
    }

    /// Compute entered/completed sessions and conversion rate for `steps`.
    ///
    /// An empty step list yields a zero result without scanning.
    pub fn run(
        source: &dyn EventSource,
        steps: &[String],
        tenant: Option<&str>,
    ) -> Result<FunnelResult, AnalyticsError> {
        if steps.is_empty() {
            return Ok(FunnelResult {
                steps: Vec::new(),
                sessions_entered: 0,
                sessions_completed: 0,
                conversion_rate: 0.0,
            });
        }

        let filter = EventFilter::for_tenant(tenant).with_names(steps.iter().cloned());
        let mut matcher = FunnelMatcher::new(steps);
        let stats = drive(source.scan(&filter)?, &mut matcher)?;

        let result = matcher.finish();
        debug!(
            steps = steps.len(),
            events_scanned = stats.events_scanned,
            sessions = stats.sessions,
            entered = result.sessions_entered,
            completed = result.sessions_completed,
            "funnel matched"
        );
        Ok(result)
    }

    fn finish(self) -> FunnelResult {
        FunnelResult {
            steps: self.progress.steps.to_vec(),
            sessions_entered: self.sessions_entered,
            sessions_completed: self.sessions_completed,
            conversion_rate: conversion_rate(self.sessions_completed, self.sessions_entered),
        }
    }
}

impl SessionMachine for FunnelMatcher<'_> {
    fn begin_session(&mut self) {
        self.progress.reset();
    }

    fn observe(&mut self, event: &Event) {
        self.progress.advance(&event.event_name);
    }

    fn end_session(&mut self) {
        if self.progress.entered() {
            self.sessions_entered += 1;
        }
        if self.progress.completed() {
            self.sessions_completed += 1;
        }
    }
}

fn conversion_rate(completed: u64, entered: u64) -> f64 {
    if entered == 0 {
        return 0.0;
    }
    completed as f64 / entered as f64
}
