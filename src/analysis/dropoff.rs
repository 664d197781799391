//! Drop-off attribution
//!
//! Uses the same step matching as the funnel, but instead of counting sessions it
//! attributes each entered session to the last step it reached. Sessions that
//! complete the funnel are attributed to the final step, so the counts always sum
//! to `sessions_entered`; pair them with the conversion rate to separate true
//! abandonment from completion.

use tracing::debug;

use super::funnel::StepProgress;
use super::{drive, SessionMachine};
use crate::error::AnalyticsError;
use crate::store::{EventFilter, EventSource};
use crate::types::{DropoffResult, Event, Tally};

/// Last-step-reached analyzer
pub struct DropoffAttributor<'s> {
    progress: StepProgress<'s>,
    dropoffs: Tally<u64>,
}

impl<'s> DropoffAttributor<'s> {
    fn new(steps: &'s [String]) -> Self {
        // Every step is reported, even with zero sessions
        let dropoffs = steps.iter().map(|step| (step.as_str(), 0)).collect();
        Self {
            progress: StepProgress::new(steps),
            dropoffs,
        }
    }

    /// Count, per step, the sessions whose progress halted at that step
    pub fn run(
        source: &dyn EventSource,
        steps: &[String],
        tenant: Option<&str>,
    ) -> Result<DropoffResult, AnalyticsError> {
        let mut attributor = DropoffAttributor::new(steps);

        if !steps.is_empty() {
            let filter = EventFilter::for_tenant(tenant).with_names(steps.iter().cloned());
            let stats = drive(source.scan(&filter)?, &mut attributor)?;
            debug!(
                steps = steps.len(),
                events_scanned = stats.events_scanned,
                sessions = stats.sessions,
                attributed = attributor.dropoffs.total(),
                "dropoffs attributed"
            );
        }

        Ok(DropoffResult {
            steps: steps.to_vec(),
            dropoffs: attributor.dropoffs,
        })
    }
}

impl SessionMachine for DropoffAttributor<'_> {
    fn begin_session(&mut self) {
        self.progress.reset();
    }

    fn observe(&mut self, event: &Event) {
        self.progress.advance(&event.event_name);
    }

    fn end_session(&mut self) {
        if let Some(step) = self.progress.last_reached() {
            self.dropoffs.increment(step);
        }
    }
}
