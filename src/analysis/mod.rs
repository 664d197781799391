//! Session-scoped streaming analyzers
//!
//! Every analyzer makes one forward pass over an ordered event cursor. The cursor
//! is partitioned into session runs (maximal stretches sharing a `session_id`) and
//! each run drives a small per-session state machine. Because input is grouped by
//! session, no per-session storage is needed beyond the machine's own state.
//!
//! Pipeline: EventSource cursor → session partitioning → SessionMachine → result

pub mod counts;
pub mod dropoff;
pub mod funnel;
pub mod interval;
pub mod paths;

pub use counts::EventCounter;
pub use dropoff::DropoffAttributor;
pub use funnel::FunnelMatcher;
pub use interval::IntervalTimer;
pub use paths::{PathSummarizer, DEFAULT_PATH_DEPTH, PATH_SEPARATOR};

use crate::error::AnalyticsError;
use crate::store::EventCursor;
use crate::types::Event;

/// Per-session state machine fed by [`drive`]
pub trait SessionMachine {
    /// A new session run starts; reset per-session state
    fn begin_session(&mut self);

    /// An event of the current session run
    fn observe(&mut self, event: &Event);

    /// The current session run is over (boundary or end of scan)
    fn end_session(&mut self);
}

/// Counters collected while driving a cursor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub events_scanned: u64,
    pub sessions: u64,
}

/// Consume `cursor` once, partitioning it into session runs for `machine`.
///
/// A store error mid-scan is returned as-is; the machine is left mid-session.
pub fn drive<M>(cursor: EventCursor<'_>, machine: &mut M) -> Result<ScanStats, AnalyticsError>
where
    M: SessionMachine + ?Sized,
{
    let mut stats = ScanStats::default();
    let mut current_session: Option<String> = None;

    for event in cursor {
        let event = event?;
        stats.events_scanned += 1;

        if current_session.as_deref() != Some(event.session_id.as_str()) {
            if current_session.is_some() {
                machine.end_session();
            }
            machine.begin_session();
            stats.sessions += 1;
            current_session = Some(event.session_id.clone());
        }

        machine.observe(&event);
    }

    if current_session.is_some() {
        machine.end_session();
    }

    Ok(stats)
}
