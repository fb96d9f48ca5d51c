use super::job::JobStatus;
use super::state::TrackerState;

/// Receives tracker updates for display. All methods default to no-ops.
pub trait ProgressSink {
    fn state_changed(&self, _from: TrackerState, _to: TrackerState) {}

    /// Step `value` of `max` within the running node.
    fn progress(&self, _value: u32, _max: u32) {}

    fn status(&self, _status: &JobStatus) {}
}

impl ProgressSink for () {}
