pub mod job;
pub mod machine;
pub mod sink;
pub mod state;

pub use job::{JobStatus, Strategy, TrackOutcome, TrackReport, TrackerConfig};
pub use machine::ProgressTracker;
pub use sink::ProgressSink;
pub use state::TrackerState;
