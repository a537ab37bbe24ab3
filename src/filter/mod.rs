//! Program gating and airtime observation.

mod airtime_tracker;
mod event;
mod program_filter;

pub use airtime_tracker::{AirtimeTracker, AirtimeTrackerOptions, EventTiming};
pub use event::{locate_target_event, EitDecision};
pub use program_filter::{ProgramFilter, ProgramFilterOptions};
