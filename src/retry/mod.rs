mod blocked_event_tracker;

pub use blocked_event_tracker::*;
