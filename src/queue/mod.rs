//! Keyed, bounded, backpressure-aware queues between log producers and the
//! sender.

mod bounded_queue;
mod dispatcher;
mod feedback;
mod key;
mod wake_signal;

pub use bounded_queue::*;
pub use dispatcher::*;
pub use feedback::*;
pub use key::*;
pub use wake_signal::*;
