use std::time::Duration;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;

/// Level-triggered wake-up with a sticky flag.
///
/// A `signal` that lands before the consumer parks is remembered, so the
/// next `wait` returns immediately instead of sleeping through it.
#[derive(Default)]
pub struct WakeSignal {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes at most one parked waiter.
    pub fn signal(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cond.notify_one();
    }

    /// Returns true if a signal was consumed before `timeout` elapsed.
    pub fn wait(
        &self,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock();
        while !*pending {
            if self.cond.wait_until(&mut pending, deadline).timed_out() {
                break;
            }
        }
        let observed = *pending;
        *pending = false;
        observed
    }
}
