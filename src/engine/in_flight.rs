use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Counter {
    pending: Mutex<usize>,
    idle: Condvar,
}

/// Counts work that has been accepted but not finished. Work moves between
/// execution contexts by handing its [`WorkToken`] along.
#[derive(Clone, Default)]
pub(crate) struct InFlight {
    counter: Arc<Counter>,
}

impl InFlight {
    pub fn begin(&self) -> WorkToken {
        *self
            .counter
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
        WorkToken {
            counter: Arc::clone(&self.counter),
        }
    }

    pub fn pending(&self) -> usize {
        *self
            .counter
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until nothing is pending. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self
            .counter
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while *pending > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .counter
                .idle
                .wait_timeout(pending, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            pending = guard;
        }
        true
    }
}

/// One unit of pending work. Dropping it marks the work finished.
pub(crate) struct WorkToken {
    counter: Arc<Counter>,
}

impl WorkToken {
    /// Token for work spawned by this work, counted separately.
    pub fn follow_up(&self) -> WorkToken {
        InFlight {
            counter: Arc::clone(&self.counter),
        }
        .begin()
    }
}

impl Drop for WorkToken {
    fn drop(&mut self) {
        let mut pending = self
            .counter
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.counter.idle.notify_all();
        }
    }
}
