use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Shared iteration budget for a fixed VU pool.
///
/// Every VU claims iteration slots from one atomic counter; exactly
/// `iterations` claims ever succeed, no matter how many VUs race. The hard
/// `max_duration` wall clock stops further claims once exceeded; an
/// iteration already claimed is allowed to finish.
#[derive(Debug)]
pub struct IterationGate {
    counter: AtomicU64,
    iterations: u64,
    max_duration: Duration,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(iterations: u64, max_duration: Duration) -> Self {
        Self {
            counter: AtomicU64::new(0),
            iterations,
            max_duration,
            deadline: OnceLock::new(),
        }
    }

    /// Pins the deadline to `started + max_duration`. Idempotent.
    pub fn start_at(&self, started: Instant) {
        let _ = self.deadline.set(started + self.max_duration);
    }

    /// Attempts to claim the next iteration slot.
    ///
    /// If the runner never called [`start_at`](Self::start_at), the deadline
    /// is initialized lazily from the first claim.
    pub fn next(&self) -> bool {
        let now = Instant::now();
        if self.deadline.get().is_none() {
            self.start_at(now);
        }
        if let Some(deadline) = self.deadline.get()
            && now >= *deadline
        {
            return false;
        }

        let idx = self.counter.fetch_add(1, Ordering::Relaxed);
        idx < self.iterations
    }

    pub fn claimed(&self) -> u64 {
        self.counter.load(Ordering::Relaxed).min(self.iterations)
    }

    pub fn budget(&self) -> u64 {
        self.iterations
    }
}
