use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// One-shot gate released by the runner once every VU is parked at the
/// ready barrier, so initialization never skews measured time.
#[derive(Debug, Default)]
pub struct StartSignal {
    started: AtomicBool,
    notify: Notify,
}

impl StartSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.started.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub async fn wait(&self) {
        while !self.started.load(Ordering::Acquire) {
            self.notify.notified().await;
        }
    }
}

/// Cooperative abort: once triggered, VUs stop claiming new iterations and
/// drain whatever is in flight. Nothing is ever hard-killed mid-iteration.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        while !self.is_stopped() {
            self.notify.notified().await;
        }
    }
}
