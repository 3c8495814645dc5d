use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const PAUSE_POLL: Duration = Duration::from_millis(100);

/// Pause/stop switches shared between a running job and whoever drives it.
#[derive(Debug, Clone, Default)]
pub struct JobControl {
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Returns the new paused state.
    pub fn toggle_pause(&self) -> bool {
        !self.paused.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Blocks while paused. Returns `false` if the job was stopped.
    pub fn wait_while_paused(&self) -> bool {
        while self.is_paused() && !self.is_stopped() {
            std::thread::sleep(PAUSE_POLL);
        }
        !self.is_stopped()
    }
}
