use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Process-wide liveness state. Reset after every completed supervisor
/// cycle and after every automated recovery action; never persisted.
/// Uses the tokio clock so tests can drive it with paused time.
#[derive(Debug)]
pub struct Heartbeat {
    last: Mutex<Instant>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    pub fn beat(&self) {
        *self.last.lock().unwrap() = Instant::now();
    }

    pub fn elapsed(&self) -> Duration {
        self.last.lock().unwrap().elapsed()
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}
