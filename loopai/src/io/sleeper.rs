use std::thread;
use std::time::Duration;

use tracing::info;

/// Blocking wait used between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        info!(secs = duration.as_secs_f64(), "waiting");
        thread::sleep(duration);
    }
}
