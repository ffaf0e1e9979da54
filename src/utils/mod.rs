use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Logs how long a scrape or batch ran once it goes out of scope, whether it
/// returned normally or bailed out early.
pub struct Timer {
    label: String,
    start: Instant,
}

impl Timer {
    pub fn start(label: impl Into<String>) -> Self {
        let label = label.into();
        debug!("{} started", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        info!(elapsed_ms = elapsed.as_millis() as u64, "{} done in {:.1?}", self.label, elapsed);
    }
}
