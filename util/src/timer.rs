use std::time::{Duration, Instant};

/// Measures how long each step of a polling cycle takes.
pub struct Timer {
    start: Instant,
    last: Instant,
}

impl Timer {
    pub fn now() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last: now,
        }
    }

    /// Time since the previous lap (or since creation), starting a new lap.
    pub fn lap(&mut self) -> Duration {
        let now = Instant::now();
        let lap = now - self.last;
        self.last = now;
        lap
    }

    /// Time since creation.
    pub fn total(&self) -> Duration {
        self.start.elapsed()
    }
}
