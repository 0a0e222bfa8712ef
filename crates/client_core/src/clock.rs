//! Session countdown.

/// 35 minutes.
pub const DEFAULT_SESSION_SECONDS: u32 = 35 * 60;

/// Below this many seconds the presentation layer switches to its warning
/// style. Has no effect on the state machine.
pub const LOW_TIME_THRESHOLD_SECONDS: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    duration: u32,
    remaining: u32,
}

impl SessionClock {
    pub fn new(duration: u32) -> Self {
        Self {
            duration,
            remaining: duration,
        }
    }

    /// Decrements by one second, floored at zero. Returns the new value.
    pub fn tick(&mut self) -> u32 {
        self.remaining = self.remaining.saturating_sub(1);
        self.remaining
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn is_expired(&self) -> bool {
        self.remaining == 0
    }

    pub fn is_running_low(&self) -> bool {
        self.remaining < LOW_TIME_THRESHOLD_SECONDS
    }

    pub fn reset(&mut self) {
        self.remaining = self.duration;
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_SECONDS)
    }
}

#[cfg(test)]
#[path = "tests/clock_tests.rs"]
mod tests;
