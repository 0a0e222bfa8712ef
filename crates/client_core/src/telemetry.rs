//! Pending interaction events awaiting the next flush.

use shared::protocol::TelemetryEvent;

#[derive(Debug, Default)]
pub struct TelemetryBatcher {
    pending: Vec<TelemetryEvent>,
}

impl TelemetryBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: TelemetryEvent) {
        self.pending.push(event);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Hands the whole buffer over as one batch and leaves it empty.
    ///
    /// Returns `None` when nothing is pending so callers never send an empty
    /// batch. Events handed out here are never re-queued.
    pub fn take_batch(&mut self) -> Option<Vec<TelemetryEvent>> {
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }
}

#[cfg(test)]
#[path = "tests/telemetry_tests.rs"]
mod tests;
