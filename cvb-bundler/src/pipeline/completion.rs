//! Single resolution point for a download run
//!
//! The run is complete once the row source has ended and no fetch is in
//! flight. Either event can be the last one, so both are checked.

/// Tracks source end and in-flight fetches; resolves exactly once
#[derive(Debug, Default)]
pub struct CompletionCoordinator {
    source_ended: bool,
    in_flight: usize,
    resolved: bool,
}

impl CompletionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch_started(&mut self) {
        self.in_flight += 1;
    }

    /// Returns `true` only if this event resolves the run
    pub fn fetch_finished(&mut self) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.try_resolve()
    }

    /// Returns `true` only if this event resolves the run
    pub fn source_ended(&mut self) -> bool {
        self.source_ended = true;
        self.try_resolve()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    fn try_resolve(&mut self) -> bool {
        if self.resolved || !self.source_ended || self.in_flight > 0 {
            return false;
        }
        self.resolved = true;
        true
    }
}
