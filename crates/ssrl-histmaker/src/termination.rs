//! Early-termination counter shared by every dataset of a run.

/// Counter value above which streaming stops.
pub const DEFAULT_TERMINATION_THRESHOLD: u64 = 20;

/// Coarse stop signal, incremented whenever a full sample graph is offered data.
///
/// The counter starts at the threshold, so the first saturated-graph
/// observation trips the stop after the chunk in which it happened. Use
/// [`crate::HistMaker::termination`] to get one that matches a configured
/// threshold.
///
/// Create one per run and pass it to every [`crate::HistMaker::process`] call.
/// It is never reset automatically, so a dataset that saturates its graphs can
/// cut short the datasets processed after it. Call [`reset`](Self::reset) to
/// scope it to a single dataset instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EarlyTermination {
    start: u64,
    count: u64,
}

impl Default for EarlyTermination {
    fn default() -> Self {
        Self::starting_at(DEFAULT_TERMINATION_THRESHOLD)
    }
}

impl EarlyTermination {
    /// Fresh counter at [`DEFAULT_TERMINATION_THRESHOLD`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh counter at `start`.
    pub fn starting_at(start: u64) -> Self {
        Self { start, count: start }
    }

    /// Record one saturated-graph observation.
    pub fn increment(&mut self) {
        self.count += 1;
    }

    /// Current value.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Observations recorded since creation or the last reset.
    pub fn increments(&self) -> u64 {
        self.count - self.start
    }

    /// Back to the starting value.
    pub fn reset(&mut self) {
        self.count = self.start;
    }

    /// Whether the counter is strictly above `threshold`.
    pub fn exceeds(&self, threshold: u64) -> bool {
        self.count > threshold
    }
}
