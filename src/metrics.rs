//! Per-stage compile metrics.
//!
//! The driver records wall time for every pipeline stage so callers can
//! inspect where a compile spent its time. Timings are also emitted as
//! `tracing` debug events as each stage completes.

use std::collections::BTreeMap;
use std::time::Duration;

/// Wall-time measurements keyed by stage name.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    timers: BTreeMap<&'static str, Duration>,
}

impl Metrics {
    /// An empty metrics table.
    pub fn new() -> Self {
        Metrics::default()
    }

    /// Record the elapsed time for a stage. Repeat invocations of the same
    /// stage (e.g. re-resolution under a module loader) accumulate.
    pub fn record(&mut self, stage: &'static str, elapsed: Duration) {
        *self.timers.entry(stage).or_default() += elapsed;
    }

    /// The accumulated time for a stage, if it ran.
    pub fn timer(&self, stage: &str) -> Option<Duration> {
        self.timers.get(stage).copied()
    }

    /// Iterate stages in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.timers.iter().map(|(k, v)| (*k, *v))
    }

    /// Drop all recorded timings.
    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let mut m = Metrics::new();
        m.record("resolve_refs", Duration::from_micros(5));
        m.record("resolve_refs", Duration::from_micros(7));
        assert_eq!(m.timer("resolve_refs"), Some(Duration::from_micros(12)));
        assert_eq!(m.timer("unknown"), None);
    }
}
