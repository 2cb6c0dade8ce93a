//! In-memory accumulation log
//!
//! Keeps the running sum of the positive part of an integration script's
//! energy, keyed by unix time. Splitting an integration into positive and
//! negative components reads the difference of two entries.

use crate::evaluator::evaluate;
use crate::providers::{AccumulationLog, EvalContext};
use crate::sample::{elapsed_hours, LogRecord};
use crate::script::Script;
use crate::units::Unit;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::{trace, warn};

/// Cumulative positive Wh per unix time
///
/// One writer appends through [`MemoryAccumulationLog::integrate`] while
/// evaluators read; the lock only guards the map itself.
#[derive(Debug, Default)]
pub struct MemoryAccumulationLog {
    entries: RwLock<BTreeMap<i64, f64>>,
    /// Seconds of history kept behind the newest entry
    retention: Option<i64>,
}

impl MemoryAccumulationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries older than `seconds` behind the newest one
    pub fn with_retention(seconds: i64) -> Self {
        Self {
            entries: RwLock::default(),
            retention: Some(seconds),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Add `positive_wh` to the running sum at `unix_time`
    ///
    /// Returns `false` and leaves the log unchanged if `unix_time` is not
    /// after the newest entry.
    pub fn append(&self, unix_time: i64, positive_wh: f64) -> bool {
        let mut entries = self.entries.write();
        let total = match entries.last_key_value() {
            Some((&last, _)) if unix_time <= last => {
                warn!(unix_time, last, "Accumulation entry out of order, ignored");
                return false;
            },
            Some((_, &total)) => total,
            None => 0.0,
        };
        entries.insert(unix_time, total + positive_wh.max(0.0));

        if let Some(retention) = self.retention {
            let cutoff = unix_time.saturating_sub(retention);
            // keep the entry at or before the cutoff so it stays a valid start
            let floor = entries.range(..=cutoff).next_back().map(|(&t, _)| t);
            if let Some(floor) = floor {
                entries.retain(|&t, _| t >= floor);
            }
        }
        true
    }

    /// Integrate one logging interval of `script`
    ///
    /// Evaluates the interval's energy and appends its positive part. The
    /// first call also records a zero entry at `old` so the log covers it.
    pub fn integrate(
        &self,
        script: &Script,
        old: &LogRecord,
        new: &LogRecord,
        ctx: &EvalContext<'_>,
    ) -> f64 {
        if self.is_empty() {
            self.entries.write().insert(old.unix_time, 0.0);
        }
        let wh = evaluate(script, Some(old), new, Unit::Wh, ctx);
        let positive = wh.max(0.0);
        if self.append(new.unix_time, positive) {
            trace!(script = script.name(), wh, positive, "Integrated interval");
        }
        positive
    }

    /// Running sum at or before `unix_time`
    fn total_at(entries: &BTreeMap<i64, f64>, unix_time: i64) -> f64 {
        entries
            .range(..=unix_time)
            .next_back()
            .map_or(0.0, |(_, &total)| total)
    }
}

impl AccumulationLog for MemoryAccumulationLog {
    fn first_timestamp(&self) -> Option<i64> {
        self.entries.read().keys().next().copied()
    }

    fn last_timestamp(&self) -> Option<i64> {
        self.entries.read().keys().next_back().copied()
    }

    fn positive_sum(&self, old: &LogRecord, new: &LogRecord, unit: Unit) -> f64 {
        let wh = {
            let entries = self.entries.read();
            Self::total_at(&entries, new.unix_time) - Self::total_at(&entries, old.unix_time)
        };
        match unit {
            Unit::Wh => wh,
            Unit::KWh => wh / 1000.0,
            Unit::Watts => {
                let hours = elapsed_hours(Some(old), new);
                if hours > 0.0 {
                    wh / hours
                } else {
                    0.0
                }
            },
            _ => 0.0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::providers::NoSolar;
    use crate::registry::ScriptRegistry;
    use crate::sample::ChannelTable;

    const HOUR: i64 = 3600;

    #[test]
    fn test_append_accumulates_positive_only() {
        let log = MemoryAccumulationLog::new();
        assert!(log.append(0, 0.0));
        assert!(log.append(HOUR, 10.0));
        assert!(log.append(2 * HOUR, -5.0));
        assert!(log.append(3 * HOUR, 2.5));
        assert!(!log.append(3 * HOUR, 1.0));

        assert_eq!(log.first_timestamp(), Some(0));
        assert_eq!(log.last_timestamp(), Some(3 * HOUR));

        let old = LogRecord::new(0);
        let new = LogRecord::new(3 * HOUR);
        assert_eq!(log.positive_sum(&old, &new, Unit::Wh), 12.5);
        assert!((log.positive_sum(&old, &new, Unit::Watts) - 12.5 / 3.0).abs() < 1e-12);
        assert_eq!(log.positive_sum(&old, &new, Unit::Volts), 0.0);
    }

    #[test]
    fn test_positive_sum_between_entries() {
        let log = MemoryAccumulationLog::new();
        log.append(0, 0.0);
        log.append(HOUR, 4.0);
        log.append(2 * HOUR, 6.0);
        // both ends fall back to the entry at or before them
        let old = LogRecord::new(HOUR + 60);
        let new = LogRecord::new(2 * HOUR + 60);
        assert_eq!(log.positive_sum(&old, &new, Unit::Wh), 6.0);
    }

    #[test]
    fn test_empty_log_covers_nothing() {
        let log = MemoryAccumulationLog::new();
        assert!(log.is_empty());
        assert!(!log.covers(&LogRecord::new(0), &LogRecord::new(1)));
    }

    #[test]
    fn test_retention() {
        let log = MemoryAccumulationLog::with_retention(2 * HOUR);
        for hour in 0..6 {
            log.append(hour * HOUR, 1.0);
        }
        assert_eq!(log.first_timestamp(), Some(3 * HOUR));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_integrate_script() {
        let registry = ScriptRegistry::new();
        let script = compile(&registry, "grid", "Wh", "I0").unwrap();
        let channels = ChannelTable::default();
        let ctx = EvalContext::new(&registry, &channels, &NoSolar);
        let log = MemoryAccumulationLog::new();

        let r0 = LogRecord::new(0).with_channel(0, 0.0, 0.0);
        let r1 = LogRecord::new(HOUR).with_channel(0, 50.0, 0.0);
        let r2 = LogRecord::new(2 * HOUR).with_channel(0, 20.0, 0.0);
        let r3 = LogRecord::new(3 * HOUR).with_channel(0, 45.0, 0.0);

        assert_eq!(log.integrate(&script, &r0, &r1, &ctx), 50.0);
        assert_eq!(log.integrate(&script, &r1, &r2, &ctx), 0.0);
        assert_eq!(log.integrate(&script, &r2, &r3, &ctx), 25.0);

        assert_eq!(log.first_timestamp(), Some(0));
        assert_eq!(log.positive_sum(&r0, &r3, Unit::Wh), 75.0);
    }
}
