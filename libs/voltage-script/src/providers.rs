//! External providers and the evaluation context
//!
//! The evaluator never reaches for global state: everything it reads
//! besides the script itself comes through an [`EvalContext`].

use crate::registry::ScriptRegistry;
use crate::sample::{ChannelTable, LogRecord};
use crate::units::Unit;

/// Time-bounded store of positive partial sums for one integration script
///
/// Implementations must return the same answer for the same interval as
/// long as the interval lies inside `[first_timestamp, last_timestamp]`.
pub trait AccumulationLog: Send + Sync {
    /// Earliest time covered, `None` when the log is empty
    fn first_timestamp(&self) -> Option<i64>;

    /// Latest time covered, `None` when the log is empty
    fn last_timestamp(&self) -> Option<i64>;

    /// Sum of the positive components of the integration between two records
    fn positive_sum(&self, old: &LogRecord, new: &LogRecord, unit: Unit) -> f64;

    /// Whether `[old, new]` lies within the logged range
    fn covers(&self, old: &LogRecord, new: &LogRecord) -> bool {
        match (self.first_timestamp(), self.last_timestamp()) {
            (Some(first), Some(last)) => old.unix_time >= first && new.unix_time <= last,
            _ => false,
        }
    }
}

/// Source for the simulated solar virtual channel
pub trait SolarProvider: Send + Sync {
    /// Generation in watts at a unix time
    fn instantaneous_power(&self, unix_time: i64) -> f64;

    /// Energy in Wh generated between two unix times
    fn integrated_energy(&self, from: i64, to: i64) -> f64;
}

/// Solar provider for installations without a simulated array
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSolar;

impl SolarProvider for NoSolar {
    fn instantaneous_power(&self, _unix_time: i64) -> f64 {
        0.0
    }

    fn integrated_energy(&self, _from: i64, _to: i64) -> f64 {
        0.0
    }
}

/// Everything a script evaluation reads besides the script and samples
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    /// Integration scripts, addressed by integration token index
    pub integrations: &'a ScriptRegistry,
    pub channels: &'a ChannelTable,
    pub solar: &'a dyn SolarProvider,
}

impl<'a> EvalContext<'a> {
    pub fn new(
        integrations: &'a ScriptRegistry,
        channels: &'a ChannelTable,
        solar: &'a dyn SolarProvider,
    ) -> Self {
        Self {
            integrations,
            channels,
            solar,
        }
    }
}
