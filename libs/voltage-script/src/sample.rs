//! Log samples and channel configuration
//!
//! Scripts are evaluated over a pair of log records. Each record carries
//! two cumulative accumulators per channel; the evaluator differences them
//! between the old and new record.

use crate::error::Result;
use serde::{Deserialize, Serialize};

const SECONDS_PER_HOUR: f64 = 3600.0;

/// One logged sample of all channel accumulators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unix time in seconds
    pub unix_time: i64,
    /// Primary accumulator: Wh for power channels, volt-hours for voltage channels
    #[serde(default)]
    pub accum1: Vec<f64>,
    /// Secondary accumulator: VAh for power channels, Hz-hours for voltage channels
    #[serde(default)]
    pub accum2: Vec<f64>,
}

impl LogRecord {
    pub fn new(unix_time: i64) -> Self {
        Self {
            unix_time,
            ..Default::default()
        }
    }

    /// Set both accumulators of one channel, growing the series as needed
    pub fn with_channel(mut self, channel: usize, accum1: f64, accum2: f64) -> Self {
        if self.accum1.len() <= channel {
            self.accum1.resize(channel + 1, 0.0);
        }
        if self.accum2.len() <= channel {
            self.accum2.resize(channel + 1, 0.0);
        }
        self.accum1[channel] = accum1;
        self.accum2[channel] = accum2;
        self
    }

    /// Missing channels read as 0
    pub fn accum1(&self, channel: usize) -> f64 {
        self.accum1.get(channel).copied().unwrap_or(0.0)
    }

    pub fn accum2(&self, channel: usize) -> f64 {
        self.accum2.get(channel).copied().unwrap_or(0.0)
    }
}

/// Old and new record of one evaluation interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePair {
    /// Absent for instantaneous reads
    #[serde(default)]
    pub old: Option<LogRecord>,
    pub new: LogRecord,
}

impl SamplePair {
    pub fn new(old: Option<LogRecord>, new: LogRecord) -> Self {
        Self { old, new }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn elapsed_hours(&self) -> f64 {
        elapsed_hours(self.old.as_ref(), &self.new)
    }
}

/// Hours between two records; 1 hour when there is no old record
pub fn elapsed_hours(old: Option<&LogRecord>, new: &LogRecord) -> f64 {
    match old {
        Some(old) => new.unix_time.saturating_sub(old.unix_time) as f64 / SECONDS_PER_HOUR,
        None => 1.0,
    }
}

/// Per-channel change between two records (the new value when old is absent)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelDelta {
    pub accum1: f64,
    pub accum2: f64,
}

impl ChannelDelta {
    pub fn between(old: Option<&LogRecord>, new: &LogRecord, channel: usize) -> Self {
        Self {
            accum1: new.accum1(channel) - old.map_or(0.0, |o| o.accum1(channel)),
            accum2: new.accum2(channel) - old.map_or(0.0, |o| o.accum2(channel)),
        }
    }
}

/// Voltage reference of one input channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Index of the voltage channel this input is measured against
    #[serde(default)]
    pub vchannel: usize,
    /// Multiplier applied to the reference voltage
    #[serde(default = "default_vmult")]
    pub vmult: f64,
}

fn default_vmult() -> f64 {
    1.0
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            vchannel: 0,
            vmult: default_vmult(),
        }
    }
}

/// Channel configuration for every input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelTable {
    channels: Vec<ChannelConfig>,
}

impl ChannelTable {
    pub fn new(channels: Vec<ChannelConfig>) -> Self {
        Self { channels }
    }

    /// Unconfigured channels use voltage channel 0 at unit multiplier
    pub fn get(&self, input: usize) -> ChannelConfig {
        self.channels.get(input).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
