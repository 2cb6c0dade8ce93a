//! Unit Table
//!
//! Units a script can report in, with their display names and display
//! precision. The enumeration, [`UNIT_NAMES`] and [`UNIT_PRECISION`] are
//! index-aligned: adding a unit means adding one entry to each.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Reporting unit of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Unit {
    #[default]
    Watts = 0,
    Volts,
    Amps,
    VA,
    VAh,
    Hz,
    Wh,
    KWh,
    PF,
    VAR,
    VARh,
}

/// Display names, indexed by `Unit as usize`
pub const UNIT_NAMES: [&str; Unit::COUNT] = [
    "Watts", "Volts", "Amps", "VA", "VAh", "Hz", "Wh", "kWh", "PF", "VAR", "VARh",
];

/// Display precision (decimal places), indexed by `Unit as usize`
pub const UNIT_PRECISION: [u8; Unit::COUNT] = [2, 2, 3, 2, 4, 2, 4, 7, 3, 2, 4];

impl Unit {
    pub const COUNT: usize = 11;

    pub const ALL: [Unit; Unit::COUNT] = [
        Unit::Watts,
        Unit::Volts,
        Unit::Amps,
        Unit::VA,
        Unit::VAh,
        Unit::Hz,
        Unit::Wh,
        Unit::KWh,
        Unit::PF,
        Unit::VAR,
        Unit::VARh,
    ];

    pub fn name(self) -> &'static str {
        UNIT_NAMES[self as usize]
    }

    pub fn precision(self) -> u8 {
        UNIT_PRECISION[self as usize]
    }

    /// Case-insensitive lookup by display name
    pub fn from_name(s: &str) -> Option<Unit> {
        Unit::ALL
            .iter()
            .copied()
            .find(|unit| unit.name().eq_ignore_ascii_case(s))
    }

    /// Parse a configured unit string, falling back to Watts
    ///
    /// An empty string means "unset". Unknown strings are not an error.
    pub fn parse_or_default(s: &str) -> Unit {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Unit::default();
        }
        Unit::from_name(trimmed).unwrap_or_else(|| {
            warn!("Unknown unit '{}', using {}", trimmed, Unit::default());
            Unit::default()
        })
    }

    /// Format a value at this unit's display precision
    pub fn format_value(self, value: f64) -> String {
        format!("{:.*}", self.precision() as usize, value)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::from_name(s.trim()).ok_or_else(|| {
            format!(
                "Invalid unit '{}', expected one of: {}",
                s,
                UNIT_NAMES.join(", ")
            )
        })
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Unit::parse_or_default(&s))
    }
}
