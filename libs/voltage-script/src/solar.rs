//! Simulated solar generation
//!
//! Backs virtual channel 0. Output follows a half sine between sunrise and
//! sunset (local time) peaking at `peak_watts`; nights are zero. Energy over
//! whole days is taken in closed form, so only the final partial day is
//! stepped numerically.

use crate::providers::SolarProvider;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Step used when integrating energy, in seconds
const INTEGRATION_STEP: i64 = 60;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulatedSolar {
    #[serde(default = "default_peak_watts")]
    pub peak_watts: f64,
    #[serde(default = "default_sunrise")]
    pub sunrise_hour: f64,
    #[serde(default = "default_sunset")]
    pub sunset_hour: f64,
    /// Offset of local time from UTC
    #[serde(default)]
    pub utc_offset_hours: f64,
}

fn default_peak_watts() -> f64 {
    4000.0
}

fn default_sunrise() -> f64 {
    6.0
}

fn default_sunset() -> f64 {
    18.0
}

impl Default for SimulatedSolar {
    fn default() -> Self {
        Self {
            peak_watts: default_peak_watts(),
            sunrise_hour: default_sunrise(),
            sunset_hour: default_sunset(),
            utc_offset_hours: 0.0,
        }
    }
}

impl SimulatedSolar {
    /// Local hour of day in `[0, 24)`
    fn local_hour(&self, unix_time: i64) -> f64 {
        let local = unix_time.saturating_add((self.utc_offset_hours * 3600.0).round() as i64);
        match DateTime::<Utc>::from_timestamp(local, 0) {
            Some(dt) => dt.num_seconds_from_midnight() as f64 / 3600.0,
            None => 0.0,
        }
    }

    fn power_at_hour(&self, hour: f64) -> f64 {
        let daylight = self.sunset_hour - self.sunrise_hour;
        if daylight <= 0.0 || hour <= self.sunrise_hour || hour >= self.sunset_hour {
            return 0.0;
        }
        self.peak_watts * (PI * (hour - self.sunrise_hour) / daylight).sin()
    }

    /// Wh generated over one full day
    pub fn daily_energy(&self) -> f64 {
        let daylight = self.sunset_hour - self.sunrise_hour;
        if daylight <= 0.0 {
            return 0.0;
        }
        if self.sunrise_hour >= 0.0 && self.sunset_hour <= 24.0 {
            self.peak_watts * daylight * 2.0 / PI
        } else {
            // the profile wraps midnight and gets clipped by the hour of day
            self.stepped_energy(0, SECONDS_PER_DAY)
        }
    }

    /// Midpoint rule over one-minute steps; callers keep `to - from` small
    fn stepped_energy(&self, from: i64, to: i64) -> f64 {
        let mut energy = 0.0;
        let mut t = from;
        while t < to {
            let step = INTEGRATION_STEP.min(to - t);
            let mid = self.local_hour(t) + step as f64 / 7200.0;
            energy += self.power_at_hour(mid % 24.0) * step as f64 / 3600.0;
            t += step;
        }
        energy
    }
}

impl SolarProvider for SimulatedSolar {
    fn instantaneous_power(&self, unix_time: i64) -> f64 {
        self.power_at_hour(self.local_hour(unix_time))
    }

    fn integrated_energy(&self, from: i64, to: i64) -> f64 {
        if to <= from {
            return 0.0;
        }
        let span = to.saturating_sub(from);
        let days = span / SECONDS_PER_DAY;
        let partial_from = to - span % SECONDS_PER_DAY;
        days as f64 * self.daily_energy() + self.stepped_energy(partial_from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOON: i64 = 12 * 3600;

    #[test]
    fn test_peak_at_solar_noon() {
        let solar = SimulatedSolar::default();
        assert!((solar.instantaneous_power(NOON) - 4000.0).abs() < 1e-9);
        assert_eq!(solar.instantaneous_power(3 * 3600), 0.0);
        assert_eq!(solar.instantaneous_power(20 * 3600 + 86400), 0.0);
    }

    #[test]
    fn test_utc_offset() {
        let solar = SimulatedSolar {
            utc_offset_hours: -5.0,
            ..Default::default()
        };
        // 17:00 UTC is local noon
        assert!((solar.instantaneous_power(17 * 3600) - 4000.0).abs() < 1e-9);
    }

    #[test]
    fn test_daily_energy() {
        let solar = SimulatedSolar::default();
        // integral of the half sine: peak * daylight * 2 / pi
        let expected = 4000.0 * 12.0 * 2.0 / PI;
        let energy = solar.integrated_energy(0, 86400);
        assert!((energy - expected).abs() / expected < 1e-4);
    }

    #[test]
    fn test_whole_days_plus_partial() {
        let solar = SimulatedSolar {
            utc_offset_hours: 2.0,
            ..Default::default()
        };
        let day = 86400;
        let partial = solar.integrated_energy(NOON, NOON + 5400);
        let total = solar.integrated_energy(NOON - 3 * day, NOON + 5400);
        assert!((total - (3.0 * solar.daily_energy() + partial)).abs() < 1e-6);
        assert!(partial > 0.0);
    }

    #[test]
    fn test_wrapping_daylight() {
        let solar = SimulatedSolar {
            sunrise_hour: 20.0,
            sunset_hour: 30.0,
            ..Default::default()
        };
        // only 20:00 to midnight falls inside the hour of day
        let expected = 4000.0 * 10.0 / PI * (1.0 - (PI * 0.4).cos());
        assert!((solar.daily_energy() - expected).abs() / expected < 1e-3);
    }

    #[test]
    fn test_extreme_timestamps() {
        let solar = SimulatedSolar {
            utc_offset_hours: 10.0,
            ..Default::default()
        };
        for (from, to) in [(0, i64::MAX), (i64::MIN, i64::MAX), (i64::MIN, 0)] {
            let energy = solar.integrated_energy(from, to);
            assert!(energy.is_finite() && energy >= 0.0);
        }
        assert!(solar.instantaneous_power(i64::MAX).is_finite());
        assert!(solar.instantaneous_power(i64::MIN).is_finite());
    }

    #[test]
    fn test_empty_interval() {
        let solar = SimulatedSolar::default();
        assert_eq!(solar.integrated_energy(NOON, NOON), 0.0);
        assert_eq!(solar.integrated_energy(NOON, NOON - 60), 0.0);
    }
}
