//! [`DeviceSettings`] – timing, retry and tolerance parameters of the
//! runtime.
//!
//! These are host-side knobs, not device configuration: the persisted
//! [`NetworkConfig`][orc_types::NetworkConfig] lives in the key-value store.
//! Every field has a default, so a settings file only needs the values it
//! changes.

use std::time::Duration;

use orc_types::Rail;
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Rail bands
// ────────────────────────────────────────────────────────────────────────────

/// Inclusive voltage tolerance band of one rail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RailBand {
    pub min: f32,
    pub max: f32,
}

impl RailBand {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, volts: f32) -> bool {
        volts >= self.min && volts <= self.max
    }
}

/// Tolerance bands for every monitored rail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RailBands {
    pub main_psu: RailBand,
    pub rail_20v: RailBand,
    pub rail_5v: RailBand,
}

impl Default for RailBands {
    fn default() -> Self {
        Self {
            main_psu: RailBand::new(22.0, 26.0),
            rail_20v: RailBand::new(19.0, 21.0),
            rail_5v: RailBand::new(4.75, 5.25),
        }
    }
}

impl RailBands {
    pub fn band(&self, rail: Rail) -> RailBand {
        match rail {
            Rail::MainPsu => self.main_psu,
            Rail::Rail20V => self.rail_20v,
            Rail::Rail5V => self.rail_5v,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Per-component settings
// ────────────────────────────────────────────────────────────────────────────

/// Health sampler parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Readings averaged per rail per cycle.
    pub samples_per_cycle: u32,
    /// Pause between consecutive readings.
    pub sample_interval_ms: u64,
    /// Pause between cycles.
    pub cycle_pause_ms: u64,
    pub bands: RailBands,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            samples_per_cycle: 10,
            sample_interval_ms: 100,
            cycle_pause_ms: 1000,
            bands: RailBands::default(),
        }
    }
}

impl HealthSettings {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_millis(self.cycle_pause_ms)
    }
}

/// Clock commit and remote synchronization parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSyncSettings {
    /// Write-verify attempts per clock commit.
    pub commit_attempts: u32,
    pub commit_retry_delay_ms: u64,
    /// Retries after the first failed remote fetch.
    pub fetch_retries: u32,
    pub fetch_retry_delay_ms: u64,
    /// How often an unforced sync is attempted.
    pub resync_interval_secs: u64,
    /// No attempt, forced or not, within this long of the previous one.
    pub min_interval_secs: u64,
}

impl Default for TimeSyncSettings {
    fn default() -> Self {
        Self {
            commit_attempts: 3,
            commit_retry_delay_ms: 100,
            fetch_retries: 3,
            fetch_retry_delay_ms: 10,
            resync_interval_secs: 3600,
            min_interval_secs: 70,
        }
    }
}

impl TimeSyncSettings {
    pub fn commit_retry_delay(&self) -> Duration {
        Duration::from_millis(self.commit_retry_delay_ms)
    }

    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DeviceSettings
// ────────────────────────────────────────────────────────────────────────────

/// Every tunable of a running device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Pause at the end of each network-loop iteration.
    pub loop_interval_ms: u64,
    /// Period of the clock sampler.
    pub clock_sample_interval_ms: u64,
    /// Period of the indicator refresh.
    pub indicator_refresh_ms: u64,
    /// Half-period of the system indicator blink.
    pub blink_interval_ms: u64,
    /// How long either context waits for the other at boot.
    pub startup_timeout_ms: u64,
    pub health: HealthSettings,
    pub time_sync: TimeSyncSettings,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            loop_interval_ms: 10,
            clock_sample_interval_ms: 1000,
            indicator_refresh_ms: 20,
            blink_interval_ms: 500,
            startup_timeout_ms: 10_000,
            health: HealthSettings::default(),
            time_sync: TimeSyncSettings::default(),
        }
    }
}

impl DeviceSettings {
    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }

    pub fn clock_sample_interval(&self) -> Duration {
        Duration::from_millis(self.clock_sample_interval_ms)
    }

    pub fn indicator_refresh(&self) -> Duration {
        Duration::from_millis(self.indicator_refresh_ms)
    }

    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bands_bracket_nominal_voltages() {
        let bands = RailBands::default();
        assert!(bands.band(Rail::MainPsu).contains(24.0));
        assert!(bands.band(Rail::Rail20V).contains(20.0));
        assert!(bands.band(Rail::Rail5V).contains(5.0));
        assert!(!bands.band(Rail::Rail5V).contains(4.5));
        assert!(bands.band(Rail::Rail5V).contains(5.25));
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let s: DeviceSettings =
            serde_json::from_str(r#"{"loop_interval_ms": 50, "time_sync": {"min_interval_secs": 5}}"#)
                .unwrap();
        assert_eq!(s.loop_interval(), Duration::from_millis(50));
        assert_eq!(s.time_sync.min_interval(), Duration::from_secs(5));
        assert_eq!(s.time_sync.resync_interval(), Duration::from_secs(3600));
        assert_eq!(s.health, HealthSettings::default());
    }
}
