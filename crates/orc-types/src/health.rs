//! [`HealthStatus`] – power-rail telemetry and the four status indicator
//! slots, written by the monitoring context and read by the indicator task
//! and the API layer.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Rails
// ────────────────────────────────────────────────────────────────────────────

/// A monitored supply rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rail {
    /// 24 V main power supply input.
    MainPsu,
    /// 20 V rail.
    Rail20V,
    /// 5 V logic rail.
    Rail5V,
}

impl Rail {
    /// Every rail, in storage order.
    pub const ALL: [Rail; 3] = [Rail::MainPsu, Rail::Rail20V, Rail::Rail5V];

    pub fn index(self) -> usize {
        match self {
            Rail::MainPsu => 0,
            Rail::Rail20V => 1,
            Rail::Rail5V => 2,
        }
    }

    /// Short label used in log lines.
    pub fn label(self) -> &'static str {
        match self {
            Rail::MainPsu => "PSU",
            Rail::Rail20V => "20V",
            Rail::Rail5V => "5V",
        }
    }
}

/// One averaged rail sample together with its in-tolerance flag.
///
/// Voltage and flag are a single value so they can only be stored together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RailReading {
    pub volts: f32,
    pub ok: bool,
}

impl Default for RailReading {
    fn default() -> Self {
        Self { volts: 0.0, ok: true }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Indicators
// ────────────────────────────────────────────────────────────────────────────

/// Position of a status LED on the front panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorSlot {
    Mqtt,
    WebServer,
    Modbus,
    System,
}

impl IndicatorSlot {
    pub const ALL: [IndicatorSlot; 4] = [
        IndicatorSlot::Mqtt,
        IndicatorSlot::WebServer,
        IndicatorSlot::Modbus,
        IndicatorSlot::System,
    ];

    pub fn index(self) -> usize {
        match self {
            IndicatorSlot::Mqtt => 0,
            IndicatorSlot::WebServer => 1,
            IndicatorSlot::Modbus => 2,
            IndicatorSlot::System => 3,
        }
    }
}

/// 24-bit `0xRRGGBB` colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndicatorColor(pub u32);

impl IndicatorColor {
    pub const OFF: IndicatorColor = IndicatorColor(0x000000);
    pub const GREEN: IndicatorColor = IndicatorColor(0x00FF00);
    pub const YELLOW: IndicatorColor = IndicatorColor(0xFFFF00);
    pub const RED: IndicatorColor = IndicatorColor(0xFF0000);
    pub const BLUE: IndicatorColor = IndicatorColor(0x0000FF);
    pub const ORANGE: IndicatorColor = IndicatorColor(0xFFA500);
}

/// Semantic state shown by an indicator slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorStatus {
    #[default]
    Startup,
    Ok,
    Error,
    Warning,
    Busy,
    Off,
}

impl IndicatorStatus {
    pub fn color(self) -> IndicatorColor {
        match self {
            IndicatorStatus::Startup => IndicatorColor::ORANGE,
            IndicatorStatus::Ok => IndicatorColor::GREEN,
            IndicatorStatus::Error => IndicatorColor::RED,
            IndicatorStatus::Warning => IndicatorColor::YELLOW,
            IndicatorStatus::Busy => IndicatorColor::BLUE,
            IndicatorStatus::Off => IndicatorColor::OFF,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HealthStatus
// ────────────────────────────────────────────────────────────────────────────

/// Live health summary.  One instance per boot, shared behind a lock.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    rails: [RailReading; 3],
    indicators: [IndicatorStatus; 4],
}

impl HealthStatus {
    pub fn rail(&self, rail: Rail) -> RailReading {
        self.rails[rail.index()]
    }

    /// Store a fresh reading, replacing both voltage and flag.
    pub fn record_rail(&mut self, rail: Rail, reading: RailReading) {
        self.rails[rail.index()] = reading;
    }

    /// Logical AND of every rail flag.
    pub fn all_rails_ok(&self) -> bool {
        self.rails.iter().all(|r| r.ok)
    }

    pub fn indicator(&self, slot: IndicatorSlot) -> IndicatorStatus {
        self.indicators[slot.index()]
    }

    pub fn set_indicator(&mut self, slot: IndicatorSlot, status: IndicatorStatus) {
        self.indicators[slot.index()] = status;
    }

    /// Colours of all four slots in panel order.
    pub fn colors(&self) -> [IndicatorColor; 4] {
        self.indicators.map(IndicatorStatus::color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status_is_startup_and_healthy() {
        let status = HealthStatus::default();
        assert!(status.all_rails_ok());
        for slot in IndicatorSlot::ALL {
            assert_eq!(status.indicator(slot), IndicatorStatus::Startup);
        }
    }

    #[test]
    fn record_rail_replaces_voltage_and_flag_together() {
        let mut status = HealthStatus::default();
        status.record_rail(Rail::Rail5V, RailReading { volts: 4.1, ok: false });
        let r = status.rail(Rail::Rail5V);
        assert!((r.volts - 4.1).abs() < f32::EPSILON);
        assert!(!r.ok);
        assert!(!status.all_rails_ok());

        status.record_rail(Rail::Rail5V, RailReading { volts: 5.0, ok: true });
        assert!(status.all_rails_ok());
    }

    #[test]
    fn colors_follow_indicator_status() {
        let mut status = HealthStatus::default();
        status.set_indicator(IndicatorSlot::WebServer, IndicatorStatus::Ok);
        status.set_indicator(IndicatorSlot::Mqtt, IndicatorStatus::Off);
        let colors = status.colors();
        assert_eq!(colors[0], IndicatorColor::OFF);
        assert_eq!(colors[1], IndicatorColor::GREEN);
        assert_eq!(colors[3], IndicatorColor::ORANGE);
    }

    #[test]
    fn rail_indices_are_distinct() {
        let idx: Vec<usize> = Rail::ALL.iter().map(|r| r.index()).collect();
        assert_eq!(idx, vec![0, 1, 2]);
    }
}
