//! [`StatusBoard`] – the shared [`HealthStatus`] record.
//!
//! Written by the health sampler (rails and system slot) and the network
//! manager (web server and MQTT slots); read by the indicator task and the
//! API.

use orc_kernel::SharedRecord;
use orc_types::{
    HealthStatus, IndicatorSlot, IndicatorStatus, OrcError, Rail, RailReading,
};

/// Lock-protected live health summary.
pub struct StatusBoard {
    pub(crate) record: SharedRecord<HealthStatus>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    /// Healthy rails, every slot in [`IndicatorStatus::Startup`].
    pub fn new() -> Self {
        Self {
            record: SharedRecord::new("health_status", HealthStatus::default()),
        }
    }

    /// Slot states shown while the device is still coming up: system
    /// starting, Modbus and MQTT off.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn apply_boot_defaults(&self) -> Result<(), OrcError> {
        self.record.with(|h| {
            h.set_indicator(IndicatorSlot::System, IndicatorStatus::Startup);
            h.set_indicator(IndicatorSlot::Modbus, IndicatorStatus::Off);
            h.set_indicator(IndicatorSlot::Mqtt, IndicatorStatus::Off);
        })
    }

    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn set_indicator(&self, slot: IndicatorSlot, status: IndicatorStatus) -> Result<(), OrcError> {
        self.record.with(|h| h.set_indicator(slot, status))
    }

    /// Store one reading per rail and derive the system slot from them, all
    /// under a single acquisition.  Returns the system slot's new state.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention; nothing is written.
    pub fn publish_rails(&self, readings: [RailReading; 3]) -> Result<IndicatorStatus, OrcError> {
        self.record.with(|h| {
            for rail in Rail::ALL {
                h.record_rail(rail, readings[rail.index()]);
            }
            let system = if h.all_rails_ok() {
                IndicatorStatus::Ok
            } else {
                IndicatorStatus::Warning
            };
            h.set_indicator(IndicatorSlot::System, system);
            system
        })
    }

    /// Snapshot of the whole record.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn current_status(&self) -> Result<HealthStatus, OrcError> {
        self.record.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(volts: f32, ok: bool) -> RailReading {
        RailReading { volts, ok }
    }

    #[test]
    fn boot_defaults_turn_unimplemented_slots_off() {
        let board = StatusBoard::new();
        board.apply_boot_defaults().unwrap();
        let s = board.current_status().unwrap();
        assert_eq!(s.indicator(IndicatorSlot::System), IndicatorStatus::Startup);
        assert_eq!(s.indicator(IndicatorSlot::Modbus), IndicatorStatus::Off);
        assert_eq!(s.indicator(IndicatorSlot::Mqtt), IndicatorStatus::Off);
        assert_eq!(s.indicator(IndicatorSlot::WebServer), IndicatorStatus::Startup);
    }

    #[test]
    fn publish_rails_sets_system_slot() {
        let board = StatusBoard::new();
        let all_good = [reading(24.0, true), reading(20.0, true), reading(5.0, true)];
        assert_eq!(board.publish_rails(all_good).unwrap(), IndicatorStatus::Ok);

        let one_bad = [reading(24.0, true), reading(17.0, false), reading(5.0, true)];
        assert_eq!(board.publish_rails(one_bad).unwrap(), IndicatorStatus::Warning);

        let s = board.current_status().unwrap();
        assert_eq!(s.rail(Rail::Rail20V), reading(17.0, false));
        assert_eq!(s.indicator(IndicatorSlot::System), IndicatorStatus::Warning);
    }
}
