//! Generic `RailSensor` trait for the supply-rail voltage feedback inputs.
//!
//! A sensor returns a single instantaneous reading already scaled to volts
//! (ADC counts × divider ratio); averaging and classification are done by the
//! health aggregator.

use orc_types::{OrcError, Rail};

/// Analog feedback for the monitored supply rails.
pub trait RailSensor: Send {
    /// One instantaneous reading of `rail`, in volts.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::HardwareFault`] if the converter cannot be read.
    fn read_volts(&mut self, rail: Rail) -> Result<f32, OrcError>;
}
