//! Generic `IndicatorDriver` trait for the four-pixel front-panel status
//! strip.  Pixel encoding and timing belong to the driver.

use orc_types::{IndicatorColor, OrcError};

/// Number of pixels on the status strip.
pub const INDICATOR_COUNT: usize = 4;

/// A strip of RGB status indicators.
pub trait IndicatorDriver: Send {
    /// Latch `colors` onto the strip, slot 0 first.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::HardwareFault`] if the frame cannot be pushed.
    fn show(&mut self, colors: &[IndicatorColor; INDICATOR_COUNT]) -> Result<(), OrcError>;
}
