//! Generic `RealTimeClock` trait for battery-backed calendar clock chips.
//!
//! The clock is the source of truth for wall time.  Both the monitoring
//! context (periodic sampling) and the network context (verified writes) talk
//! to the same chip, so drivers take `&self` and serialize bus transactions
//! internally.

use orc_types::{OrcError, WallClock};

/// A real-time-clock peripheral.
pub trait RealTimeClock: Send + Sync {
    /// Program the clock with `value`.
    ///
    /// Success only means the bus transaction completed; callers that need
    /// certainty must read the value back.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::HardwareFault`] if the transaction fails.
    fn write(&self, value: &WallClock) -> Result<(), OrcError>;

    /// Read the current date and time from the chip.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::HardwareFault`] if the transaction fails or the
    /// chip holds an out-of-range value.
    fn read(&self) -> Result<WallClock, OrcError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Minimal in-process clock used only for tests.
    struct LatchRtc {
        value: Mutex<WallClock>,
    }

    impl RealTimeClock for LatchRtc {
        fn write(&self, value: &WallClock) -> Result<(), OrcError> {
            *self.value.lock() = *value;
            Ok(())
        }

        fn read(&self) -> Result<WallClock, OrcError> {
            Ok(*self.value.lock())
        }
    }

    #[test]
    fn latch_rtc_write_then_read() {
        let start = WallClock::new(2024, 1, 1, 0, 0, 0).unwrap();
        let rtc = LatchRtc {
            value: Mutex::new(start),
        };
        assert_eq!(rtc.read().unwrap(), start);

        let next = WallClock::new(2025, 5, 6, 7, 8, 9).unwrap();
        rtc.write(&next).unwrap();
        assert_eq!(rtc.read().unwrap(), next);
    }
}
