//! [`IndicatorRefresh`] – pushes the status board to the front-panel strip.
//!
//! Slots 0–2 are shown as-is.  The system slot blinks: its colour is shown
//! for one blink interval, then it is dark for the next.

use std::sync::Arc;
use std::time::{Duration, Instant};

use orc_hal::{INDICATOR_COUNT, IndicatorDriver};
use orc_types::{IndicatorColor, IndicatorSlot, OrcError};
use tracing::debug;

use crate::status::StatusBoard;

pub struct IndicatorRefresh {
    driver: Box<dyn IndicatorDriver>,
    status: Arc<StatusBoard>,
    blink_interval: Duration,
    last_toggle: Instant,
    blink_on: bool,
}

impl IndicatorRefresh {
    pub fn new(driver: Box<dyn IndicatorDriver>, status: Arc<StatusBoard>, blink_interval: Duration) -> Self {
        Self {
            driver,
            status,
            blink_interval,
            last_toggle: Instant::now(),
            blink_on: true,
        }
    }

    /// Render and show one frame as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] if the status record was busy (the
    /// strip keeps its previous frame) or the driver's error.
    pub fn tick(&mut self, now: Instant) -> Result<[IndicatorColor; INDICATOR_COUNT], OrcError> {
        if now.saturating_duration_since(self.last_toggle) >= self.blink_interval {
            self.blink_on = !self.blink_on;
            self.last_toggle = now;
        }

        let mut frame = match self.status.current_status() {
            Ok(status) => status.colors(),
            Err(e) => {
                debug!(error = %e, "indicator frame skipped");
                return Err(e);
            }
        };
        if !self.blink_on {
            frame[IndicatorSlot::System.index()] = IndicatorColor::OFF;
        }
        self.driver.show(&frame)?;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_hal::SimIndicator;
    use orc_types::IndicatorStatus;

    fn setup() -> (IndicatorRefresh, Arc<StatusBoard>, SimIndicator, Instant) {
        let status = Arc::new(StatusBoard::new());
        let strip = SimIndicator::new();
        let refresh = IndicatorRefresh::new(
            Box::new(strip.clone()),
            Arc::clone(&status),
            Duration::from_millis(500),
        );
        let t0 = refresh.last_toggle;
        (refresh, status, strip, t0)
    }

    #[test]
    fn frame_mirrors_status_board() {
        let (mut refresh, status, strip, t0) = setup();
        status
            .set_indicator(IndicatorSlot::WebServer, IndicatorStatus::Ok)
            .unwrap();
        status
            .set_indicator(IndicatorSlot::Modbus, IndicatorStatus::Off)
            .unwrap();
        let frame = refresh.tick(t0).unwrap();
        assert_eq!(frame[IndicatorSlot::WebServer.index()], IndicatorColor::GREEN);
        assert_eq!(frame[IndicatorSlot::Modbus.index()], IndicatorColor::OFF);
        assert_eq!(frame[IndicatorSlot::System.index()], IndicatorColor::ORANGE);
        assert_eq!(strip.last_frame(), Some(frame));
    }

    #[test]
    fn system_slot_blinks_other_slots_do_not() {
        let (mut refresh, status, _strip, t0) = setup();
        status
            .set_indicator(IndicatorSlot::System, IndicatorStatus::Ok)
            .unwrap();
        status
            .set_indicator(IndicatorSlot::Mqtt, IndicatorStatus::Error)
            .unwrap();

        let sys = IndicatorSlot::System.index();
        let mqtt = IndicatorSlot::Mqtt.index();

        let on = refresh.tick(t0 + Duration::from_millis(100)).unwrap();
        assert_eq!(on[sys], IndicatorColor::GREEN);

        let off = refresh.tick(t0 + Duration::from_millis(520)).unwrap();
        assert_eq!(off[sys], IndicatorColor::OFF);
        assert_eq!(off[mqtt], IndicatorColor::RED);

        let still_off = refresh.tick(t0 + Duration::from_millis(700)).unwrap();
        assert_eq!(still_off[sys], IndicatorColor::OFF);

        let on_again = refresh.tick(t0 + Duration::from_millis(1040)).unwrap();
        assert_eq!(on_again[sys], IndicatorColor::GREEN);
        assert_eq!(on_again[mqtt], IndicatorColor::RED);
    }
}
