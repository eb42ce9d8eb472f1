//! [`HealthAggregator`] – supply-rail monitoring.
//!
//! Each cycle takes a burst of readings from every rail, averages them,
//! classifies each average against its tolerance band and publishes the
//! result to the [`StatusBoard`].  A rail leaving its band is logged once,
//! on the transition; a rail that stays out of band is not logged again
//! until it has recovered.

use std::sync::Arc;
use std::thread;

use orc_hal::RailSensor;
use orc_types::{IndicatorStatus, OrcError, Rail, RailReading};
use tracing::{info, warn};

use crate::settings::HealthSettings;
use crate::status::StatusBoard;

/// What one cycle measured and which rails changed state.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub readings: [RailReading; 3],
    /// Rails that went from healthy to unhealthy this cycle.
    pub faulted: Vec<Rail>,
    /// Rails that went from unhealthy to healthy this cycle.
    pub recovered: Vec<Rail>,
    pub system: IndicatorStatus,
}

/// Samples the rails and maintains the health half of the status record.
pub struct HealthAggregator {
    sensor: Box<dyn RailSensor>,
    status: Arc<StatusBoard>,
    settings: HealthSettings,
    previously_ok: [bool; 3],
}

impl HealthAggregator {
    pub fn new(sensor: Box<dyn RailSensor>, status: Arc<StatusBoard>, settings: HealthSettings) -> Self {
        Self {
            sensor,
            status,
            settings,
            previously_ok: [true; 3],
        }
    }

    /// Run one sampling cycle.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::HardwareFault`] if a rail cannot be read (the
    /// status record is then left as it was) or [`OrcError::LockTimeout`] if
    /// the result could not be published.
    pub fn run_cycle(&mut self) -> Result<CycleReport, OrcError> {
        let averages = self.sample_averages()?;

        let mut readings = [RailReading::default(); 3];
        let mut faulted = Vec::new();
        let mut recovered = Vec::new();
        for rail in Rail::ALL {
            let i = rail.index();
            let band = self.settings.bands.band(rail);
            let volts = averages[i];
            let ok = band.contains(volts);
            readings[i] = RailReading { volts, ok };

            // History moves with the log line, whether or not the publish
            // below succeeds.
            let was_ok = std::mem::replace(&mut self.previously_ok[i], ok);
            match (was_ok, ok) {
                (true, false) => {
                    warn!(
                        rail = rail.label(),
                        volts,
                        min = band.min,
                        max = band.max,
                        "rail out of tolerance"
                    );
                    faulted.push(rail);
                }
                (false, true) => {
                    info!(rail = rail.label(), volts, "rail back in tolerance");
                    recovered.push(rail);
                }
                _ => {}
            }
        }

        let system = self.status.publish_rails(readings)?;

        Ok(CycleReport {
            readings,
            faulted,
            recovered,
            system,
        })
    }

    fn sample_averages(&mut self) -> Result<[f32; 3], OrcError> {
        let count = self.settings.samples_per_cycle.max(1);
        let mut sums = [0.0f32; 3];
        for n in 0..count {
            for rail in Rail::ALL {
                sums[rail.index()] += self.sensor.read_volts(rail)?;
            }
            if n + 1 < count && self.settings.sample_interval_ms > 0 {
                thread::sleep(self.settings.sample_interval());
            }
        }
        Ok(sums.map(|s| s / count as f32))
    }
}
