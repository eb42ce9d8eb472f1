//! [`Board`] – the set of drivers the controller runs on.
//!
//! Drivers that both execution contexts touch (clock, link, time source) are
//! held behind `Arc` and take `&self`; drivers owned by a single task (store,
//! rail sensor, indicator strip) are boxed and handed over whole.

use std::sync::Arc;

use crate::indicator::IndicatorDriver;
use crate::link::LinkLayer;
use crate::rails::RailSensor;
use crate::rtc::RealTimeClock;
use crate::storage::KeyValueStore;
use crate::time_source::TimeSource;

/// Every driver needed to boot the controller.
///
/// Construct directly for real hardware, or with
/// [`SimBoard`][crate::sim::SimBoard] for headless runs and tests.
pub struct Board {
    /// Real-time clock, shared by the clock sampler and the time authority.
    pub rtc: Arc<dyn RealTimeClock>,
    /// Ethernet interface, polled by the network loop.
    pub link: Arc<dyn LinkLayer>,
    /// Persisted key-value store, owned by the configuration store.
    pub store: Box<dyn KeyValueStore>,
    /// Remote UTC source, consulted only while the link is up.
    pub time_source: Arc<dyn TimeSource>,
    /// Supply-rail feedback, owned by the health sampler.
    pub rails: Box<dyn RailSensor>,
    /// Front-panel status strip, owned by the indicator task.
    pub indicator: Box<dyn IndicatorDriver>,
}
