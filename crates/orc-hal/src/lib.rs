//! `orc-hal` – Hardware Abstraction Layer
//!
//! One trait per peripheral the controller talks to, plus in-process
//! simulators so the whole stack runs on a host.
//!
//! # Modules
//!
//! - [`rtc`] – [`RealTimeClock`][rtc::RealTimeClock]: the battery-backed
//!   calendar clock.
//! - [`link`] – [`LinkLayer`][link::LinkLayer]: the Ethernet interface and
//!   its DHCP / static addressing.
//! - [`storage`] – [`KeyValueStore`][storage::KeyValueStore]: guard-byte
//!   protected persistent records, with [`MemoryStore`][storage::MemoryStore]
//!   and [`FileStore`][storage::FileStore].
//! - [`time_source`] – [`TimeSource`][time_source::TimeSource]: remote UTC,
//!   with an SNTP client.
//! - [`rails`] – [`RailSensor`][rails::RailSensor]: supply-rail voltage
//!   feedback.
//! - [`indicator`] – [`IndicatorDriver`][indicator::IndicatorDriver]: the
//!   front-panel status strip.
//! - [`board`] – [`Board`][board::Board]: one of each, handed to the device
//!   at boot.
//! - [`sim`] – simulated drivers and the [`SimBoard`][sim::SimBoard] builder.

pub mod board;
pub mod indicator;
pub mod link;
pub mod rails;
pub mod rtc;
pub mod sim;
pub mod storage;
pub mod time_source;

pub use board::Board;
pub use indicator::{INDICATOR_COUNT, IndicatorDriver};
pub use link::{LinkLayer, LinkSettings, format_mac};
pub use rails::RailSensor;
pub use rtc::RealTimeClock;
pub use sim::{SimBoard, SimIndicator, SimLink, SimRails, SimRtc, SimTimeSource};
pub use storage::{ERASED_GUARD, FileStore, KeyValueStore, MemoryStore};
pub use time_source::{SntpClient, TimeSource};
