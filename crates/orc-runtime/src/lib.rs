//! `orc-runtime` – the running ORC controller.
//!
//! Owns the shared records (clock, network configuration, health status),
//! the two execution contexts that touch them, and the calls the request
//! layer makes into them.
//!
//! # Modules
//!
//! - [`device`] – [`Device`]: boots the network and monitoring contexts,
//!   meets them at the startup barrier and runs the network loop until
//!   shutdown or a restart request.
//! - [`time_authority`] – [`TimeAuthority`]: the canonical wall clock.
//!   Verified commits to the RTC, periodic sampling and rate-limited remote
//!   synchronization.
//! - [`network`] – [`NetworkManager`]: link state machine with DHCP,
//!   fallback and static addressing; validated, persisted configuration
//!   updates.
//! - [`config_store`] – [`ConfigStore`]: guard-byte protected persistence
//!   of the network configuration.
//! - [`health`] – [`HealthAggregator`]: averages the supply rails each
//!   cycle and reports fault transitions.
//! - [`status`] – [`StatusBoard`]: the shared health/indicator record.
//! - [`indicator`] – [`IndicatorRefresh`]: pushes the status record to the
//!   indicator LEDs, blinking the system slot.
//! - [`api`] – [`DeviceApi`]: request bodies and the validated operations
//!   behind the HTTP endpoints.
//! - [`settings`] – [`DeviceSettings`]: every tunable interval, retry count
//!   and voltage band.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the
//!   `tracing` subscriber behind the logging lock, with an optional OTLP
//!   span exporter.
//!
//! # Locking
//!
//! Every shared record is a [`SharedRecord`][orc_kernel::SharedRecord] with
//! a bounded lock wait.  No code path holds two record locks at once;
//! hardware drivers are only called under the lock of the record they
//! serve.

pub mod api;
pub mod config_store;
pub mod device;
pub mod health;
pub mod indicator;
pub mod network;
pub mod settings;
pub mod status;
pub mod telemetry;
pub mod time_authority;

pub use api::{DeviceApi, MqttUpdate, NetworkUpdate, TimeReport, TimeUpdate};
pub use config_store::{CONFIG_GUARD, CONFIG_TAG, ConfigSource, ConfigStore};
pub use device::{Device, ExitReason};
pub use health::{CycleReport, HealthAggregator};
pub use indicator::IndicatorRefresh;
pub use network::{
    Addressing, AppliedLink, ConfigAck, FALLBACK_ADDRESS, LinkEvent, LinkReport, LinkState,
    NetworkManager,
};
pub use settings::{DeviceSettings, HealthSettings, RailBand, RailBands, TimeSyncSettings};
pub use status::StatusBoard;
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use time_authority::{SkipReason, SyncOutcome, SyncReport, TimeAuthority};
