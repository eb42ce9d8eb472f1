//! `orc-types` – shared records and the system-wide error type.
//!
//! Every record that crosses the boundary between the network context and
//! the monitoring context is defined here, together with [`OrcError`], the
//! single error enum used across the workspace.
//!
//! - [`clock`] – [`WallClock`] and the [`TzOffset`] timezone offset.
//! - [`network`] – [`NetworkConfig`], the persisted link/time/MQTT settings.
//! - [`health`] – [`HealthStatus`], rail readings and indicator slots.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod clock;
pub mod health;
pub mod network;

pub use clock::{TzOffset, WallClock};
pub use health::{
    HealthStatus, IndicatorColor, IndicatorSlot, IndicatorStatus, Rail, RailReading,
};
pub use network::{MqttPassword, NetworkConfig};

/// Global error type spanning lock contention, hardware verification,
/// link configuration, remote time sync, input validation and boot failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrcError {
    /// A shared record's lock was not acquired within its bound.
    #[error("Lock Timeout: '{record}' not acquired within {timeout_ms} ms")]
    LockTimeout { record: String, timeout_ms: u64 },

    /// A clock write could not be confirmed by reading it back.
    #[error("Hardware Verify Failure on {component} after {attempts} attempt(s): {details}")]
    HardwareVerifyFailure {
        component: String,
        attempts: u32,
        details: String,
    },

    /// DHCP or static configuration of the link failed.
    #[error("Link Config Failure: {0}")]
    LinkConfigFailure(String),

    /// The remote time source was unreachable after retries.
    #[error("Remote Sync Failure: {0}")]
    RemoteSyncFailure(String),

    /// Malformed input was rejected before any side effect.
    #[error("Validation Failure on '{field}': {reason}")]
    ValidationFailure { field: String, reason: String },

    /// A one-time boot primitive failed; the device cannot start.
    #[error("Fatal Init Failure: {0}")]
    FatalInitFailure(String),

    /// A single driver call failed.
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    /// The persisted key-value store failed.
    #[error("Storage Error: {0}")]
    Storage(String),
}

impl OrcError {
    /// Shorthand for a [`OrcError::ValidationFailure`].
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        OrcError::ValidationFailure {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`OrcError::HardwareFault`].
    pub fn fault(component: impl Into<String>, details: impl Into<String>) -> Self {
        OrcError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }

    /// `true` for every variant except [`OrcError::FatalInitFailure`].
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, OrcError::FatalInitFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orc_error_display() {
        let err = OrcError::LockTimeout {
            record: "wall_clock".to_string(),
            timeout_ms: 100,
        };
        assert!(err.to_string().contains("wall_clock"));
        assert!(err.to_string().contains("100 ms"));

        let err2 = OrcError::invalid("ip", "not an IPv4 address");
        assert!(err2.to_string().contains("'ip'"));
    }

    #[test]
    fn only_fatal_init_is_unrecoverable() {
        assert!(!OrcError::FatalInitFailure("rtc".into()).is_recoverable());
        assert!(OrcError::RemoteSyncFailure("timeout".into()).is_recoverable());
        assert!(OrcError::LinkConfigFailure("dhcp".into()).is_recoverable());
    }

    #[test]
    fn orc_error_serialization_roundtrip() {
        let err = OrcError::HardwareVerifyFailure {
            component: "rtc".to_string(),
            attempts: 3,
            details: "read-back mismatch".to_string(),
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: OrcError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
