//! [`DeviceApi`] – the calls behind the device's HTTP endpoints.
//!
//! Request bodies arrive as loosely typed fields (strings for addresses,
//! dates and offsets).  Every field is parsed and validated before anything
//! is changed, so a request with one bad field has no effect at all.

use std::sync::Arc;

use orc_types::network::{MQTT_DEFAULT_PORT, parse_ipv4};
use orc_types::{HealthStatus, NetworkConfig, OrcError, TzOffset, WallClock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::network::{ConfigAck, LinkReport, NetworkManager};
use crate::status::StatusBoard;
use crate::time_authority::{SyncOutcome, SyncReport, TimeAuthority};

// ────────────────────────────────────────────────────────────────────────────
// Request / response bodies
// ────────────────────────────────────────────────────────────────────────────

/// Body of a time update.  Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeUpdate {
    /// `YYYY-MM-DD`; required together with `time` when NTP is off.
    pub date: Option<String>,
    /// `HH:MM` or `HH:MM:SS`.
    pub time: Option<String>,
    /// `±HH:MM`.
    pub timezone: Option<String>,
    pub ntp_enabled: Option<bool>,
    pub dst_enabled: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeReport {
    pub date: String,
    pub time: String,
    pub timezone: TzOffset,
    pub ntp_enabled: bool,
    pub dst_enabled: bool,
    pub sync: SyncReport,
}

/// Body of a network update.  Absent fields keep their current value,
/// except that static mode requires every address.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkUpdate {
    pub use_dhcp: Option<bool>,
    pub ip: Option<String>,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub dns: Option<String>,
    pub hostname: Option<String>,
    pub ntp_server: Option<String>,
}

/// Body of an MQTT update.  An empty password keeps the stored one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MqttUpdate {
    pub broker: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
}

// ────────────────────────────────────────────────────────────────────────────
// DeviceApi
// ────────────────────────────────────────────────────────────────────────────

/// Cheap to clone; every clone talks to the same device.
#[derive(Clone)]
pub struct DeviceApi {
    time: Arc<TimeAuthority>,
    network: Arc<NetworkManager>,
    status: Arc<StatusBoard>,
}

impl DeviceApi {
    pub fn new(time: Arc<TimeAuthority>, network: Arc<NetworkManager>, status: Arc<StatusBoard>) -> Self {
        Self {
            time,
            network,
            status,
        }
    }

    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn current_time(&self) -> Result<TimeReport, OrcError> {
        let now = self.time.read()?;
        let config = self.network.current_config()?;
        Ok(TimeReport {
            date: now.date_string(),
            time: now.time_string(),
            timezone: config.timezone,
            ntp_enabled: config.ntp_enabled,
            dst_enabled: config.dst_enabled,
            sync: self.time.sync_report()?,
        })
    }

    /// Apply a time update and return the resulting clock value.
    ///
    /// Timezone and NTP/DST switches are persisted.  With NTP off, `date`
    /// and `time` set the clock directly, before anything is persisted; with
    /// NTP on, the settings are persisted first and a forced sync is
    /// attempted, its failure only logged.
    ///
    /// # Errors
    ///
    /// [`OrcError::ValidationFailure`] for malformed fields (nothing is
    /// changed), or the error of the persist or clock commit step.
    pub fn set_time(&self, update: TimeUpdate) -> Result<WallClock, OrcError> {
        let current = self.network.current_config()?;
        let timezone = match update.timezone.as_deref() {
            Some(raw) => raw.trim().parse::<TzOffset>()?,
            None => current.timezone,
        };
        let ntp_enabled = update.ntp_enabled.unwrap_or(current.ntp_enabled);
        let dst_enabled = update.dst_enabled.unwrap_or(current.dst_enabled);

        let manual = match (update.date.as_deref(), update.time.as_deref()) {
            (Some(date), Some(time)) if !ntp_enabled => {
                Some(WallClock::parse_date_time(date, time)?)
            }
            (None, None) => None,
            (_, _) if ntp_enabled => None,
            _ => {
                return Err(OrcError::invalid(
                    "date",
                    "date and time must be given together",
                ));
            }
        };

        // A manual time is committed before the settings are stored, so a
        // failed commit leaves both untouched.
        if let Some(value) = manual {
            self.time.commit(value)?;
        }

        if timezone != current.timezone
            || ntp_enabled != current.ntp_enabled
            || dst_enabled != current.dst_enabled
        {
            self.network
                .update_time_settings(timezone, ntp_enabled, dst_enabled)?;
        }

        if manual.is_none() && ntp_enabled {
            match self.time.sync_from_remote(true) {
                Ok(SyncOutcome::Synced(t)) => info!(time = %t, "clock synced on request"),
                Ok(SyncOutcome::Skipped(reason)) => info!(?reason, "requested sync skipped"),
                Err(e) => warn!(error = %e, "requested sync failed"),
            }
        }
        self.time.read()
    }

    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn network_config(&self) -> Result<NetworkConfig, OrcError> {
        self.network.current_config()
    }

    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn link_report(&self) -> Result<LinkReport, OrcError> {
        self.network.link_report()
    }

    /// Parse, validate and persist a network update.
    ///
    /// # Errors
    ///
    /// [`OrcError::ValidationFailure`] naming the first bad field (nothing
    /// is changed), or as [`NetworkManager::update_config`].
    pub fn update_network(&self, update: NetworkUpdate) -> Result<ConfigAck, OrcError> {
        self.network.update_config(|candidate| {
            if let Some(dhcp) = update.use_dhcp {
                candidate.use_dhcp = dhcp;
            }
            let use_dhcp = candidate.use_dhcp;

            let addresses = [
                ("ip", update.ip.as_deref(), &mut candidate.ip),
                ("subnet", update.subnet.as_deref(), &mut candidate.subnet),
                ("gateway", update.gateway.as_deref(), &mut candidate.gateway),
                ("dns", update.dns.as_deref(), &mut candidate.dns),
            ];
            for (field, raw, slot) in addresses {
                match raw {
                    Some(raw) => *slot = parse_ipv4(field, raw)?,
                    None if !use_dhcp => {
                        return Err(OrcError::invalid(field, "required in static mode"));
                    }
                    None => {}
                }
            }
            if let Some(hostname) = update.hostname {
                candidate.hostname = hostname.trim().to_string();
            }
            if let Some(server) = update.ntp_server {
                candidate.ntp_server = server.trim().to_string();
            }
            Ok(())
        })
    }

    /// # Errors
    ///
    /// As [`NetworkManager::update_mqtt`].
    pub fn update_mqtt(&self, update: MqttUpdate) -> Result<ConfigAck, OrcError> {
        self.network.update_mqtt(
            update.broker.trim().to_string(),
            update.port.unwrap_or(MQTT_DEFAULT_PORT),
            update.username,
            update.password,
        )
    }

    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn status(&self) -> Result<HealthStatus, OrcError> {
        self.status.current_status()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ConfigStore;
    use crate::settings::TimeSyncSettings;
    use orc_hal::{MemoryStore, SimLink, SimRtc, SimTimeSource};
    use orc_kernel::SharedRecord;
    use std::net::Ipv4Addr;
    use std::sync::atomic::AtomicBool;

    // 2025-06-01T12:00:00Z
    const NOON_UTC: i64 = 1_748_779_200;

    struct Rig {
        api: DeviceApi,
        mem: MemoryStore,
        rtc: SimRtc,
        source: SimTimeSource,
    }

    fn rig() -> Rig {
        let rtc = SimRtc::frozen(WallClock::RTC_RESET);
        let link = SimLink::new();
        let source = SimTimeSource::fixed(NOON_UTC);
        let mem = MemoryStore::new();
        let config = Arc::new(SharedRecord::new("network_config", NetworkConfig::default()));
        let status = Arc::new(StatusBoard::new());
        let time = Arc::new(TimeAuthority::new(
            Arc::new(rtc.clone()),
            Arc::new(link.clone()),
            Arc::new(source.clone()),
            Arc::clone(&config),
            TimeSyncSettings {
                commit_retry_delay_ms: 1,
                fetch_retry_delay_ms: 1,
                ..TimeSyncSettings::default()
            },
        ));
        let network = Arc::new(NetworkManager::new(
            Arc::new(link),
            config,
            ConfigStore::new(Box::new(mem.clone())),
            Arc::clone(&status),
            Arc::new(AtomicBool::new(false)),
        ));
        Rig {
            api: DeviceApi::new(time, network, status),
            mem,
            rtc,
            source,
        }
    }

    fn static_update() -> NetworkUpdate {
        NetworkUpdate {
            use_dhcp: Some(false),
            ip: Some("10.1.2.3".into()),
            subnet: Some("255.255.0.0".into()),
            gateway: Some("10.1.0.1".into()),
            dns: Some("1.1.1.1".into()),
            ..NetworkUpdate::default()
        }
    }

    #[test]
    fn single_malformed_address_rejects_whole_update() {
        let r = rig();
        for field in ["ip", "subnet", "gateway", "dns"] {
            let mut update = static_update();
            let bad = Some("192.168.1.300".to_string());
            match field {
                "ip" => update.ip = bad,
                "subnet" => update.subnet = bad,
                "gateway" => update.gateway = bad,
                _ => update.dns = bad,
            }
            match r.api.update_network(update) {
                Err(OrcError::ValidationFailure { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected validation failure for {field}, got {other:?}"),
            }
        }
        assert_eq!(r.mem.commit_count(), 0);
        assert_eq!(r.api.network_config().unwrap(), NetworkConfig::default());
    }

    #[test]
    fn malformed_address_rejected_in_dhcp_mode_too() {
        let r = rig();
        let update = NetworkUpdate {
            dns: Some("8.8.8".into()),
            ..NetworkUpdate::default()
        };
        assert!(r.api.update_network(update).is_err());
        assert_eq!(r.mem.commit_count(), 0);
    }

    #[test]
    fn well_formed_but_unusable_gateway_or_dns_is_rejected() {
        let r = rig();
        let update = NetworkUpdate {
            gateway: Some("0.0.0.0".into()),
            ..static_update()
        };
        assert!(matches!(
            r.api.update_network(update),
            Err(OrcError::ValidationFailure { ref field, .. }) if field == "gateway"
        ));
        let update = NetworkUpdate {
            dns: Some("255.255.255.255".into()),
            ..static_update()
        };
        assert!(matches!(
            r.api.update_network(update),
            Err(OrcError::ValidationFailure { ref field, .. }) if field == "dns"
        ));
        assert_eq!(r.mem.commit_count(), 0);
        assert_eq!(r.api.network_config().unwrap(), NetworkConfig::default());
    }

    #[test]
    fn static_mode_requires_every_address() {
        let r = rig();
        let update = NetworkUpdate {
            gateway: None,
            ..static_update()
        };
        assert!(matches!(
            r.api.update_network(update),
            Err(OrcError::ValidationFailure { ref field, .. }) if field == "gateway"
        ));
    }

    #[test]
    fn valid_static_update_is_persisted_with_restart() {
        let r = rig();
        let ack = r.api.update_network(static_update()).unwrap();
        assert!(ack.restart_scheduled);
        let c = r.api.network_config().unwrap();
        assert!(!c.use_dhcp);
        assert_eq!(c.ip, Ipv4Addr::new(10, 1, 2, 3));
        assert_eq!(c.subnet, Ipv4Addr::new(255, 255, 0, 0));
        assert_eq!(r.mem.commit_count(), 1);
    }

    #[test]
    fn manual_time_set_commits_clock() {
        let r = rig();
        let now = r
            .api
            .set_time(TimeUpdate {
                date: Some("2025-03-14".into()),
                time: Some("09:26".into()),
                ..TimeUpdate::default()
            })
            .unwrap();
        assert_eq!(now, WallClock::new(2025, 3, 14, 9, 26, 0).unwrap());
        let report = r.api.current_time().unwrap();
        assert_eq!(report.date, "2025-03-14");
        assert_eq!(report.time, "09:26:00");
        // No settings changed, so nothing was persisted.
        assert_eq!(r.mem.commit_count(), 0);
    }

    #[test]
    fn bad_timezone_changes_nothing() {
        let r = rig();
        let err = r
            .api
            .set_time(TimeUpdate {
                date: Some("2025-03-14".into()),
                time: Some("09:26".into()),
                timezone: Some("+5:30".into()),
                ..TimeUpdate::default()
            })
            .unwrap_err();
        assert!(matches!(err, OrcError::ValidationFailure { .. }));
        assert_eq!(r.rtc.write_count(), 0);
        assert_eq!(r.mem.commit_count(), 0);
    }

    #[test]
    fn failed_clock_commit_leaves_settings_unsaved() {
        let r = rig();
        r.rtc.ignore_next_writes(10);
        let err = r
            .api
            .set_time(TimeUpdate {
                date: Some("2025-03-14".into()),
                time: Some("09:26".into()),
                timezone: Some("+05:30".into()),
                dst_enabled: Some(true),
                ..TimeUpdate::default()
            })
            .unwrap_err();
        assert!(matches!(err, OrcError::HardwareVerifyFailure { .. }), "got {err:?}");
        assert_eq!(r.mem.commit_count(), 0);
        let c = r.api.network_config().unwrap();
        assert_eq!(c.timezone, NetworkConfig::default().timezone);
        assert!(!c.dst_enabled);
    }

    #[test]
    fn date_without_time_is_rejected() {
        let r = rig();
        assert!(
            r.api
                .set_time(TimeUpdate {
                    date: Some("2025-03-14".into()),
                    ..TimeUpdate::default()
                })
                .is_err()
        );
    }

    #[test]
    fn enabling_ntp_persists_and_syncs() {
        let r = rig();
        let now = r
            .api
            .set_time(TimeUpdate {
                timezone: Some("+02:00".into()),
                ntp_enabled: Some(true),
                ..TimeUpdate::default()
            })
            .unwrap();
        assert_eq!(now, WallClock::new(2025, 6, 1, 14, 0, 0).unwrap());
        assert_eq!(r.source.fetch_count(), 1);
        assert_eq!(r.mem.commit_count(), 1);
        let report = r.api.current_time().unwrap();
        assert!(report.ntp_enabled);
        assert_eq!(report.timezone.to_string(), "+02:00");
    }

    #[test]
    fn mqtt_port_defaults_when_absent() {
        let r = rig();
        r.api
            .update_mqtt(MqttUpdate {
                broker: " broker.lab ".into(),
                port: None,
                username: "orc".into(),
                password: "pw".into(),
            })
            .unwrap();
        let c = r.api.network_config().unwrap();
        assert_eq!(c.mqtt_broker, "broker.lab");
        assert_eq!(c.mqtt_port, MQTT_DEFAULT_PORT);
    }

    #[test]
    fn update_bodies_deserialize_from_camel_case() {
        let u: NetworkUpdate =
            serde_json::from_str(r#"{"useDhcp": false, "ip": "10.0.0.2", "ntpServer": "time.lab"}"#)
                .unwrap();
        assert_eq!(u.use_dhcp, Some(false));
        assert_eq!(u.ntp_server.as_deref(), Some("time.lab"));
        let t: TimeUpdate = serde_json::from_str(r#"{"ntpEnabled": true}"#).unwrap();
        assert_eq!(t.ntp_enabled, Some(true));
    }
}
