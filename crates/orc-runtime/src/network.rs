//! [`NetworkManager`] – link state machine and live configuration.
//!
//! The network loop calls [`NetworkManager::poll`] once per iteration.  The
//! manager compares the PHY's carrier with its own [`LinkState`] and
//! configures the interface when the cable comes back.  `Connected` can only
//! be entered with an [`AppliedLink`], which only
//! [`NetworkManager::apply_network_config`] produces, so the state can never
//! claim a link that was not successfully configured.
//!
//! Configuration updates are validated, persisted and then made live.
//! Changes to addressing or hostname are not applied in place; instead a
//! device restart is requested and the new settings take effect on the next
//! boot.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use orc_hal::{LinkLayer, LinkSettings, format_mac};
use orc_kernel::{RetryPolicy, SharedRecord};
use orc_types::{
    IndicatorSlot, IndicatorStatus, MqttPassword, NetworkConfig, OrcError, TzOffset,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config_store::ConfigStore;
use crate::status::StatusBoard;

/// Static address used when DHCP does not answer.
pub const FALLBACK_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);

/// How long an update waits for one already in progress.
const UPDATE_TIMEOUT: Duration = Duration::from_secs(2);

// ────────────────────────────────────────────────────────────────────────────
// Link state
// ────────────────────────────────────────────────────────────────────────────

/// How the interface ended up addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Addressing {
    Dhcp,
    /// DHCP failed; running on [`FALLBACK_ADDRESS`].
    Fallback,
    Static,
}

/// Proof of a successful interface configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedLink {
    addressing: Addressing,
    address: Option<Ipv4Addr>,
}

impl AppliedLink {
    pub fn addressing(&self) -> Addressing {
        self.addressing
    }

    /// Address reported by the interface right after configuration.
    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connected(AppliedLink),
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected(_))
    }
}

/// What a single [`NetworkManager::poll`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Unchanged,
    Connected(AppliedLink),
    /// Carrier is up but configuration failed; retried on the next poll.
    ApplyFailed(OrcError),
    Disconnected,
}

// ────────────────────────────────────────────────────────────────────────────
// Reports and acknowledgements
// ────────────────────────────────────────────────────────────────────────────

/// Returned once an update has been persisted and made live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfigAck {
    /// The device will restart to apply the new link settings.
    pub restart_scheduled: bool,
}

/// Interface summary for the API layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub connected: bool,
    pub mode: &'static str,
    pub addressing: Option<Addressing>,
    pub mac: String,
    pub hostname: String,
    pub address: Option<Ipv4Addr>,
    pub configured_ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
}

// ────────────────────────────────────────────────────────────────────────────
// NetworkManager
// ────────────────────────────────────────────────────────────────────────────

pub struct NetworkManager {
    link: Arc<dyn LinkLayer>,
    config: Arc<SharedRecord<NetworkConfig>>,
    state: SharedRecord<LinkState>,
    store: SharedRecord<ConfigStore>,
    /// Serializes updates from snapshot to replace.  Never taken while a
    /// record lock is held.
    updates: SharedRecord<()>,
    status: Arc<StatusBoard>,
    restart: Arc<AtomicBool>,
}

impl NetworkManager {
    /// `config` must already hold the loaded (or defaulted) configuration.
    /// `restart` is raised when an update needs a reboot.
    pub fn new(
        link: Arc<dyn LinkLayer>,
        config: Arc<SharedRecord<NetworkConfig>>,
        store: ConfigStore,
        status: Arc<StatusBoard>,
        restart: Arc<AtomicBool>,
    ) -> Self {
        Self {
            link,
            config,
            state: SharedRecord::new("link_state", LinkState::Disconnected),
            store: SharedRecord::new("config_store", store),
            updates: SharedRecord::new("config_update", ()).with_default_timeout(UPDATE_TIMEOUT),
            status,
            restart,
        }
    }

    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn current_config(&self) -> Result<NetworkConfig, OrcError> {
        self.config.snapshot()
    }

    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn link_state(&self) -> Result<LinkState, OrcError> {
        self.state.snapshot()
    }

    /// `false` when the state record is busy.
    pub fn is_connected(&self) -> bool {
        self.state.with(|s| s.is_connected()).unwrap_or(false)
    }

    pub fn restart_requested(&self) -> bool {
        self.restart.load(Ordering::SeqCst)
    }

    /// Advance the link state machine by one step.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] if the state record is busy; the
    /// state is then unchanged.
    pub fn poll(&self) -> Result<LinkEvent, OrcError> {
        let carrier = self.link.link_is_up();
        let connected = self.state.with(|s| s.is_connected())?;

        match (connected, carrier) {
            (true, true) | (false, false) => Ok(LinkEvent::Unchanged),
            (true, false) => {
                self.state.replace(LinkState::Disconnected)?;
                warn!("link down");
                self.set_indicator(IndicatorSlot::WebServer, IndicatorStatus::Off);
                self.set_indicator(IndicatorSlot::Mqtt, IndicatorStatus::Off);
                Ok(LinkEvent::Disconnected)
            }
            (false, true) => match self.apply_network_config() {
                Ok(applied) => {
                    self.state.replace(LinkState::Connected(applied.clone()))?;
                    info!(
                        addressing = ?applied.addressing,
                        address = ?applied.address,
                        "link up"
                    );
                    self.set_indicator(IndicatorSlot::WebServer, IndicatorStatus::Ok);
                    Ok(LinkEvent::Connected(applied))
                }
                Err(e) => {
                    error!(error = %e, "link up but configuration failed");
                    self.set_indicator(IndicatorSlot::WebServer, IndicatorStatus::Error);
                    Ok(LinkEvent::ApplyFailed(e))
                }
            },
        }
    }

    /// Configure the interface from the live configuration.
    ///
    /// DHCP: the old lease is released and a new one requested; if that
    /// fails the interface falls back to [`FALLBACK_ADDRESS`] once.  Static:
    /// the stored addressing is applied as-is and a failure is returned
    /// without retrying.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LinkConfigFailure`] when the interface could not
    /// be configured, or [`OrcError::LockTimeout`] if the configuration
    /// record is busy.
    pub fn apply_network_config(&self) -> Result<AppliedLink, OrcError> {
        let config = self.config.snapshot()?;
        if let Err(e) = self.link.set_hostname(&config.hostname) {
            warn!(hostname = %config.hostname, error = %e, "hostname not applied");
        }

        let addressing = if config.use_dhcp {
            self.link.release();
            // Attempt 1 is DHCP, attempt 2 the fixed fallback.
            RetryPolicy::new(2, Duration::ZERO)
                .run(|attempt| {
                    if attempt == 1 {
                        self.link
                            .configure(&LinkSettings::Dhcp)
                            .map(|()| Addressing::Dhcp)
                            .inspect_err(|e| {
                                warn!(error = %e, fallback = %FALLBACK_ADDRESS, "DHCP failed");
                            })
                    } else {
                        self.link
                            .configure(&LinkSettings::address_only(FALLBACK_ADDRESS))
                            .map(|()| Addressing::Fallback)
                    }
                })
                .map_err(|e| {
                    OrcError::LinkConfigFailure(format!("DHCP and fallback both failed: {}", e.last))
                })?
        } else {
            self.link
                .configure(&LinkSettings::Static {
                    address: config.ip,
                    subnet: Some(config.subnet),
                    gateway: Some(config.gateway),
                    dns: Some(config.dns),
                })
                .map_err(|e| OrcError::LinkConfigFailure(format!("static {}: {e}", config.ip)))?;
            Addressing::Static
        };

        Ok(AppliedLink {
            addressing,
            address: self.link.local_address(),
        })
    }

    /// Apply `edit` to the live configuration, then validate, persist and
    /// make the result live.
    ///
    /// Updates are serialized, so each one starts from the result of the
    /// previous one.  Nothing is written when `edit` or validation fails.
    /// If the link settings differ from the live ones the acknowledgement
    /// says so and a restart is requested.
    ///
    /// # Errors
    ///
    /// [`OrcError::ValidationFailure`] for a bad field, [`OrcError::Storage`]
    /// if persisting fails (live configuration untouched), or
    /// [`OrcError::LockTimeout`].
    pub fn update_config(
        &self,
        edit: impl FnOnce(&mut NetworkConfig) -> Result<(), OrcError>,
    ) -> Result<ConfigAck, OrcError> {
        self.updates.with(|_| -> Result<ConfigAck, OrcError> {
            let previous = self.config.snapshot()?;
            let mut candidate = previous.clone();
            edit(&mut candidate)?;
            candidate.validate()?;

            self.store.with(|store| store.save(&candidate))??;
            let restart = previous.link_settings_differ(&candidate);
            self.config.replace(candidate)?;

            if restart {
                info!("link settings changed, restart requested");
                self.restart.store(true, Ordering::SeqCst);
            } else {
                info!("configuration updated");
            }
            Ok(ConfigAck {
                restart_scheduled: restart,
            })
        })?
    }

    /// Replace the MQTT settings.  An empty `password` keeps the stored one.
    ///
    /// # Errors
    ///
    /// As [`update_config`](Self::update_config).
    pub fn update_mqtt(
        &self,
        broker: String,
        port: u16,
        username: String,
        password: String,
    ) -> Result<ConfigAck, OrcError> {
        self.update_config(|c| {
            c.mqtt_broker = broker;
            c.mqtt_port = port;
            c.mqtt_username = username;
            if !password.is_empty() {
                c.mqtt_password = MqttPassword::new(password);
            }
            Ok(())
        })
    }

    /// Replace the timezone and NTP/DST switches.
    ///
    /// # Errors
    ///
    /// As [`update_config`](Self::update_config).
    pub fn update_time_settings(
        &self,
        timezone: TzOffset,
        ntp_enabled: bool,
        dst_enabled: bool,
    ) -> Result<ConfigAck, OrcError> {
        self.update_config(|c| {
            c.timezone = timezone;
            c.ntp_enabled = ntp_enabled;
            c.dst_enabled = dst_enabled;
            Ok(())
        })
    }

    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn link_report(&self) -> Result<LinkReport, OrcError> {
        let config = self.config.snapshot()?;
        let state = self.state.snapshot()?;
        let addressing = match &state {
            LinkState::Connected(applied) => Some(applied.addressing),
            LinkState::Disconnected => None,
        };
        Ok(LinkReport {
            connected: state.is_connected(),
            mode: config.mode_str(),
            addressing,
            mac: format_mac(self.link.mac_address()),
            hostname: config.hostname,
            address: self.link.local_address(),
            configured_ip: config.ip,
            subnet: config.subnet,
            gateway: config.gateway,
            dns: config.dns,
        })
    }

    fn set_indicator(&self, slot: IndicatorSlot, status: IndicatorStatus) {
        if let Err(e) = self.status.set_indicator(slot, status) {
            warn!(?slot, error = %e, "indicator not updated");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
