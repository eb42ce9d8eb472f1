//! [`NetworkConfig`] – the single persisted record holding link addressing,
//! time-sync settings and MQTT credentials.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{OrcError, TzOffset};

/// Longest hostname accepted.
pub const HOSTNAME_MAX_LEN: usize = 31;
/// Longest NTP server name accepted.
pub const NTP_SERVER_MAX_LEN: usize = 63;
/// Longest MQTT broker name accepted.
pub const MQTT_BROKER_MAX_LEN: usize = 63;
/// Longest MQTT username accepted.
pub const MQTT_USERNAME_MAX_LEN: usize = 31;
/// Longest MQTT password accepted.
pub const MQTT_PASSWORD_MAX_LEN: usize = 31;
/// Default MQTT port.
pub const MQTT_DEFAULT_PORT: u16 = 1883;

// ────────────────────────────────────────────────────────────────────────────
// MqttPassword
// ────────────────────────────────────────────────────────────────────────────

/// MQTT password, wiped from memory on drop and never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct MqttPassword(String);

impl MqttPassword {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for MqttPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<not set>")
        } else {
            f.write_str("<redacted>")
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// NetworkConfig
// ────────────────────────────────────────────────────────────────────────────

/// Persisted device configuration.
///
/// Exactly one live instance exists per boot.  It is created either by a
/// successful load from the key-value store or by [`NetworkConfig::default`]
/// followed by an immediate save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// `true` = request an address over DHCP, `false` = use the static fields.
    pub use_dhcp: bool,
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
    /// Local offset applied to remote UTC time.
    pub timezone: TzOffset,
    pub hostname: String,
    pub ntp_server: String,
    pub ntp_enabled: bool,
    /// Adds a fixed hour to remote time when set.
    pub dst_enabled: bool,
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub mqtt_username: String,
    pub mqtt_password: MqttPassword,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            use_dhcp: true,
            ip: Ipv4Addr::new(192, 168, 1, 100),
            subnet: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            dns: Ipv4Addr::new(8, 8, 8, 8),
            timezone: TzOffset::default(),
            hostname: "open-reactor".to_string(),
            ntp_server: "pool.ntp.org".to_string(),
            ntp_enabled: false,
            dst_enabled: false,
            mqtt_broker: String::new(),
            mqtt_port: MQTT_DEFAULT_PORT,
            mqtt_username: String::new(),
            mqtt_password: MqttPassword::default(),
        }
    }
}

impl NetworkConfig {
    /// Check every field that cannot be enforced by its type.
    ///
    /// # Errors
    ///
    /// Returns the first [`OrcError::ValidationFailure`] found.
    pub fn validate(&self) -> Result<(), OrcError> {
        validate_hostname(&self.hostname)?;
        validate_len("ntp_server", &self.ntp_server, 1, NTP_SERVER_MAX_LEN)?;
        if self.ntp_server.chars().any(char::is_whitespace) {
            return Err(OrcError::invalid("ntp_server", "must not contain whitespace"));
        }
        if !self.use_dhcp {
            validate_host_address("ip", self.ip)?;
            validate_subnet_mask(self.subnet)?;
            validate_host_address("gateway", self.gateway)?;
            validate_host_address("dns", self.dns)?;
        }
        validate_len("mqtt_broker", &self.mqtt_broker, 0, MQTT_BROKER_MAX_LEN)?;
        validate_len("mqtt_username", &self.mqtt_username, 0, MQTT_USERNAME_MAX_LEN)?;
        validate_len(
            "mqtt_password",
            self.mqtt_password.expose(),
            0,
            MQTT_PASSWORD_MAX_LEN,
        )?;
        if self.mqtt_port == 0 {
            return Err(OrcError::invalid("mqtt_port", "port 0 is not usable"));
        }
        Ok(())
    }

    /// `true` when `other` differs in any field that requires the link to be
    /// brought up again (mode, addressing or hostname).
    pub fn link_settings_differ(&self, other: &NetworkConfig) -> bool {
        self.use_dhcp != other.use_dhcp
            || self.hostname != other.hostname
            || (!other.use_dhcp
                && (self.ip != other.ip
                    || self.subnet != other.subnet
                    || self.gateway != other.gateway
                    || self.dns != other.dns))
    }

    /// `"dhcp"` or `"static"`.
    pub fn mode_str(&self) -> &'static str {
        if self.use_dhcp { "dhcp" } else { "static" }
    }
}

/// Parse a dotted-quad IPv4 address for `field`.
///
/// # Errors
///
/// Returns [`OrcError::ValidationFailure`] naming `field`.
pub fn parse_ipv4(field: &str, raw: &str) -> Result<Ipv4Addr, OrcError> {
    raw.trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| OrcError::invalid(field, format!("'{raw}' is not an IPv4 address")))
}

fn validate_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), OrcError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(OrcError::invalid(
            field,
            format!("length {len} outside {min}-{max}"),
        ));
    }
    Ok(())
}

fn validate_hostname(hostname: &str) -> Result<(), OrcError> {
    validate_len("hostname", hostname, 1, HOSTNAME_MAX_LEN)?;
    if !hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(OrcError::invalid(
            "hostname",
            "only ASCII letters, digits and '-' are allowed",
        ));
    }
    if hostname.starts_with('-') || hostname.ends_with('-') {
        return Err(OrcError::invalid("hostname", "must not start or end with '-'"));
    }
    Ok(())
}

fn validate_host_address(field: &str, addr: Ipv4Addr) -> Result<(), OrcError> {
    if addr.is_unspecified() || addr.is_broadcast() || addr.is_multicast() {
        return Err(OrcError::invalid(field, format!("{addr} is not a host address")));
    }
    Ok(())
}

fn validate_subnet_mask(mask: Ipv4Addr) -> Result<(), OrcError> {
    let bits = u32::from(mask);
    // A valid mask is a run of ones followed by a run of zeros.
    if bits == 0 || bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(OrcError::invalid("subnet", format!("{mask} is not a contiguous mask")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = NetworkConfig::default();
        cfg.validate().unwrap();
        assert!(cfg.use_dhcp);
        assert_eq!(cfg.hostname, "open-reactor");
        assert_eq!(cfg.timezone.to_string(), "+13:00");
        assert_eq!(cfg.mqtt_port, 1883);
    }

    #[test]
    fn debug_redacts_mqtt_password() {
        let mut cfg = NetworkConfig::default();
        cfg.mqtt_password = MqttPassword::new("hunter2-secret");
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("hunter2-secret"));
        assert!(debug_str.contains("<redacted>"));
    }

    #[test]
    fn debug_shows_not_set_for_empty_password() {
        let cfg = NetworkConfig::default();
        assert!(format!("{:?}", cfg).contains("<not set>"));
    }

    #[test]
    fn static_mode_requires_contiguous_subnet() {
        let mut cfg = NetworkConfig::default();
        cfg.use_dhcp = false;
        cfg.subnet = Ipv4Addr::new(255, 0, 255, 0);
        assert!(cfg.validate().is_err());
        cfg.subnet = Ipv4Addr::new(255, 255, 252, 0);
        cfg.validate().unwrap();
    }

    #[test]
    fn static_mode_rejects_unspecified_ip() {
        let mut cfg = NetworkConfig::default();
        cfg.use_dhcp = false;
        cfg.ip = Ipv4Addr::UNSPECIFIED;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, OrcError::ValidationFailure { ref field, .. } if field == "ip"));
    }

    #[test]
    fn static_mode_rejects_unusable_gateway_and_dns() {
        let bad = [
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::BROADCAST,
            Ipv4Addr::new(224, 0, 0, 1),
        ];
        for addr in bad {
            let mut cfg = NetworkConfig::default();
            cfg.use_dhcp = false;
            cfg.gateway = addr;
            let err = cfg.validate().unwrap_err();
            assert!(matches!(err, OrcError::ValidationFailure { ref field, .. } if field == "gateway"));

            let mut cfg = NetworkConfig::default();
            cfg.use_dhcp = false;
            cfg.dns = addr;
            let err = cfg.validate().unwrap_err();
            assert!(matches!(err, OrcError::ValidationFailure { ref field, .. } if field == "dns"));
        }
    }

    #[test]
    fn dhcp_mode_ignores_stored_gateway_and_dns() {
        let mut cfg = NetworkConfig::default();
        cfg.gateway = Ipv4Addr::UNSPECIFIED;
        cfg.dns = Ipv4Addr::BROADCAST;
        cfg.validate().unwrap();
    }

    #[test]
    fn hostname_rules() {
        let mut cfg = NetworkConfig::default();
        let too_long = "a".repeat(32);
        for bad in ["", "-reactor", "reactor-", "re actor", too_long.as_str()] {
            cfg.hostname = bad.to_string();
            assert!(cfg.validate().is_err(), "{bad:?} should be rejected");
        }
        cfg.hostname = "reactor-02".to_string();
        cfg.validate().unwrap();
    }

    #[test]
    fn link_settings_differ_ignores_time_and_mqtt_fields() {
        let live = NetworkConfig::default();
        let mut next = live.clone();
        next.ntp_enabled = true;
        next.timezone = "-05:00".parse().unwrap();
        next.mqtt_broker = "broker.local".to_string();
        assert!(!live.link_settings_differ(&next));

        next.hostname = "reactor-b".to_string();
        assert!(live.link_settings_differ(&next));
    }

    #[test]
    fn static_addresses_only_matter_in_static_mode() {
        let live = NetworkConfig::default();
        let mut next = live.clone();
        next.ip = Ipv4Addr::new(10, 0, 0, 5);
        assert!(!live.link_settings_differ(&next));
        next.use_dhcp = false;
        assert!(live.link_settings_differ(&next));
    }

    #[test]
    fn parse_ipv4_names_the_field() {
        assert_eq!(parse_ipv4("gateway", " 10.0.0.1 ").unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        let err = parse_ipv4("gateway", "10.0.0.256").unwrap_err();
        assert!(err.to_string().contains("'gateway'"));
    }

    #[test]
    fn config_serialization_roundtrip() {
        let mut cfg = NetworkConfig::default();
        cfg.mqtt_password = MqttPassword::new("pw");
        cfg.timezone = "-03:30".parse().unwrap();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"-03:30\""));
        let back: NetworkConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
