//! Generic `LinkLayer` trait for the wired Ethernet interface.

use std::net::Ipv4Addr;

use orc_types::OrcError;

/// Addressing mode requested from the interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkSettings {
    /// Obtain a lease from a DHCP server.
    Dhcp,
    /// Use fixed addressing.  Unset fields are left to the stack's defaults.
    Static {
        address: Ipv4Addr,
        subnet: Option<Ipv4Addr>,
        gateway: Option<Ipv4Addr>,
        dns: Option<Ipv4Addr>,
    },
}

impl LinkSettings {
    /// Static addressing with only an address.
    pub fn address_only(address: Ipv4Addr) -> Self {
        LinkSettings::Static {
            address,
            subnet: None,
            gateway: None,
            dns: None,
        }
    }
}

/// The physical network interface.
///
/// Both contexts consult the link (the network loop polls it, the time
/// synchronizer checks it before contacting a server), so methods take
/// `&self`.
pub trait LinkLayer: Send + Sync {
    /// `true` while the PHY reports carrier.
    fn link_is_up(&self) -> bool;

    /// Bring the interface up with `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::HardwareFault`] if the interface cannot be
    /// configured (no DHCP offer, stack refused the address, …).
    fn configure(&self, settings: &LinkSettings) -> Result<(), OrcError>;

    /// Tear the interface down, releasing any DHCP lease.
    fn release(&self);

    /// Set the hostname announced to DHCP and mDNS.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::HardwareFault`] if the stack rejects the name.
    fn set_hostname(&self, hostname: &str) -> Result<(), OrcError>;

    /// Address currently bound to the interface, if any.
    fn local_address(&self) -> Option<Ipv4Addr>;

    /// Burned-in hardware address.
    fn mac_address(&self) -> [u8; 6];
}

/// Render a MAC address as `AA:BB:CC:DD:EE:FF`.
pub fn format_mac(mac: [u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
