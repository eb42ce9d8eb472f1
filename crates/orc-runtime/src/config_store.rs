//! [`ConfigStore`] – persistence of [`NetworkConfig`].
//!
//! The configuration is one JSON record in the key-value store.  It is only
//! trusted when the store's guard byte equals [`CONFIG_GUARD`]; anything else
//! (blank device, different firmware, interrupted write) means "no valid
//! configuration", and defaults are written back straight away.

use orc_hal::KeyValueStore;
use orc_types::{NetworkConfig, OrcError};
use tracing::{error, info, warn};

/// Guard byte marking a valid stored configuration.
pub const CONFIG_GUARD: u8 = 0x55;
/// Record tag of the network configuration.
pub const CONFIG_TAG: &str = "network";

/// Where a loaded configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    Stored,
    /// Defaults, because nothing valid was stored.
    Defaults,
}

pub struct ConfigStore {
    store: Box<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Load the stored configuration, or fall back to defaults and persist
    /// them.
    ///
    /// A failure to persist the defaults is logged; the defaults are still
    /// returned so the device can come up.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::Storage`] only if the guard byte cannot be read.
    pub fn load(&mut self) -> Result<(NetworkConfig, ConfigSource), OrcError> {
        let guard = self.store.guard_byte()?;
        if guard == CONFIG_GUARD {
            match self.read_record() {
                Ok(config) => {
                    info!(mode = config.mode_str(), hostname = %config.hostname, "configuration loaded");
                    return Ok((config, ConfigSource::Stored));
                }
                Err(e) => warn!(error = %e, "stored configuration unusable"),
            }
        } else {
            info!(guard, "no stored configuration");
        }

        let defaults = NetworkConfig::default();
        if let Err(e) = self.save(&defaults) {
            error!(error = %e, "failed to persist default configuration");
        } else {
            info!("default configuration saved");
        }
        Ok((defaults, ConfigSource::Defaults))
    }

    /// Stage the record and the guard byte, then commit both.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::Storage`] if serialization or the commit fails.
    pub fn save(&mut self, config: &NetworkConfig) -> Result<(), OrcError> {
        let bytes = serde_json::to_vec(config)
            .map_err(|e| OrcError::Storage(format!("cannot encode configuration: {e}")))?;
        self.store.save(CONFIG_TAG, &bytes)?;
        self.store.set_guard_byte(CONFIG_GUARD)?;
        self.store.commit()
    }

    fn read_record(&self) -> Result<NetworkConfig, OrcError> {
        let bytes = self
            .store
            .load(CONFIG_TAG)?
            .ok_or_else(|| OrcError::Storage("guard set but record missing".to_string()))?;
        let config: NetworkConfig = serde_json::from_slice(&bytes)
            .map_err(|e| OrcError::Storage(format!("cannot decode configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}
