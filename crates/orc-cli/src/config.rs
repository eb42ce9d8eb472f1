//! Host configuration – reads/writes `~/.orc/config.toml`.
//!
//! This file only describes the host the controller runs on: where the
//! key-value store lives, where time comes from, and the runtime tunables.
//! The device's own network configuration lives in the store.

use orc_runtime::DeviceSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the device gets remote time from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum TimeSourceKind {
    /// Host system clock, behaving like an always-reachable server.
    #[default]
    Sim,
    /// SNTP query against the device's configured NTP server.
    Sntp,
}

impl std::fmt::Display for TimeSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeSourceKind::Sim => write!(f, "sim"),
            TimeSourceKind::Sntp => write!(f, "sntp"),
        }
    }
}

impl std::str::FromStr for TimeSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sim" => Ok(TimeSourceKind::Sim),
            "sntp" => Ok(TimeSourceKind::Sntp),
            other => Err(format!("unknown time source '{other}'")),
        }
    }
}

/// Behaviour of the simulated link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// Carrier present at boot.
    pub link_up: bool,
    /// A DHCP server answers on the simulated segment.
    pub dhcp_available: bool,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            link_up: true,
            dhcp_available: true,
        }
    }
}

/// Persisted host configuration stored in `~/.orc/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory of the file-backed key-value store.
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    #[serde(default)]
    pub time_source: TimeSourceKind,

    #[serde(default = "default_ntp_timeout_ms")]
    pub ntp_timeout_ms: u64,

    #[serde(default)]
    pub sim: SimSettings,

    #[serde(default)]
    pub device: DeviceSettings,
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn default_store_dir() -> PathBuf {
    PathBuf::from(home_dir()).join(".orc").join("store")
}
fn default_ntp_timeout_ms() -> u64 {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            time_source: TimeSourceKind::default(),
            ntp_timeout_ms: default_ntp_timeout_ms(),
            sim: SimSettings::default(),
            device: DeviceSettings::default(),
        }
    }
}

/// Return the path to `~/.orc/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".orc").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ORC_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ORC_STORE_DIR` | `store_dir` |
/// | `ORC_NTP_TIMEOUT_MS` | `ntp_timeout_ms` |
/// | `ORC_TIME_SOURCE` | `time_source` (`sim` or `sntp`) |
/// | `ORC_LOOP_INTERVAL_MS` | `device.loop_interval_ms` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ORC_STORE_DIR") {
        cfg.store_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("ORC_NTP_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>() {
            cfg.ntp_timeout_ms = ms;
        }
    if let Ok(v) = std::env::var("ORC_TIME_SOURCE")
        && let Ok(kind) = v.parse::<TimeSourceKind>() {
            cfg.time_source = kind;
        }
    if let Ok(v) = std::env::var("ORC_LOOP_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>() {
            cfg.device.loop_interval_ms = ms;
        }
}

/// Save the config to disk, creating `~/.orc/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.time_source = TimeSourceKind::Sntp;
        cfg.device.health.samples_per_cycle = 4;
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.time_source, TimeSourceKind::Sntp);
        assert_eq!(loaded.device.health.samples_per_cycle, 4);
        assert_eq!(loaded.ntp_timeout_ms, 1000);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "time_source = \"sntp\"\n[device]\nblink_interval_ms = 250\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.time_source, TimeSourceKind::Sntp);
        assert_eq!(loaded.device.blink_interval_ms, 250);
        assert_eq!(loaded.device.startup_timeout_ms, DeviceSettings::default().startup_timeout_ms);
        assert!(loaded.sim.link_up);
    }

    #[test]
    fn stale_server_address_key_is_ignored() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "ntp_server_addr = \"10.0.0.1\"\ntime_source = \"sntp\"\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.time_source, TimeSourceKind::Sntp);
    }

    #[test]
    fn config_path_points_to_orc_dir() {
        let p = config_path_for_home("/home/operator");
        assert!(p.to_string_lossy().contains(".orc"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn time_source_parses_case_insensitively() {
        assert_eq!("SNTP".parse::<TimeSourceKind>().unwrap(), TimeSourceKind::Sntp);
        assert!("gps".parse::<TimeSourceKind>().is_err());
    }

    // Env-var overrides share process state, so they are exercised in one test.
    #[test]
    fn apply_env_overrides_changes_fields_and_ignores_garbage() {
        // SAFETY: the only test in this crate touching these variables.
        unsafe {
            std::env::set_var("ORC_STORE_DIR", "/var/lib/orc");
            std::env::set_var("ORC_NTP_TIMEOUT_MS", "250");
            std::env::set_var("ORC_TIME_SOURCE", "sntp");
            std::env::set_var("ORC_LOOP_INTERVAL_MS", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.store_dir, PathBuf::from("/var/lib/orc"));
        assert_eq!(cfg.ntp_timeout_ms, 250);
        assert_eq!(cfg.time_source, TimeSourceKind::Sntp);
        assert_eq!(cfg.device.loop_interval_ms, DeviceSettings::default().loop_interval_ms);

        unsafe { std::env::set_var("ORC_LOOP_INTERVAL_MS", "25") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.device.loop_interval_ms, 25);

        unsafe {
            std::env::remove_var("ORC_STORE_DIR");
            std::env::remove_var("ORC_NTP_TIMEOUT_MS");
            std::env::remove_var("ORC_TIME_SOURCE");
            std::env::remove_var("ORC_LOOP_INTERVAL_MS");
        }
    }
}
