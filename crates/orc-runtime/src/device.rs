//! [`Device`] – boots and supervises both execution contexts.
//!
//! # Boot
//!
//! [`Device::boot`] runs on the thread that becomes the **network context**.
//! It spawns the **monitoring context**, and the two set up in parallel:
//!
//! | Network context | Monitoring context |
//! |---|---|
//! | load (or default and save) the configuration | first RTC read into the clock |
//! | report the MAC, bring the link up if carrier is present | indicator boot defaults |
//! | | start clock sampler and indicator refresh |
//!
//! Both then meet at a [`StartupBarrier`].  If either side fails, the other
//! is released with [`OrcError::FatalInitFailure`] and boot is aborted.  The
//! health sampler starts only after the barrier completes.
//!
//! # Run
//!
//! [`Device::run`] forces one remote time sync, then loops: poll the link;
//! while connected, serve requests and run the periodic time sync.  The loop
//! ends on external shutdown or when a configuration change asked for a
//! restart; the caller then boots a fresh `Device` from the same storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use orc_hal::{Board, IndicatorDriver, KeyValueStore, LinkLayer, RailSensor, format_mac};
use orc_kernel::{SetupHandle, SharedRecord, StartupBarrier};
use orc_types::{NetworkConfig, OrcError};
use tracing::{debug, error, info, warn};

use crate::api::DeviceApi;
use crate::config_store::ConfigStore;
use crate::health::HealthAggregator;
use crate::indicator::IndicatorRefresh;
use crate::network::{LinkEvent, NetworkManager};
use crate::settings::DeviceSettings;
use crate::status::StatusBoard;
use crate::time_authority::{SyncOutcome, TimeAuthority};

/// Longest single sleep of a periodic task, so stop requests are noticed
/// promptly.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Why [`Device::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Shutdown,
    /// A configuration change needs a fresh boot to take effect.
    RestartRequested,
}

// ────────────────────────────────────────────────────────────────────────────
// Device
// ────────────────────────────────────────────────────────────────────────────

pub struct Device {
    api: DeviceApi,
    time: Arc<TimeAuthority>,
    network: Arc<NetworkManager>,
    settings: DeviceSettings,
    shutdown: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    monitoring: Option<JoinHandle<()>>,
}

impl Device {
    /// Bring up both contexts on `board`.
    ///
    /// `shutdown` is watched by [`run`](Self::run); setting it ends the run
    /// loop.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::FatalInitFailure`] if either context fails its
    /// setup or does not finish it within the startup timeout.
    pub fn boot(
        board: Board,
        settings: DeviceSettings,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, OrcError> {
        let Board {
            rtc,
            link,
            store,
            time_source,
            rails,
            indicator,
        } = board;

        let config = Arc::new(SharedRecord::new("network_config", NetworkConfig::default()));
        let status = Arc::new(StatusBoard::new());
        let restart = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let time = Arc::new(TimeAuthority::new(
            rtc,
            Arc::clone(&link),
            time_source,
            Arc::clone(&config),
            settings.time_sync,
        ));

        let (network_setup, monitoring_setup) = StartupBarrier::pair("network", "monitoring");

        let monitoring = MonitoringContext {
            time: Arc::clone(&time),
            status: Arc::clone(&status),
            rails,
            indicator,
            settings: settings.clone(),
            stop: Arc::clone(&stop),
        };
        let handle = thread::Builder::new()
            .name("orc-monitoring".to_string())
            .spawn(move || monitoring.run(monitoring_setup))
            .map_err(|e| OrcError::FatalInitFailure(format!("cannot start monitoring context: {e}")))?;

        let abort = |e: OrcError, handle: JoinHandle<()>| {
            stop.store(true, Ordering::SeqCst);
            if handle.join().is_err() {
                error!("monitoring context panicked");
            }
            e
        };

        let network = match setup_network(link, store, config, Arc::clone(&status), restart) {
            Ok(network) => network,
            Err(e) => {
                error!(error = %e, "network context setup failed");
                drop(network_setup);
                return Err(abort(
                    OrcError::FatalInitFailure(format!("network setup: {e}")),
                    handle,
                ));
            }
        };

        if let Err(e) = network_setup.complete_and_wait(settings.startup_timeout()) {
            return Err(abort(e, handle));
        }
        info!("both contexts initialised");

        let api = DeviceApi::new(Arc::clone(&time), Arc::clone(&network), status);
        Ok(Self {
            api,
            time,
            network,
            settings,
            shutdown,
            stop,
            monitoring: Some(handle),
        })
    }

    /// Handle for the request layer.
    pub fn api(&self) -> DeviceApi {
        self.api.clone()
    }

    /// Run the network loop until shutdown or a restart request.
    ///
    /// `service` is called once per iteration while the link is connected;
    /// it is where incoming API requests are handled.
    pub fn run(mut self, mut service: impl FnMut(&DeviceApi)) -> ExitReason {
        self.sync_time(true);

        let reason = loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break ExitReason::Shutdown;
            }

            match self.network.poll() {
                Ok(LinkEvent::Connected(_)) => self.sync_time(true),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "link poll skipped"),
            }
            if self.network.is_connected() {
                service(&self.api);
                self.sync_time(false);
            }

            if self.network.restart_requested() {
                info!("restarting to apply configuration");
                break ExitReason::RestartRequested;
            }
            thread::sleep(self.settings.loop_interval());
        };

        self.stop_monitoring();
        reason
    }

    fn sync_time(&self, force: bool) {
        match self.time.sync_from_remote(force) {
            Ok(SyncOutcome::Synced(_)) | Ok(SyncOutcome::Skipped(_)) => {}
            Err(e) => warn!(error = %e, force, "time sync failed"),
        }
    }

    fn stop_monitoring(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.monitoring.take() {
            if handle.join().is_err() {
                error!("monitoring context panicked");
            }
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

fn setup_network(
    link: Arc<dyn LinkLayer>,
    store: Box<dyn KeyValueStore>,
    config: Arc<SharedRecord<NetworkConfig>>,
    status: Arc<StatusBoard>,
    restart: Arc<AtomicBool>,
) -> Result<Arc<NetworkManager>, OrcError> {
    let mut store = ConfigStore::new(store);
    let (loaded, source) = store.load()?;
    info!(?source, mode = loaded.mode_str(), hostname = %loaded.hostname, "network configuration");
    config.replace(loaded)?;

    info!(mac = %format_mac(link.mac_address()), "ethernet interface");
    let manager = NetworkManager::new(link, config, store, status, restart);
    if manager.poll()? == LinkEvent::Unchanged {
        info!("no carrier at boot, waiting for link");
    }
    Ok(Arc::new(manager))
}

// ────────────────────────────────────────────────────────────────────────────
// Monitoring context
// ────────────────────────────────────────────────────────────────────────────

struct MonitoringContext {
    time: Arc<TimeAuthority>,
    status: Arc<StatusBoard>,
    rails: Box<dyn RailSensor>,
    indicator: Box<dyn IndicatorDriver>,
    settings: DeviceSettings,
    stop: Arc<AtomicBool>,
}

impl MonitoringContext {
    /// Returning early drops `setup`, which fails the network side's wait.
    ///
    /// The clock and indicator tasks start as soon as this side is ready;
    /// rail sampling waits until both sides have completed.
    fn run(self, setup: SetupHandle) {
        let MonitoringContext {
            time,
            status,
            rails,
            indicator,
            settings,
            stop,
        } = self;

        if let Err(e) = time.initialize_from_hardware() {
            error!(error = %e, "monitoring context setup failed");
            return;
        }
        if let Err(e) = status.apply_boot_defaults() {
            error!(error = %e, "monitoring context setup failed");
            return;
        }

        let mut tasks = match spawn_display_tasks(time, Arc::clone(&status), indicator, &settings, &stop) {
            Ok(tasks) => tasks,
            Err(e) => {
                error!(error = %e, "cannot start periodic tasks");
                stop.store(true, Ordering::SeqCst);
                return;
            }
        };

        match setup.complete_and_wait(settings.startup_timeout()) {
            Ok(()) => {
                let mut health = HealthAggregator::new(rails, status, settings.health);
                let started = spawn_periodic("health", settings.health.cycle_pause(), Arc::clone(&stop), move || {
                    if let Err(e) = health.run_cycle() {
                        warn!(error = %e, "health cycle failed");
                    }
                });
                match started {
                    Ok(task) => {
                        tasks.push(task);
                        info!(tasks = tasks.len(), "monitoring context running");
                    }
                    Err(e) => {
                        error!(error = %e, "cannot start health sampling");
                        stop.store(true, Ordering::SeqCst);
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "stopping monitoring tasks");
                stop.store(true, Ordering::SeqCst);
            }
        }

        for task in tasks {
            if task.join().is_err() {
                error!("periodic task panicked");
            }
        }
        debug!("monitoring context stopped");
    }
}

fn spawn_display_tasks(
    time: Arc<TimeAuthority>,
    status: Arc<StatusBoard>,
    indicator: Box<dyn IndicatorDriver>,
    settings: &DeviceSettings,
    stop: &Arc<AtomicBool>,
) -> std::io::Result<Vec<JoinHandle<()>>> {
    let mut tasks = Vec::with_capacity(3);

    tasks.push(spawn_periodic("clock", settings.clock_sample_interval(), Arc::clone(stop), move || {
        if let Err(e) = time.periodic_sample() {
            debug!(error = %e, "clock sample skipped");
        }
    })?);

    let mut refresh = IndicatorRefresh::new(indicator, status, settings.blink_interval());
    tasks.push(spawn_periodic("indicator", settings.indicator_refresh(), Arc::clone(stop), move || {
        if let Err(e) = refresh.tick(Instant::now()) {
            debug!(error = %e, "indicator refresh skipped");
        }
    })?);

    Ok(tasks)
}

/// Run `body` every `period` on its own thread until `stop` is raised.
fn spawn_periodic(
    name: &'static str,
    period: Duration,
    stop: Arc<AtomicBool>,
    mut body: impl FnMut() + Send + 'static,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("orc-{name}"))
        .spawn(move || {
            debug!(task = name, period_ms = period.as_millis() as u64, "task started");
            while !stop.load(Ordering::SeqCst) {
                body();
                pause(&stop, period);
            }
            debug!(task = name, "task stopped");
        })
}

/// Sleep for `total`, waking early if `stop` is raised.
fn pause(stop: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(STOP_POLL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::NetworkUpdate;
    use orc_hal::{FileStore, MemoryStore, SimBoard, SimIndicator, SimRails, SimRtc, SimTimeSource};
    use orc_types::WallClock;

    fn fast_settings() -> DeviceSettings {
        DeviceSettings {
            loop_interval_ms: 1,
            clock_sample_interval_ms: 20,
            indicator_refresh_ms: 5,
            blink_interval_ms: 10,
            startup_timeout_ms: 2_000,
            health: crate::settings::HealthSettings {
                samples_per_cycle: 2,
                sample_interval_ms: 1,
                cycle_pause_ms: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn static_update() -> NetworkUpdate {
        NetworkUpdate {
            use_dhcp: Some(false),
            ip: Some("10.0.0.5".to_string()),
            subnet: Some("255.255.255.0".to_string()),
            gateway: Some("10.0.0.1".to_string()),
            dns: Some("10.0.0.1".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn boot_then_shutdown() {
        let indicator = SimIndicator::new();
        let rails = SimRails::nominal();
        let board = SimBoard::new()
            .with_indicator(indicator.clone())
            .with_rails(rails.clone())
            .build();
        let shutdown = Arc::new(AtomicBool::new(false));
        let device = Device::boot(board, fast_settings(), Arc::clone(&shutdown)).unwrap();

        let api = device.api();
        assert!(api.link_report().unwrap().connected);

        let deadline = Instant::now() + Duration::from_secs(2);
        while indicator.frame_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(indicator.frame_count() > 0);
        while rails.read_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(rails.read_count() > 0);

        shutdown.store(true, Ordering::SeqCst);
        assert_eq!(device.run(|_| {}), ExitReason::Shutdown);
    }

    #[test]
    fn static_update_restarts_and_survives_reboot() {
        let mem = MemoryStore::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let board = SimBoard::new().with_store(Box::new(mem.clone())).build();
        let device = Device::boot(board, fast_settings(), Arc::clone(&shutdown)).unwrap();
        let mut requests = vec![static_update()];
        let reason = device.run(|api| {
            if let Some(update) = requests.pop() {
                assert!(api.update_network(update).unwrap().restart_scheduled);
            }
        });
        assert_eq!(reason, ExitReason::RestartRequested);

        let board = SimBoard::new().with_store(Box::new(mem)).build();
        let device = Device::boot(board, fast_settings(), Arc::clone(&shutdown)).unwrap();
        let config = device.api().network_config().unwrap();
        assert!(!config.use_dhcp);
        assert_eq!(config.ip.to_string(), "10.0.0.5");
        drop(device);
    }

    #[test]
    fn rtc_failure_aborts_boot() {
        let rtc = SimRtc::ticking(WallClock::RTC_RESET);
        rtc.fail_next_reads(1);
        let board = SimBoard::new().with_rtc(rtc).build();
        let err = Device::boot(board, fast_settings(), Arc::new(AtomicBool::new(false)))
            .err()
            .expect("boot must fail");
        assert!(matches!(err, OrcError::FatalInitFailure(_)), "got {err:?}");
    }

    #[test]
    fn rails_are_not_sampled_when_network_setup_fails() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let store = FileStore::open(dir.path()).unwrap();
        // A directory where the guard file belongs makes the first store read fail.
        std::fs::create_dir(dir.path().join("guard.bin")).unwrap();
        let rails = SimRails::nominal();
        let board = SimBoard::new()
            .with_store(Box::new(store))
            .with_rails(rails.clone())
            .build();

        let err = Device::boot(board, fast_settings(), Arc::new(AtomicBool::new(false)))
            .err()
            .expect("boot must fail");
        assert!(matches!(err, OrcError::FatalInitFailure(_)), "got {err:?}");
        assert_eq!(rails.read_count(), 0);
    }

    #[test]
    fn ntp_enabled_config_syncs_clock_on_run() {
        let mem = MemoryStore::new();
        let mut store = ConfigStore::new(Box::new(mem.clone()));
        store
            .save(&NetworkConfig {
                ntp_enabled: true,
                timezone: "+00:00".parse().unwrap(),
                ..NetworkConfig::default()
            })
            .unwrap();

        let rtc = SimRtc::frozen(WallClock::RTC_RESET);
        let board = SimBoard::new()
            .with_rtc(rtc.clone())
            .with_store(Box::new(mem))
            .with_time_source(Arc::new(SimTimeSource::fixed(1_700_000_000)))
            .build();
        let shutdown = Arc::new(AtomicBool::new(false));
        let device = Device::boot(board, fast_settings(), Arc::clone(&shutdown)).unwrap();
        let api = device.api();

        let stop = Arc::clone(&shutdown);
        let reason = device.run(move |_| stop.store(true, Ordering::SeqCst));
        assert_eq!(reason, ExitReason::Shutdown);

        let report = api.current_time().unwrap();
        assert_eq!(report.date, "2023-11-14");
        assert_eq!(report.time, "22:13:20");
        assert!(rtc.write_count() >= 1);
    }

    #[test]
    fn file_store_config_persists_across_boots() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let shutdown = Arc::new(AtomicBool::new(true));

        let board = SimBoard::new()
            .with_store(Box::new(FileStore::open(dir.path()).unwrap()))
            .build();
        let device = Device::boot(board, fast_settings(), Arc::clone(&shutdown)).unwrap();
        device.api().update_network(static_update()).unwrap();
        assert_eq!(device.run(|_| {}), ExitReason::Shutdown);

        let board = SimBoard::new()
            .with_store(Box::new(FileStore::open(dir.path()).unwrap()))
            .build();
        let device = Device::boot(board, fast_settings(), shutdown).unwrap();
        assert!(!device.api().network_config().unwrap().use_dhcp);
    }

    #[test]
    fn pause_returns_early_on_stop() {
        let stop = AtomicBool::new(true);
        let started = Instant::now();
        pause(&stop, Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
