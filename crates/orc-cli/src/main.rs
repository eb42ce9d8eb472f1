//! `orc-cli` – ORC controller host binary.
//!
//! Runs the controller on a host machine against simulated hardware and a
//! file-backed store.  It:
//!
//! 1. Loads `~/.orc/config.toml`, writing defaults when the file is absent.
//! 2. Boots the device; a fatal boot error exits with status 1.
//! 3. Runs the network loop, logging a status line periodically.
//! 4. Re-boots from the same store when a configuration change needs a
//!    restart, and stops cleanly on **Ctrl-C**.

mod config;

use colored::Colorize;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use orc_hal::{Board, FileStore, SimBoard, SimLink, SimTimeSource, SntpClient, TimeSource};
use orc_runtime::{Device, DeviceApi, ExitReason};
use orc_types::{IndicatorSlot, OrcError};

use config::{Config, TimeSourceKind};

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    let _telemetry = orc_runtime::init_tracing("orc");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Host configuration ────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            Config::default()
        }
    };
    println!(
        "  Store {}  ·  time source {}\n",
        cfg.store_dir.display().to_string().dimmed(),
        cfg.time_source.to_string().bold()
    );

    // ── Boot / run / restart ──────────────────────────────────────────────
    let mut boots = 0u32;
    loop {
        boots += 1;
        let board = match build_board(&cfg) {
            Ok(board) => board,
            Err(e) => {
                error!(error = %e, "cannot assemble board");
                return ExitCode::FAILURE;
            }
        };

        let device = match Device::boot(board, cfg.device.clone(), Arc::clone(&shutdown)) {
            Ok(device) => device,
            Err(e) => {
                error!(error = %e, boot = boots, "boot failed");
                println!("{} {}", "✗ Boot failed:".red().bold(), e);
                return ExitCode::FAILURE;
            }
        };
        println!("  {} Controller running (boot #{boots})", "✓".green().bold());

        let mut reporter = StatusReporter::new(STATUS_INTERVAL);
        match device.run(|api| reporter.tick(api)) {
            ExitReason::Shutdown => {
                println!("{}", "  ✓ Exiting ORC.".green());
                return ExitCode::SUCCESS;
            }
            ExitReason::RestartRequested => {
                println!("  {} Restarting to apply configuration …", "↻".cyan().bold());
            }
        }
    }
}

/// Assemble a fresh board: simulated peripherals, the on-disk store, and
/// the configured time source.
fn build_board(cfg: &Config) -> Result<Board, OrcError> {
    let link = SimLink::new();
    link.set_link_up(cfg.sim.link_up);
    link.set_dhcp_available(cfg.sim.dhcp_available);

    let time_source: Arc<dyn TimeSource> = match cfg.time_source {
        TimeSourceKind::Sim => Arc::new(SimTimeSource::system()),
        TimeSourceKind::Sntp => Arc::new(SntpClient::new(Duration::from_millis(cfg.ntp_timeout_ms))),
    };

    Ok(SimBoard::new()
        .with_link(link)
        .with_store(Box::new(FileStore::open(&cfg.store_dir)?))
        .with_time_source(time_source)
        .build())
}

// ─────────────────────────────────────────────────────────────────────────────
// Status line
// ─────────────────────────────────────────────────────────────────────────────

struct StatusReporter {
    every: Duration,
    last: Option<Instant>,
}

impl StatusReporter {
    fn new(every: Duration) -> Self {
        Self { every, last: None }
    }

    fn tick(&mut self, api: &DeviceApi) {
        if self.last.is_some_and(|t| t.elapsed() < self.every) {
            return;
        }
        self.last = Some(Instant::now());

        let (time, status, link) = match (api.current_time(), api.status(), api.link_report()) {
            (Ok(time), Ok(status), Ok(link)) => (time, status, link),
            _ => {
                warn!("status snapshot skipped");
                return;
            }
        };
        info!(
            date = %time.date,
            time = %time.time,
            address = ?link.address,
            rails_ok = status.all_rails_ok(),
            system = ?status.indicator(IndicatorSlot::System),
            "status"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ____  ____  ______"#.bold().cyan());
    println!("{}", r#"  / __ \/ __ \/ ____/"#.bold().cyan());
    println!("{}", r#" / /_/ / /_/ / /___  "#.bold().cyan());
    println!("{}", r#" \____/_/ |_|\____/  "#.bold().cyan());
    println!();
    println!("  {} {}",
        "ORC".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Open Reactor Controller");
    println!();
}
