//! In-process simulated drivers for host runs and tests without hardware.
//!
//! Every simulator is a cheap `Clone` handle over shared state, so a test can
//! keep one handle for fault injection and inspection while the code under
//! test owns another inside a [`Board`].
//!
//! # Example
//!
//! ```rust
//! use orc_hal::sim::{SimBoard, SimLink};
//! use orc_hal::link::LinkSettings;
//!
//! let link = SimLink::new();
//! let board = SimBoard::new().with_link(link.clone()).build();
//!
//! link.set_link_up(false);
//! assert!(!board.link.link_is_up());
//! assert!(board.link.configure(&LinkSettings::Dhcp).is_err());
//! ```

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use orc_types::{IndicatorColor, OrcError, Rail, WallClock};
use parking_lot::Mutex;

use crate::board::Board;
use crate::indicator::{INDICATOR_COUNT, IndicatorDriver};
use crate::link::{LinkLayer, LinkSettings};
use crate::rails::RailSensor;
use crate::rtc::RealTimeClock;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::time_source::TimeSource;

// ────────────────────────────────────────────────────────────────────────────
// Simulated real-time clock
// ────────────────────────────────────────────────────────────────────────────

struct RtcState {
    base: WallClock,
    set_at: Instant,
    ticking: bool,
    ignore_writes: u32,
    fail_reads: u32,
    writes: u32,
}

/// A simulated RTC chip.
///
/// A *ticking* clock advances with host time from the last write; a *frozen*
/// clock always reads back exactly what was last written.  Faults can be
/// injected: writes that silently do not take effect, and failing reads.
#[derive(Clone)]
pub struct SimRtc {
    state: Arc<Mutex<RtcState>>,
}

impl SimRtc {
    fn with(start: WallClock, ticking: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(RtcState {
                base: start,
                set_at: Instant::now(),
                ticking,
                ignore_writes: 0,
                fail_reads: 0,
                writes: 0,
            })),
        }
    }

    /// A clock that advances in real time from `start`.
    pub fn ticking(start: WallClock) -> Self {
        Self::with(start, true)
    }

    /// A clock that never advances on its own.
    pub fn frozen(start: WallClock) -> Self {
        Self::with(start, false)
    }

    /// The next `n` writes complete on the bus but do not change the time.
    pub fn ignore_next_writes(&self, n: u32) {
        self.state.lock().ignore_writes = n;
    }

    /// The next `n` reads fail.
    pub fn fail_next_reads(&self, n: u32) {
        self.state.lock().fail_reads = n;
    }

    /// Change the time behind the driver's back (drift, battery swap).
    pub fn set_now(&self, value: WallClock) {
        let mut s = self.state.lock();
        s.base = value;
        s.set_at = Instant::now();
    }

    /// Number of write transactions so far, effective or not.
    pub fn write_count(&self) -> u32 {
        self.state.lock().writes
    }
}

impl RealTimeClock for SimRtc {
    fn write(&self, value: &WallClock) -> Result<(), OrcError> {
        let mut s = self.state.lock();
        s.writes += 1;
        if s.ignore_writes > 0 {
            s.ignore_writes -= 1;
            return Ok(());
        }
        s.base = *value;
        s.set_at = Instant::now();
        Ok(())
    }

    fn read(&self) -> Result<WallClock, OrcError> {
        let mut s = self.state.lock();
        if s.fail_reads > 0 {
            s.fail_reads -= 1;
            return Err(OrcError::fault("rtc", "simulated i2c read failure"));
        }
        if !s.ticking {
            return Ok(s.base);
        }
        let elapsed = s.set_at.elapsed().as_secs() as i64;
        WallClock::from_epoch_seconds(s.base.to_epoch_seconds() + elapsed)
            .map_err(|e| OrcError::fault("rtc", e.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated Ethernet link
// ────────────────────────────────────────────────────────────────────────────

/// Address handed out by the simulated DHCP server.
pub const SIM_DHCP_LEASE: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 57);

/// `configure` requests kept by [`SimLink::history`]; older ones are dropped.
pub const LINK_HISTORY_LIMIT: usize = 64;

struct LinkState {
    up: bool,
    dhcp_available: bool,
    static_fails: bool,
    address: Option<Ipv4Addr>,
    hostname: String,
    history: VecDeque<LinkSettings>,
    releases: u32,
}

/// A simulated Ethernet PHY + IP stack.
///
/// DHCP needs carrier and an available server; static configuration
/// succeeds unless told to fail.
#[derive(Clone)]
pub struct SimLink {
    state: Arc<Mutex<LinkState>>,
    mac: [u8; 6],
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new()
    }
}

impl SimLink {
    /// Link up, DHCP server present.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LinkState {
                up: true,
                dhcp_available: true,
                static_fails: false,
                address: None,
                hostname: String::new(),
                history: VecDeque::with_capacity(LINK_HISTORY_LIMIT),
                releases: 0,
            })),
            mac: [0x02, 0x4F, 0x52, 0x43, 0x00, 0x01],
        }
    }

    pub fn set_link_up(&self, up: bool) {
        let mut s = self.state.lock();
        s.up = up;
        if !up {
            s.address = None;
        }
    }

    pub fn set_dhcp_available(&self, available: bool) {
        self.state.lock().dhcp_available = available;
    }

    pub fn set_static_fails(&self, fails: bool) {
        self.state.lock().static_fails = fails;
    }

    /// The most recent `configure` requests, oldest first, successful or
    /// not.  At most [`LINK_HISTORY_LIMIT`] are kept.
    pub fn history(&self) -> Vec<LinkSettings> {
        self.state.lock().history.iter().cloned().collect()
    }

    pub fn release_count(&self) -> u32 {
        self.state.lock().releases
    }

    pub fn hostname(&self) -> String {
        self.state.lock().hostname.clone()
    }
}

impl LinkLayer for SimLink {
    fn link_is_up(&self) -> bool {
        self.state.lock().up
    }

    fn configure(&self, settings: &LinkSettings) -> Result<(), OrcError> {
        let mut s = self.state.lock();
        if s.history.len() == LINK_HISTORY_LIMIT {
            s.history.pop_front();
        }
        s.history.push_back(settings.clone());
        match settings {
            LinkSettings::Dhcp => {
                if !s.up {
                    return Err(OrcError::fault("eth", "no carrier"));
                }
                if !s.dhcp_available {
                    return Err(OrcError::fault("eth", "no DHCP offer"));
                }
                s.address = Some(SIM_DHCP_LEASE);
            }
            LinkSettings::Static { address, .. } => {
                if s.static_fails {
                    return Err(OrcError::fault("eth", "stack rejected static address"));
                }
                s.address = Some(*address);
            }
        }
        Ok(())
    }

    fn release(&self) {
        let mut s = self.state.lock();
        s.address = None;
        s.releases += 1;
    }

    fn set_hostname(&self, hostname: &str) -> Result<(), OrcError> {
        self.state.lock().hostname = hostname.to_string();
        Ok(())
    }

    fn local_address(&self) -> Option<Ipv4Addr> {
        self.state.lock().address
    }

    fn mac_address(&self) -> [u8; 6] {
        self.mac
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated time server
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum TimeMode {
    Fixed(i64),
    System,
    Unreachable,
}

struct TimeState {
    mode: TimeMode,
    fail_next: u32,
    fetches: u32,
    last_server: Option<String>,
}

/// A simulated time server.
#[derive(Clone)]
pub struct SimTimeSource {
    state: Arc<Mutex<TimeState>>,
}

impl SimTimeSource {
    fn with(mode: TimeMode) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimeState {
                mode,
                fail_next: 0,
                fetches: 0,
                last_server: None,
            })),
        }
    }

    /// Always answers `epoch`.
    pub fn fixed(epoch: i64) -> Self {
        Self::with(TimeMode::Fixed(epoch))
    }

    /// Answers with the host's clock.
    pub fn system() -> Self {
        Self::with(TimeMode::System)
    }

    /// Never answers.
    pub fn unreachable() -> Self {
        Self::with(TimeMode::Unreachable)
    }

    pub fn set_epoch(&self, epoch: i64) {
        self.state.lock().mode = TimeMode::Fixed(epoch);
    }

    pub fn set_unreachable(&self) {
        self.state.lock().mode = TimeMode::Unreachable;
    }

    /// The next `n` fetches fail, then normal service resumes.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().fail_next = n;
    }

    /// Number of fetch attempts so far.
    pub fn fetch_count(&self) -> u32 {
        self.state.lock().fetches
    }

    /// Server named by the most recent fetch.
    pub fn last_server(&self) -> Option<String> {
        self.state.lock().last_server.clone()
    }
}

impl TimeSource for SimTimeSource {
    fn fetch_epoch_seconds(&self, server: &str) -> Result<i64, OrcError> {
        let mut s = self.state.lock();
        s.fetches += 1;
        s.last_server = Some(server.to_string());
        if s.fail_next > 0 {
            s.fail_next -= 1;
            return Err(OrcError::RemoteSyncFailure("simulated timeout".to_string()));
        }
        match s.mode {
            TimeMode::Fixed(epoch) => Ok(epoch),
            TimeMode::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .map_err(|e| OrcError::RemoteSyncFailure(e.to_string())),
            TimeMode::Unreachable => {
                Err(OrcError::RemoteSyncFailure("simulated timeout".to_string()))
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated rail feedback
// ────────────────────────────────────────────────────────────────────────────

struct RailState {
    volts: [f32; 3],
    reads: u32,
    failing: bool,
}

/// Simulated rail feedback returning whatever voltages were last set.
#[derive(Clone)]
pub struct SimRails {
    state: Arc<Mutex<RailState>>,
}

impl Default for SimRails {
    fn default() -> Self {
        Self::nominal()
    }
}

impl SimRails {
    /// 24 V / 20 V / 5 V.
    pub fn nominal() -> Self {
        Self {
            state: Arc::new(Mutex::new(RailState {
                volts: [24.0, 20.0, 5.0],
                reads: 0,
                failing: false,
            })),
        }
    }

    pub fn set_volts(&self, rail: Rail, volts: f32) {
        self.state.lock().volts[rail.index()] = volts;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn read_count(&self) -> u32 {
        self.state.lock().reads
    }
}

impl RailSensor for SimRails {
    fn read_volts(&mut self, rail: Rail) -> Result<f32, OrcError> {
        let mut s = self.state.lock();
        if s.failing {
            return Err(OrcError::fault("adc", "simulated conversion failure"));
        }
        s.reads += 1;
        Ok(s.volts[rail.index()])
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated indicator strip
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct IndicatorState {
    last: Option<[IndicatorColor; INDICATOR_COUNT]>,
    frames: u32,
}

/// Simulated status strip that remembers the last frame shown.
#[derive(Clone, Default)]
pub struct SimIndicator {
    state: Arc<Mutex<IndicatorState>>,
}

impl SimIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<[IndicatorColor; INDICATOR_COUNT]> {
        self.state.lock().last
    }

    pub fn frame_count(&self) -> u32 {
        self.state.lock().frames
    }
}

impl IndicatorDriver for SimIndicator {
    fn show(&mut self, colors: &[IndicatorColor; INDICATOR_COUNT]) -> Result<(), OrcError> {
        let mut s = self.state.lock();
        s.last = Some(*colors);
        s.frames += 1;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimBoard builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder that assembles a [`Board`] from simulated drivers.
///
/// Every driver defaults to a healthy simulator; call the `with_*` methods
/// to substitute a handle the test keeps a clone of.
pub struct SimBoard {
    rtc: Arc<dyn RealTimeClock>,
    link: Arc<dyn LinkLayer>,
    store: Box<dyn KeyValueStore>,
    time_source: Arc<dyn TimeSource>,
    rails: Box<dyn RailSensor>,
    indicator: Box<dyn IndicatorDriver>,
}

impl Default for SimBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBoard {
    /// Ticking RTC starting from [`WallClock::RTC_RESET`], link up, blank
    /// memory store, host-clock time server, nominal rails.
    pub fn new() -> Self {
        Self {
            rtc: Arc::new(SimRtc::ticking(WallClock::RTC_RESET)),
            link: Arc::new(SimLink::new()),
            store: Box::new(MemoryStore::new()),
            time_source: Arc::new(SimTimeSource::system()),
            rails: Box::new(SimRails::nominal()),
            indicator: Box::new(SimIndicator::new()),
        }
    }

    pub fn with_rtc(mut self, rtc: SimRtc) -> Self {
        self.rtc = Arc::new(rtc);
        self
    }

    pub fn with_link(mut self, link: SimLink) -> Self {
        self.link = Arc::new(link);
        self
    }

    /// Any store, e.g. a [`FileStore`][crate::storage::FileStore] so the
    /// simulated device keeps its configuration across runs.
    pub fn with_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    /// Any time source, e.g. a real [`SntpClient`][crate::time_source::SntpClient].
    pub fn with_time_source(mut self, source: Arc<dyn TimeSource>) -> Self {
        self.time_source = source;
        self
    }

    pub fn with_rails(mut self, rails: SimRails) -> Self {
        self.rails = Box::new(rails);
        self
    }

    pub fn with_indicator(mut self, indicator: SimIndicator) -> Self {
        self.indicator = Box::new(indicator);
        self
    }

    /// Consume the builder and return the assembled [`Board`].
    pub fn build(self) -> Board {
        Board {
            rtc: self.rtc,
            link: self.link,
            store: self.store,
            time_source: self.time_source,
            rails: self.rails,
            indicator: self.indicator,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
