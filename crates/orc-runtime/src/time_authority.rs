//! [`TimeAuthority`] – owner of the canonical wall clock.
//!
//! Three sources feed the clock:
//!
//! 1. the hardware RTC, re-read periodically by the monitoring context
//!    ([`TimeAuthority::periodic_sample`]);
//! 2. explicit writes from the API ([`TimeAuthority::commit`]), which are
//!    only accepted once the RTC reads the new value back;
//! 3. a remote time server ([`TimeAuthority::sync_from_remote`]), rate
//!    limited and gated on the live configuration and the link.
//!
//! The canonical value is a [`SharedRecord`]; a commit holds its lock for
//! the whole write-verify loop, so readers either see the old value or the
//! verified new one.

use std::sync::Arc;
use std::time::Instant;

use orc_hal::{LinkLayer, RealTimeClock, TimeSource};
use orc_kernel::{RetryPolicy, SharedRecord};
use orc_types::{NetworkConfig, OrcError, WallClock};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::settings::TimeSyncSettings;

const DST_OFFSET_SECS: i64 = 3600;

// ────────────────────────────────────────────────────────────────────────────
// Sync outcomes
// ────────────────────────────────────────────────────────────────────────────

/// Why a remote sync did not contact the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NtpDisabled,
    /// The resync interval has not elapsed and the sync was not forced.
    NotDue,
    /// Inside the hard minimum interval; applies to forced syncs too.
    RateLimited,
    LinkDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The clock now holds this value.
    Synced(WallClock),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, Default)]
struct SyncBookkeeping {
    last_attempt: Option<Instant>,
    last_success: Option<Instant>,
}

/// Seconds since the last remote sync attempt and success, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub secs_since_attempt: Option<u64>,
    pub secs_since_success: Option<u64>,
}

// ────────────────────────────────────────────────────────────────────────────
// TimeAuthority
// ────────────────────────────────────────────────────────────────────────────

pub struct TimeAuthority {
    clock: SharedRecord<WallClock>,
    sync: SharedRecord<SyncBookkeeping>,
    config: Arc<SharedRecord<NetworkConfig>>,
    rtc: Arc<dyn RealTimeClock>,
    link: Arc<dyn LinkLayer>,
    source: Arc<dyn TimeSource>,
    settings: TimeSyncSettings,
}

impl TimeAuthority {
    /// The canonical value starts at [`WallClock::RTC_RESET`] until
    /// [`initialize_from_hardware`](Self::initialize_from_hardware) runs.
    pub fn new(
        rtc: Arc<dyn RealTimeClock>,
        link: Arc<dyn LinkLayer>,
        source: Arc<dyn TimeSource>,
        config: Arc<SharedRecord<NetworkConfig>>,
        settings: TimeSyncSettings,
    ) -> Self {
        Self {
            clock: SharedRecord::new("wall_clock", WallClock::RTC_RESET),
            sync: SharedRecord::new("time_sync", SyncBookkeeping::default()),
            config,
            rtc,
            link,
            source,
            settings,
        }
    }

    /// First authoritative read of the RTC at boot.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::FatalInitFailure`] if the RTC cannot be read or
    /// the clock record cannot be written.
    pub fn initialize_from_hardware(&self) -> Result<WallClock, OrcError> {
        let now = self.rtc.read().map_err(|e| {
            error!(error = %e, "initial RTC read failed");
            OrcError::FatalInitFailure(format!("initial RTC read failed: {e}"))
        })?;
        self.clock
            .replace(now)
            .map_err(|e| OrcError::FatalInitFailure(e.to_string()))?;
        info!(time = %now, "clock initialised from RTC");
        Ok(now)
    }

    /// Snapshot of the canonical clock.
    ///
    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn read(&self) -> Result<WallClock, OrcError> {
        self.clock.snapshot()
    }

    /// Write `value` to the RTC and, once it reads back identically, make it
    /// the canonical value.
    ///
    /// # Errors
    ///
    /// - [`OrcError::LockTimeout`] if the clock record is busy.
    /// - [`OrcError::HardwareVerifyFailure`] if no attempt read back the
    ///   written value; the canonical value is unchanged.
    pub fn commit(&self, value: WallClock) -> Result<(), OrcError> {
        let policy = RetryPolicy::new(
            self.settings.commit_attempts,
            self.settings.commit_retry_delay(),
        );
        self.clock.with(|canonical| {
            policy
                .run(|attempt| {
                    self.rtc.write(&value)?;
                    let back = self.rtc.read()?;
                    if back == value {
                        Ok(())
                    } else {
                        warn!(attempt, wrote = %value, read = %back, "RTC read-back mismatch");
                        Err(OrcError::fault("rtc", format!("read back {back}, expected {value}")))
                    }
                })
                .map(|()| {
                    *canonical = value;
                    info!(time = %value, "clock committed");
                })
                .map_err(|e| {
                    error!(attempts = e.attempts, error = %e.last, "clock commit failed");
                    OrcError::HardwareVerifyFailure {
                        component: "rtc".to_string(),
                        attempts: e.attempts,
                        details: e.last.to_string(),
                    }
                })
        })?
    }

    /// Refresh the canonical value from the RTC.
    ///
    /// # Errors
    ///
    /// Returns the RTC error (cache untouched) or [`OrcError::LockTimeout`]
    /// when the record was busy (sample skipped).
    pub fn periodic_sample(&self) -> Result<WallClock, OrcError> {
        let now = self.rtc.read().inspect_err(|e| {
            warn!(error = %e, "RTC sample failed");
        })?;
        self.clock.with(|canonical| *canonical = now)?;
        Ok(now)
    }

    /// Fetch UTC from the remote source, shift it to local time and commit
    /// it.  See [`SkipReason`] for when the server is not contacted.
    ///
    /// # Errors
    ///
    /// - [`OrcError::RemoteSyncFailure`] when every fetch attempt failed or
    ///   the server's time is outside the clock's range.
    /// - Any [`commit`](Self::commit) error.
    /// - [`OrcError::LockTimeout`] if the configuration or bookkeeping
    ///   record is busy.
    pub fn sync_from_remote(&self, force: bool) -> Result<SyncOutcome, OrcError> {
        let config = self.config.snapshot()?;
        if !config.ntp_enabled {
            return Ok(SyncOutcome::Skipped(SkipReason::NtpDisabled));
        }

        let desired = self.settings.resync_interval();
        let minimum = self.settings.min_interval();
        let gate = self.sync.with(|book| {
            if let Some(last) = book.last_attempt {
                let elapsed = last.elapsed();
                if !force && elapsed <= desired {
                    return Some(SkipReason::NotDue);
                }
                if elapsed < minimum {
                    return Some(SkipReason::RateLimited);
                }
            }
            if !self.link.link_is_up() {
                return Some(SkipReason::LinkDown);
            }
            book.last_attempt = Some(Instant::now());
            None
        })?;
        if let Some(reason) = gate {
            debug!(?reason, force, "remote sync skipped");
            return Ok(SyncOutcome::Skipped(reason));
        }

        let policy = RetryPolicy::new(
            1 + self.settings.fetch_retries,
            self.settings.fetch_retry_delay(),
        );
        let utc = policy
            .run(|attempt| {
                self.source.fetch_epoch_seconds(&config.ntp_server).inspect_err(|e| {
                    debug!(attempt, server = %config.ntp_server, error = %e, "time fetch failed");
                })
            })
            .map_err(|e| {
                warn!(attempts = e.attempts, error = %e.last, "remote time unavailable");
                OrcError::RemoteSyncFailure(format!(
                    "{} after {} attempt(s): {}",
                    config.ntp_server, e.attempts, e.last
                ))
            })?;

        let mut local = utc + config.timezone.seconds();
        if config.dst_enabled {
            local += DST_OFFSET_SECS;
        }
        let value = WallClock::from_epoch_seconds(local)
            .map_err(|e| OrcError::RemoteSyncFailure(format!("server time unusable: {e}")))?;

        self.commit(value)?;
        self.sync.with(|book| book.last_success = Some(Instant::now()))?;
        info!(time = %value, tz = %config.timezone, dst = config.dst_enabled, "clock synced from remote");
        Ok(SyncOutcome::Synced(value))
    }

    /// # Errors
    ///
    /// Returns [`OrcError::LockTimeout`] on contention.
    pub fn sync_report(&self) -> Result<SyncReport, OrcError> {
        let book = self.sync.snapshot()?;
        Ok(SyncReport {
            secs_since_attempt: book.last_attempt.map(|t| t.elapsed().as_secs()),
            secs_since_success: book.last_success.map(|t| t.elapsed().as_secs()),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
