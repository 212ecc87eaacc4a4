//! Fixed-rate cadence for Tandem.
//!
//! A session samples local input and sends it to the peer at a fixed rate
//! (20 Hz by default). The game loop runs at whatever rate the frame
//! budget allows, so instead of sleeping, [`Cadence`] is *polled*: each
//! frame the owner passes the current instant to [`Cadence::poll`] and
//! gets `Some(TickInfo)` when a send is due.
//!
//! Time is always passed in, never read, so the cadence is deterministic
//! under test.
//!
//! ```ignore
//! // once per frame
//! if let Some(tick) = cadence.poll(Instant::now()) {
//!     let input = input_source.poll_input();
//!     transport.send(&Message::Input(input))?;
//! }
//! ```
//!
//! # Disabled mode
//!
//! A rate of 0 disables the cadence: `poll` never fires.

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when `poll` is called long after a tick was due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Fire once and schedule the next tick a full interval from now.
    /// Missed ticks are counted, never replayed.
    #[default]
    Skip,
    /// Fire once and keep the original phase: the next tick lands on the
    /// first slot of the original schedule that is still in the future.
    Drop,
}

/// Configuration for a [`Cadence`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Ticks per second. 0 disables the cadence.
    pub tick_rate_hz: u32,
    /// Handling of late polls.
    pub policy: TickPolicy,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 0,
            policy: TickPolicy::default(),
        }
    }
}

impl TickConfig {
    /// Maximum supported tick rate.
    pub const MAX_TICK_RATE_HZ: u32 = 128;

    /// Config for a specific rate with the default policy.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self {
            tick_rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values so the config is safe to use.
    ///
    /// Called by [`Cadence::new`]. `tick_rate_hz` is capped to
    /// [`Self::MAX_TICK_RATE_HZ`]; 0 stays 0.
    pub fn validated(mut self) -> Self {
        if self.tick_rate_hz > Self::MAX_TICK_RATE_HZ {
            warn!(
                rate = self.tick_rate_hz,
                max = Self::MAX_TICK_RATE_HZ,
                "tick_rate_hz exceeds maximum, clamping"
            );
            self.tick_rate_hz = Self::MAX_TICK_RATE_HZ;
        }
        self
    }

    /// Interval between ticks, or `None` when disabled.
    pub fn tick_duration(&self) -> Option<Duration> {
        if self.tick_rate_hz == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / self.tick_rate_hz as f64))
        }
    }
}

// ---------------------------------------------------------------------------
// Tick info and metrics
// ---------------------------------------------------------------------------

/// A tick that fired, returned by [`Cadence::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickInfo {
    /// Monotonically increasing tick number, starting at 1.
    pub tick: u64,
    /// The fixed interval.
    pub dt: Duration,
    /// `true` if at least one whole interval was missed before this poll.
    pub overrun: bool,
    /// How many scheduled ticks were missed and not fired.
    pub ticks_skipped: u64,
}

/// Counters kept across the cadence's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickMetrics {
    /// Ticks fired.
    pub total_ticks: u64,
    /// Polls that arrived more than one interval late.
    pub total_overruns: u64,
    /// Scheduled ticks that were never fired.
    pub total_skipped: u64,
}

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

/// A polled fixed-rate timer.
///
/// The first poll after creation, [`resume`](Self::resume) or
/// [`reset`](Self::reset) fires immediately; later ticks are spaced by
/// the configured interval.
#[derive(Debug)]
pub struct Cadence {
    config: TickConfig,
    interval: Option<Duration>,
    /// When the next tick is due. `None` means "fire on the next poll".
    next_due: Option<Instant>,
    tick_count: u64,
    paused: bool,
    metrics: TickMetrics,
}

impl Cadence {
    /// Creates a cadence from config.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let interval = config.tick_duration();
        match interval {
            Some(interval) => debug!(
                rate_hz = config.tick_rate_hz,
                interval_ms = interval.as_secs_f64() * 1000.0,
                policy = ?config.policy,
                "cadence created"
            ),
            None => debug!("cadence created disabled"),
        }
        Self {
            config,
            interval,
            next_due: None,
            tick_count: 0,
            paused: false,
            metrics: TickMetrics::default(),
        }
    }

    /// A cadence at `tick_rate_hz` with the default policy.
    pub fn with_rate(tick_rate_hz: u32) -> Self {
        Self::new(TickConfig::with_rate(tick_rate_hz))
    }

    /// Returns `Some` if a tick is due at `now`.
    ///
    /// Fires at most once per call, however late the call is. Returns
    /// `None` while paused or disabled.
    pub fn poll(&mut self, now: Instant) -> Option<TickInfo> {
        if self.paused {
            return None;
        }
        let interval = self.interval?;

        let (overrun, ticks_skipped, next_due) = match self.next_due {
            None => (false, 0, now + interval),
            Some(due) if now < due => return None,
            Some(due) => {
                let late_by = now.duration_since(due);
                let missed = (late_by.as_nanos() / interval.as_nanos()) as u64;
                let next_due = match self.config.policy {
                    TickPolicy::Skip => now + interval,
                    TickPolicy::Drop => {
                        let slots = u32::try_from(missed).unwrap_or(u32::MAX).saturating_add(1);
                        due + interval.saturating_mul(slots)
                    }
                };
                (missed > 0, missed, next_due)
            }
        };

        self.next_due = Some(next_due);
        self.tick_count += 1;
        self.metrics.total_ticks += 1;
        self.metrics.total_skipped += ticks_skipped;
        if overrun {
            self.metrics.total_overruns += 1;
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                "cadence polled late, skipping missed ticks"
            );
        }
        trace!(tick = self.tick_count, "tick fired");

        Some(TickInfo {
            tick: self.tick_count,
            dt: interval,
            overrun,
            ticks_skipped,
        })
    }

    /// Stops firing until [`resume`](Self::resume). Idempotent.
    pub fn pause(&mut self) {
        if !self.paused {
            self.paused = true;
            debug!(tick = self.tick_count, "cadence paused");
        }
    }

    /// Resumes after a pause. The next poll fires immediately, and no
    /// ticks are counted as skipped for the time spent paused.
    pub fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.next_due = None;
            debug!(tick = self.tick_count, "cadence resumed");
        }
    }

    /// Forgets the schedule so the next poll fires immediately. Tick
    /// numbering and metrics are kept.
    pub fn reset(&mut self) {
        self.next_due = None;
    }

    /// Whether the cadence is paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether the rate is 0.
    pub fn is_disabled(&self) -> bool {
        self.interval.is_none()
    }

    /// Ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// The configured rate in Hz.
    pub fn tick_rate_hz(&self) -> u32 {
        self.config.tick_rate_hz
    }

    /// The interval between ticks, or `None` when disabled.
    pub fn tick_duration(&self) -> Option<Duration> {
        self.interval
    }

    /// When the next tick is due, if scheduled.
    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Counters since creation.
    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }
}
