//! Integration tests for the polled cadence.
//!
//! Every test drives time explicitly from a fixed origin, so results do
//! not depend on how fast the machine is.

use std::time::{Duration, Instant};

use tandem_tick::{Cadence, TickConfig, TickPolicy};

// =========================================================================
// Helpers
// =========================================================================

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Polls every `step` from `start` until `end` (exclusive), returning how
/// many ticks fired.
fn count_ticks(cadence: &mut Cadence, start: Instant, end: Duration, step: Duration) -> usize {
    let mut fired = 0;
    let mut t = Duration::ZERO;
    while t < end {
        if cadence.poll(start + t).is_some() {
            fired += 1;
        }
        t += step;
    }
    fired
}

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_with_rate_20hz_is_50ms() {
    assert_eq!(TickConfig::with_rate(20).tick_duration(), Some(ms(50)));
}

#[test]
fn test_default_config_is_disabled() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.tick_rate_hz, 0);
    assert_eq!(cfg.tick_duration(), None);
}

// =========================================================================
// Firing
// =========================================================================

#[test]
fn test_first_poll_fires_immediately() {
    let t0 = Instant::now();
    let mut cadence = Cadence::with_rate(20);

    let tick = cadence.poll(t0).unwrap();
    assert_eq!(tick.tick, 1);
    assert_eq!(tick.dt, ms(50));
    assert!(!tick.overrun);
    assert_eq!(cadence.next_due(), Some(t0 + ms(50)));
}

#[test]
fn test_poll_before_due_returns_none() {
    let t0 = Instant::now();
    let mut cadence = Cadence::with_rate(20);
    cadence.poll(t0).unwrap();

    assert!(cadence.poll(t0 + ms(10)).is_none());
    assert!(cadence.poll(t0 + ms(49)).is_none());
    assert!(cadence.poll(t0 + ms(50)).is_some());
}

#[test]
fn test_frequent_polling_fires_at_configured_rate() {
    let t0 = Instant::now();
    let mut cadence = Cadence::with_rate(20);

    // One second polled every 5 ms: ticks at 0, 50, ..., 950.
    let fired = count_ticks(&mut cadence, t0, ms(1000), ms(5));
    assert_eq!(fired, 20);
    assert_eq!(cadence.tick_count(), 20);
    assert_eq!(cadence.metrics().total_overruns, 0);
}

#[test]
fn test_disabled_cadence_never_fires() {
    let t0 = Instant::now();
    let mut cadence = Cadence::with_rate(0);
    assert!(cadence.is_disabled());
    assert_eq!(count_ticks(&mut cadence, t0, ms(500), ms(10)), 0);
}

// =========================================================================
// Late polls
// =========================================================================

#[test]
fn test_late_poll_fires_once_and_counts_skipped() {
    let t0 = Instant::now();
    let mut cadence = Cadence::with_rate(20);
    cadence.poll(t0).unwrap();

    // Due at 50; polled at 180, so the 100 and 150 slots were missed.
    let tick = cadence.poll(t0 + ms(180)).unwrap();
    assert!(tick.overrun);
    assert_eq!(tick.ticks_skipped, 2);
    assert!(cadence.poll(t0 + ms(181)).is_none());

    let metrics = cadence.metrics();
    assert_eq!(metrics.total_ticks, 2);
    assert_eq!(metrics.total_overruns, 1);
    assert_eq!(metrics.total_skipped, 2);
}

#[test]
fn test_skip_policy_reschedules_from_now() {
    let t0 = Instant::now();
    let mut cadence = Cadence::with_rate(20);
    cadence.poll(t0).unwrap();
    cadence.poll(t0 + ms(180)).unwrap();
    assert_eq!(cadence.next_due(), Some(t0 + ms(230)));
}

#[test]
fn test_drop_policy_keeps_original_phase() {
    let t0 = Instant::now();
    let mut cadence = Cadence::new(TickConfig {
        tick_rate_hz: 20,
        policy: TickPolicy::Drop,
    });
    cadence.poll(t0).unwrap();
    cadence.poll(t0 + ms(180)).unwrap();
    assert_eq!(cadence.next_due(), Some(t0 + ms(200)));
}

#[test]
fn test_slightly_late_poll_is_not_an_overrun() {
    let t0 = Instant::now();
    let mut cadence = Cadence::with_rate(20);
    cadence.poll(t0).unwrap();

    let tick = cadence.poll(t0 + ms(70)).unwrap();
    assert!(!tick.overrun);
    assert_eq!(tick.ticks_skipped, 0);
}

// =========================================================================
// Pause / resume / reset
// =========================================================================

#[test]
fn test_paused_cadence_does_not_fire() {
    let t0 = Instant::now();
    let mut cadence = Cadence::with_rate(20);
    cadence.pause();
    cadence.pause();
    assert!(cadence.is_paused());
    assert_eq!(count_ticks(&mut cadence, t0, ms(500), ms(10)), 0);
}

#[test]
fn test_resume_fires_immediately_without_counting_pause_as_skipped() {
    let t0 = Instant::now();
    let mut cadence = Cadence::with_rate(20);
    cadence.poll(t0).unwrap();
    cadence.pause();

    cadence.resume();
    let tick = cadence.poll(t0 + ms(5000)).unwrap();
    assert_eq!(tick.ticks_skipped, 0);
    assert!(!tick.overrun);
    assert_eq!(tick.tick, 2);
}

#[test]
fn test_reset_fires_on_next_poll() {
    let t0 = Instant::now();
    let mut cadence = Cadence::with_rate(20);
    cadence.poll(t0).unwrap();
    assert!(cadence.poll(t0 + ms(1)).is_none());

    cadence.reset();
    assert!(cadence.poll(t0 + ms(2)).is_some());
    assert_eq!(cadence.tick_count(), 2);
}
