//! Reopening an unplugged blink(1) with exponential backoff.
//!
//! The poll loop drops its device handle on the first write error and
//! calls [`try_reconnect_and_refresh`] on every tick until it gets one back.
//! The state to show is passed in, not read back from the indicator, so a
//! refresh that fails halfway cannot lose it.

use std::time::{Duration, Instant};

use crate::device::{self, PlatformDevice, StatusLight, open_device_by_serial};
use crate::led::{self, WatchdogWindow};
use crate::monitor::{IndicatorState, StatusIndicator};
use crate::protocol::PatternLine;

#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub factor: u32,
}

impl Default for Backoff {
    /// 1 s doubling up to 30 s.
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2,
        }
    }
}

/// Tracks when the next reopen attempt is due.
#[derive(Debug)]
pub struct ReconnectState {
    backoff: Backoff,
    delay: Duration,
    next_attempt: Option<Instant>,
    failures: u32,
}

impl ReconnectState {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            delay: backoff.initial,
            backoff,
            next_attempt: None,
            failures: 0,
        }
    }

    /// Due immediately until the first failure.
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_attempt.is_none_or(|at| now >= at)
    }

    pub fn record_failure(&mut self, now: Instant) {
        self.failures += 1;
        self.next_attempt = Some(now + self.delay);
        self.delay = (self.delay * self.backoff.factor).min(self.backoff.max);
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.delay = self.backoff.initial;
        self.next_attempt = None;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Wait applied after the next failure.
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for ReconnectState {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}

/// Try to reopen the device if an attempt is due.
///
/// `device_serial` empty = first device found.
pub fn try_reopen(state: &mut ReconnectState, device_serial: &str) -> Option<PlatformDevice> {
    try_reopen_with(state, || open_device_by_serial(device_serial))
}

/// [`try_reopen`] with a caller-supplied opener.
pub fn try_reopen_with<D>(
    state: &mut ReconnectState,
    open: impl FnOnce() -> device::Result<D>,
) -> Option<D> {
    let now = Instant::now();
    if !state.is_due(now) {
        return None;
    }
    match open() {
        Ok(dev) => {
            if state.failures() > 0 {
                log::info!("blink(1) reconnected after {} attempt(s)", state.failures());
            }
            state.record_success();
            Some(dev)
        }
        Err(e) => {
            state.record_failure(now);
            log::warn!(
                "reconnect failed: {e} (attempt {}, next in {:.0}s)",
                state.failures(),
                state
                    .next_attempt
                    .map_or(0.0, |at| at.saturating_duration_since(now).as_secs_f64())
            );
            None
        }
    }
}

/// Reopen the device, rewrite the watchdog pattern and show `wanted`.
///
/// On success the indicator records `wanted` as shown. A failed refresh
/// drops the new handle; the next attempt starts over.
pub fn try_reconnect_and_refresh<D: StatusLight>(
    state: &mut ReconnectState,
    open: impl FnOnce() -> device::Result<D>,
    indicator: &mut StatusIndicator,
    wanted: IndicatorState,
    pattern: &[PatternLine],
) -> Option<(D, WatchdogWindow)> {
    let dev = try_reopen_with(state, open)?;
    match led::refresh_after_reconnect(
        &dev,
        indicator.palette(),
        Some(wanted),
        indicator.fade_ms(),
        pattern,
    ) {
        Ok(window) => {
            indicator.force_refresh();
            indicator.update(wanted);
            Some((dev, window))
        }
        Err(e) => {
            log::warn!("could not restore the light after reconnect: {e}");
            indicator.force_refresh();
            None
        }
    }
}
