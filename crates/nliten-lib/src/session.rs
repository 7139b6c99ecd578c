//! A monitor's hold on the light between polls.
//!
//! [`LightSession`] owns the device handle, keeps the watchdog fed while
//! waiting and while the API is being polled, drops the handle on the first
//! device error and reopens it with backoff.

use std::time::{Duration, Instant};

use crate::api::SystemSource;
use crate::device::{self, DeviceError, StatusLight};
use crate::led::{self, WatchdogWindow};
use crate::monitor::{
    HealthReport, IndicatorState, MonitorAction, StatusIndicator, check_health_with,
    tickle_interval,
};
use crate::protocol::PatternLine;
use crate::reconnect::{Backoff, ReconnectState, try_reconnect_and_refresh};
use crate::shutdown::Shutdown;

/// How often to check for a replugged device while disconnected.
pub const RECONNECT_CHECK: Duration = Duration::from_secs(1);

/// Opens a fresh handle after the old one failed.
pub type Opener<D> = Box<dyn FnMut() -> device::Result<D>>;

pub struct LightSession<D: StatusLight> {
    device: Option<D>,
    open: Opener<D>,
    window: WatchdogWindow,
    indicator: StatusIndicator,
    /// Latest state from the API, kept while the device is gone.
    wanted: IndicatorState,
    pattern: Vec<PatternLine>,
    reconnect: ReconnectState,
    watchdog_ms: u32,
}

impl<D: StatusLight> LightSession<D> {
    /// Show Startup, write the watchdog pattern and arm the watchdog.
    pub fn start(
        device: D,
        open: Opener<D>,
        mut indicator: StatusIndicator,
        pattern: Vec<PatternLine>,
        watchdog_ms: u32,
    ) -> device::Result<Self> {
        if let (_, Some(e)) = indicator.poll_and_apply(IndicatorState::Startup, &device) {
            return Err(e);
        }

        let window = led::write_watchdog_pattern(&device, &pattern)?;
        if log::log_enabled!(log::Level::Debug) {
            match led::read_pattern(&device, window) {
                Ok(lines) => {
                    for (i, line) in lines.iter().enumerate() {
                        log::debug!(
                            "[watchdog] line {i}: {} over {} ms",
                            led::format_color(line.color),
                            line.fade_ms
                        );
                    }
                }
                Err(e) => log::debug!("[watchdog] could not read the pattern back: {e}"),
            }
        }
        led::poke_watchdog(&device, watchdog_ms, window)?;

        Ok(Self {
            device: Some(device),
            open,
            window,
            indicator,
            wanted: IndicatorState::Startup,
            pattern,
            reconnect: ReconnectState::default(),
            watchdog_ms,
        })
    }

    /// Replace the reconnect schedule.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.reconnect = ReconnectState::new(backoff);
        self
    }

    pub fn device(&self) -> Option<&D> {
        self.device.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.device.is_some()
    }

    pub fn wanted(&self) -> IndicatorState {
        self.wanted
    }

    pub fn indicator(&self) -> &StatusIndicator {
        &self.indicator
    }

    fn drop_device(&mut self, e: DeviceError) {
        log::warn!("[device] communication error: {e}");
        log::warn!("[device] will attempt reconnection...");
        self.device = None;
        self.indicator.force_refresh();
    }

    /// Show `state`, writing to the device only on change.
    ///
    /// Returns the state written, if any.
    pub fn show(&mut self, state: IndicatorState) -> Option<IndicatorState> {
        self.wanted = state;
        let dev = self.device.as_ref()?;
        let (action, err) = self.indicator.poll_and_apply(state, dev);
        if let Some(e) = err {
            self.drop_device(e);
            return None;
        }
        match action {
            MonitorAction::ApplyState(s) => Some(s),
            MonitorAction::NoChange => None,
        }
    }

    /// Re-arm the watchdog. A failed write drops the device.
    pub fn tickle(&mut self) {
        let result = match &self.device {
            Some(dev) => led::poke_watchdog(dev, self.watchdog_ms, self.window),
            None => return,
        };
        if let Err(e) = result {
            self.drop_device(e);
        }
    }

    /// Reopen the device if it is gone and an attempt is due.
    ///
    /// Returns `true` when a handle was recovered.
    pub fn try_reconnect(&mut self) -> bool {
        if self.device.is_some() {
            return false;
        }
        let Some((dev, window)) = try_reconnect_and_refresh(
            &mut self.reconnect,
            &mut self.open,
            &mut self.indicator,
            self.wanted,
            &self.pattern,
        ) else {
            return false;
        };
        log::info!("[device] reconnected to {}", dev.info().path);
        self.window = window;
        self.device = Some(dev);
        true
    }

    /// Sleep `total`, keeping the watchdog fed and the device connected.
    ///
    /// Always tickles at least once, even for a zero `total`.
    /// Returns `true` if shutdown was requested.
    pub fn wait(&mut self, total: Duration, shutdown: &Shutdown) -> bool {
        let deadline = Instant::now() + total;
        let tickle_every = tickle_interval(self.watchdog_ms);
        loop {
            self.try_reconnect();
            self.tickle();

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return shutdown.is_triggered();
            }
            let step = if self.device.is_some() {
                tickle_every
            } else {
                tickle_every.min(RECONNECT_CHECK)
            };
            if shutdown.wait_timeout(remaining.min(step)) {
                return true;
            }
        }
    }

    /// Poll `source` once, waiting out its rate limit here so the watchdog
    /// is tickled right before every request.
    pub fn poll(
        &mut self,
        source: &mut impl SystemSource,
        now: i64,
        update_interval: Duration,
        shutdown: &Shutdown,
    ) -> HealthReport {
        check_health_with(source, now, update_interval, |pending| {
            self.wait(pending, shutdown);
        })
    }

    /// Disarm the watchdog, then turn the light off.
    pub fn teardown(&self) -> device::Result<()> {
        let dev = self.device.as_ref().ok_or(DeviceError::NotFound)?;
        led::disarm_watchdog(dev)?;
        led::off(dev)
    }
}
