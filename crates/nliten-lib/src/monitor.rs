//! Health assessment and indicator state — testable monitor logic decoupled from I/O.
//!
//! [`check_health`] turns the Enlighten summary/stats payloads into a
//! [`Health`]; [`IndicatorState::from_health`] maps that onto one of four
//! light states; [`StatusIndicator`] remembers what the light currently
//! shows so the loop only writes to the device on change.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::api::{ApiError, Stats, Summary, SystemSource, Timestamp};
use crate::device::{DeviceError, Result, StatusLight};
use crate::led::{self, Palette};

/// Envoys on a cellular link upload every six hours.
pub const CELLULAR_UPDATE_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Envoys on Wi-Fi upload every 15 minutes.
pub const WIFI_UPDATE_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Wait before re-polling when the system is not healthy.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

/// Status string the API uses for a healthy system.
pub const STATUS_NORMAL: &str = "normal";

// ── Health ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    /// The last report is no older than one update interval.
    pub current: bool,
    /// The API reports status `"normal"`.
    pub normal: bool,
}

impl Health {
    /// What a failed fetch counts as.
    pub const UNKNOWN: Health = Health {
        current: false,
        normal: false,
    };

    pub fn is_healthy(self) -> bool {
        self.current && self.normal
    }

    pub fn and(self, other: Health) -> Health {
        Health {
            current: self.current && other.current,
            normal: self.normal && other.normal,
        }
    }

    pub fn state(self) -> IndicatorState {
        IndicatorState::from_health(self.current, self.normal)
    }
}

fn assess(last_report_at: Timestamp, status: &str, now: i64, update_interval: Duration) -> Health {
    let oldest_current = now.saturating_sub(update_interval.as_secs() as i64);
    Health {
        current: last_report_at.0 >= oldest_current,
        normal: status == STATUS_NORMAL,
    }
}

/// Judge a summary payload at time `now` (epoch seconds).
pub fn assess_summary(summary: &Summary, now: i64, update_interval: Duration) -> Health {
    assess(summary.last_report_at, &summary.status, now, update_interval)
}

/// Judge the `meta` block of a stats payload.
pub fn assess_stats(stats: &Stats, now: i64, update_interval: Duration) -> Health {
    assess(stats.meta.last_report_at, &stats.meta.status, now, update_interval)
}

/// Outcome of one poll.
#[derive(Debug)]
pub struct HealthReport {
    pub health: Health,
    pub summary: Option<Summary>,
    pub stats: Option<Stats>,
    /// The fetch that failed, if any.
    pub error: Option<ApiError>,
}

impl HealthReport {
    pub fn state(&self) -> IndicatorState {
        self.health.state()
    }
}

/// Poll the API once.
///
/// Stats are only fetched when the summary is current and normal; the
/// result is the AND of both. A failed fetch yields [`Health::UNKNOWN`].
pub fn check_health(
    source: &mut impl SystemSource,
    now: i64,
    update_interval: Duration,
) -> HealthReport {
    check_health_with(source, now, update_interval, |_| {})
}

/// [`check_health`] with a hook run before each fetch.
///
/// `before_fetch` gets the source's [`pending_delay`](SystemSource::pending_delay)
/// and may spend it, e.g. feeding a watchdog while the rate limit runs down.
pub fn check_health_with<S: SystemSource>(
    source: &mut S,
    now: i64,
    update_interval: Duration,
    mut before_fetch: impl FnMut(Duration),
) -> HealthReport {
    before_fetch(source.pending_delay());
    let summary = match source.current_summary() {
        Ok(s) => s,
        Err(e) => {
            log::error!("summary fetch failed: {e}");
            return HealthReport {
                health: Health::UNKNOWN,
                summary: None,
                stats: None,
                error: Some(e),
            };
        }
    };
    let summary_health = assess_summary(&summary, now, update_interval);
    log::info!(
        "Summary: power={:?}, status={}, lastReport={}, lastInterval={:?}",
        summary.current_power,
        summary.status,
        summary.last_report_at.0,
        summary.last_interval_end_at.map(|t| t.0),
    );

    if !summary_health.is_healthy() {
        return HealthReport {
            health: summary_health,
            summary: Some(summary),
            stats: None,
            error: None,
        };
    }

    before_fetch(source.pending_delay());
    match source.current_stats() {
        Ok(stats) => {
            let stats_health = assess_stats(&stats, now, update_interval);
            if !stats_health.current {
                log::info!(
                    "Reporting late: last report={}, now={now}",
                    stats.meta.last_report_at.0
                );
            } else if !stats_health.normal {
                log::info!("Abnormal report: status={}", stats.meta.status);
            }
            HealthReport {
                health: summary_health.and(stats_health),
                summary: Some(summary),
                stats: Some(stats),
                error: None,
            }
        }
        Err(e) => {
            log::error!("stats fetch failed: {e}");
            HealthReport {
                health: Health::UNKNOWN,
                summary: Some(summary),
                stats: None,
                error: Some(e),
            }
        }
    }
}

/// Delay before the next poll: the full interval when healthy, the retry
/// delay otherwise.
pub fn next_poll_delay(state: IndicatorState, poll_interval: Duration, retry_delay: Duration) -> Duration {
    if state == IndicatorState::Normal {
        poll_interval
    } else {
        retry_delay.min(poll_interval)
    }
}

/// How often to tickle a watchdog with the given timeout (twice per period).
pub fn tickle_interval(watchdog_ms: u32) -> Duration {
    Duration::from_millis((watchdog_ms / 2).max(1) as u64)
}

// ── Indicator state ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorState {
    /// Shown until the first poll completes.
    Startup,
    Normal,
    /// Current data, status other than normal.
    Abnormal,
    /// Normal status, but the last report is too old.
    Stale,
    /// Old data and abnormal status, or the API could not be reached.
    Fault,
    /// Both LEDs dark (exit).
    Off,
}

impl IndicatorState {
    pub const ALL: [IndicatorState; 6] = [
        IndicatorState::Startup,
        IndicatorState::Normal,
        IndicatorState::Abnormal,
        IndicatorState::Stale,
        IndicatorState::Fault,
        IndicatorState::Off,
    ];

    pub fn from_health(current: bool, normal: bool) -> Self {
        match (current, normal) {
            (true, true) => IndicatorState::Normal,
            (true, false) => IndicatorState::Abnormal,
            (false, true) => IndicatorState::Stale,
            (false, false) => IndicatorState::Fault,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IndicatorState::Startup => "startup",
            IndicatorState::Normal => "normal",
            IndicatorState::Abnormal => "abnormal",
            IndicatorState::Stale => "stale",
            IndicatorState::Fault => "fault",
            IndicatorState::Off => "off",
        }
    }
}

impl fmt::Display for IndicatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndicatorState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        IndicatorState::ALL
            .into_iter()
            .find(|state| state.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown light state '{s}'"))
    }
}

// ── Status indicator ──

/// Action to take after a health update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    /// Write the palette colors for this state.
    ApplyState(IndicatorState),
    /// The light already shows this state.
    NoChange,
}

/// Remembers the state the light shows and writes only on change.
pub struct StatusIndicator {
    shown: Option<IndicatorState>,
    palette: Palette,
    fade_ms: u32,
}

impl StatusIndicator {
    pub fn new(palette: Palette, fade_ms: u32) -> Self {
        Self {
            shown: None,
            palette,
            fade_ms,
        }
    }

    /// Record `state` as wanted. Returns what needs to happen.
    pub fn update(&mut self, state: IndicatorState) -> MonitorAction {
        if self.shown == Some(state) {
            MonitorAction::NoChange
        } else {
            self.shown = Some(state);
            MonitorAction::ApplyState(state)
        }
    }

    /// Write `state` to the device regardless of what it shows.
    pub fn apply(&self, device: &impl StatusLight, state: IndicatorState) -> Result<()> {
        led::apply_state(device, &self.palette, state, self.fade_ms)
    }

    /// Feed a state and apply it to the device if it changed.
    ///
    /// On a device error the remembered state is cleared so the next poll
    /// writes again.
    pub fn poll_and_apply(
        &mut self,
        state: IndicatorState,
        device: &impl StatusLight,
    ) -> (MonitorAction, Option<DeviceError>) {
        let action = self.update(state);
        let err = match action {
            MonitorAction::ApplyState(s) => self.apply(device, s).err(),
            MonitorAction::NoChange => None,
        };
        if err.is_some() {
            self.shown = None;
        }
        (action, err)
    }

    /// Forget the shown state so the next update re-applies it.
    pub fn force_refresh(&mut self) {
        self.shown = None;
    }

    /// The state last written, if any.
    pub fn shown(&self) -> Option<IndicatorState> {
        self.shown
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn fade_ms(&self) -> u32 {
        self.fade_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StatsMeta;
    use crate::device::mock::MockLight;
    use crate::led::Rgb;
    use std::collections::VecDeque;

    const NOW: i64 = 1_469_830_983;
    const HOUR: i64 = 60 * 60;

    fn summary(status: &str, last_report_at: i64) -> Summary {
        Summary {
            system_id: 67,
            modules: Some(35),
            size_w: Some(6270),
            current_power: Some(271),
            energy_today: None,
            energy_lifetime: None,
            status: status.into(),
            last_report_at: Timestamp(last_report_at),
            last_interval_end_at: None,
            summary_date: None,
        }
    }

    fn stats(status: &str, last_report_at: i64) -> Stats {
        Stats {
            system_id: 67,
            total_devices: Some(35),
            meta: StatsMeta {
                status: status.into(),
                last_report_at: Timestamp(last_report_at),
                last_energy_at: None,
                operational_at: None,
            },
            intervals: vec![],
        }
    }

    /// Canned responses, consumed in order.
    #[derive(Default)]
    struct FakeSource {
        summaries: VecDeque<crate::api::Result<Summary>>,
        stats: VecDeque<crate::api::Result<Stats>>,
        stats_calls: usize,
    }

    impl SystemSource for FakeSource {
        fn current_summary(&mut self) -> crate::api::Result<Summary> {
            self.summaries.pop_front().unwrap_or(Err(ApiError::NoSystems))
        }
        fn current_stats(&mut self) -> crate::api::Result<Stats> {
            self.stats_calls += 1;
            self.stats.pop_front().unwrap_or(Err(ApiError::NoSystems))
        }
    }

    fn source(summary: crate::api::Result<Summary>, stats: Option<crate::api::Result<Stats>>) -> FakeSource {
        FakeSource {
            summaries: VecDeque::from([summary]),
            stats: stats.into_iter().collect(),
            stats_calls: 0,
        }
    }

    // ── Pure mapping ──

    #[test]
    fn from_health_truth_table() {
        assert_eq!(IndicatorState::from_health(true, true), IndicatorState::Normal);
        assert_eq!(IndicatorState::from_health(true, false), IndicatorState::Abnormal);
        assert_eq!(IndicatorState::from_health(false, true), IndicatorState::Stale);
        assert_eq!(IndicatorState::from_health(false, false), IndicatorState::Fault);
    }

    #[test]
    fn from_health_has_no_memory() {
        // Same inputs, same answer, regardless of what came before.
        for _ in 0..3 {
            assert_eq!(IndicatorState::from_health(true, false), IndicatorState::Abnormal);
            assert_eq!(IndicatorState::from_health(true, true), IndicatorState::Normal);
        }
    }

    #[test]
    fn unknown_health_is_fault() {
        assert_eq!(Health::UNKNOWN.state(), IndicatorState::Fault);
    }

    #[test]
    fn state_names_round_trip() {
        for state in IndicatorState::ALL {
            assert_eq!(state.name().parse::<IndicatorState>().unwrap(), state);
        }
        assert!("purple".parse::<IndicatorState>().is_err());
    }

    #[test]
    fn state_serializes_lowercase() {
        assert_eq!(serde_json::to_value(IndicatorState::Stale).unwrap(), "stale");
    }

    // ── Assessment ──

    #[test]
    fn recent_normal_summary_is_healthy() {
        let h = assess_summary(&summary("normal", NOW - HOUR), NOW, CELLULAR_UPDATE_INTERVAL);
        assert_eq!(h, Health { current: true, normal: true });
    }

    #[test]
    fn report_exactly_one_interval_old_is_current() {
        let h = assess_summary(&summary("normal", NOW - 6 * HOUR), NOW, CELLULAR_UPDATE_INTERVAL);
        assert!(h.current);
    }

    #[test]
    fn report_older_than_interval_is_stale() {
        let h = assess_summary(&summary("normal", NOW - 6 * HOUR - 1), NOW, CELLULAR_UPDATE_INTERVAL);
        assert_eq!(h, Health { current: false, normal: true });
    }

    #[test]
    fn wifi_interval_is_stricter() {
        let s = summary("normal", NOW - HOUR);
        assert!(assess_summary(&s, NOW, CELLULAR_UPDATE_INTERVAL).current);
        assert!(!assess_summary(&s, NOW, WIFI_UPDATE_INTERVAL).current);
    }

    #[test]
    fn non_normal_status_is_abnormal() {
        for status in ["comm", "power", "meter", "micro", "Normal"] {
            let h = assess_summary(&summary(status, NOW), NOW, CELLULAR_UPDATE_INTERVAL);
            assert!(!h.normal, "{status}");
        }
    }

    #[test]
    fn stats_assessed_from_meta() {
        let h = assess_stats(&stats("comm", NOW), NOW, CELLULAR_UPDATE_INTERVAL);
        assert_eq!(h, Health { current: true, normal: false });
    }

    // ── check_health ──

    #[test]
    fn healthy_summary_and_stats_is_normal() {
        let mut src = source(Ok(summary("normal", NOW)), Some(Ok(stats("normal", NOW))));
        let report = check_health(&mut src, NOW, CELLULAR_UPDATE_INTERVAL);
        assert_eq!(report.state(), IndicatorState::Normal);
        assert!(report.stats.is_some());
        assert!(report.error.is_none());
    }

    #[test]
    fn unhealthy_summary_skips_stats() {
        let mut src = source(Ok(summary("comm", NOW)), Some(Ok(stats("normal", NOW))));
        let report = check_health(&mut src, NOW, CELLULAR_UPDATE_INTERVAL);
        assert_eq!(report.state(), IndicatorState::Abnormal);
        assert_eq!(src.stats_calls, 0);
    }

    #[test]
    fn stale_summary_shows_stale() {
        let mut src = source(Ok(summary("normal", NOW - 7 * HOUR)), None);
        let report = check_health(&mut src, NOW, CELLULAR_UPDATE_INTERVAL);
        assert_eq!(report.state(), IndicatorState::Stale);
    }

    #[test]
    fn stats_abnormal_downgrades_state() {
        let mut src = source(Ok(summary("normal", NOW)), Some(Ok(stats("micro", NOW))));
        let report = check_health(&mut src, NOW, CELLULAR_UPDATE_INTERVAL);
        assert_eq!(report.state(), IndicatorState::Abnormal);
    }

    #[test]
    fn stats_late_downgrades_state() {
        let mut src = source(
            Ok(summary("normal", NOW)),
            Some(Ok(stats("normal", NOW - 7 * HOUR))),
        );
        let report = check_health(&mut src, NOW, CELLULAR_UPDATE_INTERVAL);
        assert_eq!(report.state(), IndicatorState::Stale);
    }

    #[test]
    fn summary_fetch_failure_is_fault() {
        let mut src = source(
            Err(ApiError::Status {
                status: 500,
                body: String::new(),
            }),
            None,
        );
        let report = check_health(&mut src, NOW, CELLULAR_UPDATE_INTERVAL);
        assert_eq!(report.state(), IndicatorState::Fault);
        assert!(report.summary.is_none());
        assert!(matches!(report.error, Some(ApiError::Status { status: 500, .. })));
    }

    #[test]
    fn stats_fetch_failure_is_fault_but_keeps_summary() {
        let mut src = source(Ok(summary("normal", NOW)), Some(Err(ApiError::Decode("x".into()))));
        let report = check_health(&mut src, NOW, CELLULAR_UPDATE_INTERVAL);
        assert_eq!(report.state(), IndicatorState::Fault);
        assert!(report.summary.is_some());
    }

    #[test]
    fn hook_runs_before_each_fetch() {
        let mut src = source(Ok(summary("normal", NOW)), Some(Ok(stats("normal", NOW))));
        let mut hooks = 0;
        let report = check_health_with(&mut src, NOW, CELLULAR_UPDATE_INTERVAL, |delay| {
            assert_eq!(delay, Duration::ZERO);
            hooks += 1;
        });
        assert_eq!(hooks, 2);
        assert_eq!(report.state(), IndicatorState::Normal);
    }

    #[test]
    fn hook_skipped_for_stats_not_fetched() {
        let mut src = source(Ok(summary("comm", NOW)), None);
        let mut hooks = 0;
        check_health_with(&mut src, NOW, CELLULAR_UPDATE_INTERVAL, |_| hooks += 1);
        assert_eq!(hooks, 1);
    }

    // ── Timing helpers ──

    #[test]
    fn healthy_waits_full_interval() {
        let poll = Duration::from_secs(6 * 3600);
        assert_eq!(next_poll_delay(IndicatorState::Normal, poll, DEFAULT_RETRY_DELAY), poll);
    }

    #[test]
    fn unhealthy_retries_sooner() {
        let poll = Duration::from_secs(6 * 3600);
        for state in [IndicatorState::Abnormal, IndicatorState::Stale, IndicatorState::Fault] {
            assert_eq!(next_poll_delay(state, poll, DEFAULT_RETRY_DELAY), DEFAULT_RETRY_DELAY);
        }
    }

    #[test]
    fn retry_never_exceeds_poll_interval() {
        let poll = Duration::from_secs(60);
        assert_eq!(next_poll_delay(IndicatorState::Fault, poll, DEFAULT_RETRY_DELAY), poll);
    }

    #[test]
    fn tickle_twice_per_watchdog_period() {
        assert_eq!(tickle_interval(60_000), Duration::from_secs(30));
        assert_eq!(tickle_interval(0), Duration::from_millis(1));
    }

    // ── StatusIndicator ──

    fn indicator() -> StatusIndicator {
        StatusIndicator::new(Palette::default(), 100)
    }

    #[test]
    fn first_update_applies() {
        let mut ind = indicator();
        assert_eq!(
            ind.update(IndicatorState::Startup),
            MonitorAction::ApplyState(IndicatorState::Startup)
        );
        assert_eq!(ind.shown(), Some(IndicatorState::Startup));
    }

    #[test]
    fn same_state_is_no_change() {
        let mut ind = indicator();
        ind.update(IndicatorState::Normal);
        for _ in 0..5 {
            assert_eq!(ind.update(IndicatorState::Normal), MonitorAction::NoChange);
        }
    }

    #[test]
    fn changed_state_applies() {
        let mut ind = indicator();
        ind.update(IndicatorState::Normal);
        assert_eq!(
            ind.update(IndicatorState::Stale),
            MonitorAction::ApplyState(IndicatorState::Stale)
        );
    }

    #[test]
    fn force_refresh_reapplies() {
        let mut ind = indicator();
        ind.update(IndicatorState::Fault);
        ind.force_refresh();
        assert_eq!(
            ind.update(IndicatorState::Fault),
            MonitorAction::ApplyState(IndicatorState::Fault)
        );
    }

    #[test]
    fn poll_and_apply_writes_on_change_only() {
        let dev = MockLight::new();
        let mut ind = indicator();

        let (action, err) = ind.poll_and_apply(IndicatorState::Abnormal, &dev);
        assert_eq!(action, MonitorAction::ApplyState(IndicatorState::Abnormal));
        assert!(err.is_none());
        let fades = dev.fades();
        assert_eq!(fades[0].color, Rgb::new(0xFF, 0, 0));
        assert_eq!(fades[0].ledn, 1);

        let before = dev.reports.borrow().len();
        let (action, _) = ind.poll_and_apply(IndicatorState::Abnormal, &dev);
        assert_eq!(action, MonitorAction::NoChange);
        assert_eq!(dev.reports.borrow().len(), before);
    }

    #[test]
    fn poll_and_apply_error_forgets_state() {
        let dev = MockLight::new();
        dev.fail_send.set(true);
        let mut ind = indicator();

        let (action, err) = ind.poll_and_apply(IndicatorState::Stale, &dev);
        assert_eq!(action, MonitorAction::ApplyState(IndicatorState::Stale));
        assert!(err.is_some());
        assert_eq!(ind.shown(), None);

        dev.fail_send.set(false);
        let (action, err) = ind.poll_and_apply(IndicatorState::Stale, &dev);
        assert_eq!(action, MonitorAction::ApplyState(IndicatorState::Stale));
        assert!(err.is_none());
    }
}
