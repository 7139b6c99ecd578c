//! LED device operations — fades, indicator states, watchdog pattern.

use crate::device::{DeviceError, Result, StatusLight};
use crate::monitor::IndicatorState;
use crate::protocol::{self, Led, MAX_PATTERN_LINES, PatternLine, RESERVED_PATTERN_LINES};

use super::color::Rgb;
use super::palette::{ColorPair, Palette};

/// Longest pattern the watchdog may use.
pub const MAX_WATCHDOG_LINES: usize = MAX_PATTERN_LINES - RESERVED_PATTERN_LINES;

/// Fade one or both LEDs.
pub fn fade(device: &impl StatusLight, color: Rgb, fade_ms: u32, led: Led) -> Result<()> {
    device.send_report(&protocol::fade_to_rgb(color, fade_ms, led))
}

/// Show a color pair. mk1 devices get [`ColorPair::single`] on their only LED.
pub fn show_pair(device: &impl StatusLight, pair: ColorPair, fade_ms: u32) -> Result<()> {
    if !device.info().has_two_leds() {
        return fade(device, pair.single(), fade_ms, Led::All);
    }
    if pair.top == pair.bottom {
        return fade(device, pair.top, fade_ms, Led::All);
    }
    fade(device, pair.top, fade_ms, Led::Top)?;
    fade(device, pair.bottom, fade_ms, Led::Bottom)
}

/// Show the palette colors for `state`.
pub fn apply_state(
    device: &impl StatusLight,
    palette: &Palette,
    state: IndicatorState,
    fade_ms: u32,
) -> Result<()> {
    log::debug!("light: {state}");
    show_pair(device, palette.colors(state), fade_ms)
}

/// Stop any playing pattern and turn both LEDs off immediately.
pub fn off(device: &impl StatusLight) -> Result<()> {
    device.send_report(&protocol::play(false, 0, 0, 0))?;
    fade(device, Rgb::BLACK, 0, Led::All)
}

/// Pattern slots the watchdog plays, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogWindow {
    pub start: u8,
    pub end: u8,
}

/// Red wig-wag between the two LEDs.
pub fn default_watchdog_pattern() -> Vec<PatternLine> {
    const RED: Rgb = Rgb::new(0xFF, 0x00, 0x00);
    [RED, Rgb::BLACK, Rgb::BLACK, RED]
        .into_iter()
        .map(|color| PatternLine {
            color,
            fade_ms: 300,
        })
        .collect()
}

/// Write the watchdog pattern to device RAM, starting at slot 0.
///
/// Lines alternate between the top and bottom LED. Nothing is written to
/// flash, so the factory pattern returns on the next power cycle.
pub fn write_watchdog_pattern(
    device: &impl StatusLight,
    pattern: &[PatternLine],
) -> Result<WatchdogWindow> {
    if pattern.is_empty() || pattern.len() > MAX_WATCHDOG_LINES {
        return Err(DeviceError::WriteFailed(format!(
            "watchdog pattern: {} lines (must be 1..={MAX_WATCHDOG_LINES})",
            pattern.len()
        )));
    }
    for (pos, line) in pattern.iter().enumerate() {
        let led = if pos % 2 == 0 { Led::Top } else { Led::Bottom };
        device.send_report(&protocol::set_ledn(led))?;
        device.send_report(&protocol::write_pattern_line(line.color, line.fade_ms, pos as u8))?;
    }
    Ok(WatchdogWindow {
        start: 0,
        end: (pattern.len() - 1) as u8,
    })
}

/// Read back pattern slots `window.start..=window.end`.
pub fn read_pattern(device: &impl StatusLight, window: WatchdogWindow) -> Result<Vec<PatternLine>> {
    (window.start..=window.end)
        .map(|pos| {
            device.send_report(&protocol::read_pattern_line(pos))?;
            device.read_report().map(|r| protocol::parse_pattern_line(&r))
        })
        .collect()
}

/// Re-arm the watchdog for another `timeout_ms`.
pub fn poke_watchdog(device: &impl StatusLight, timeout_ms: u32, window: WatchdogWindow) -> Result<()> {
    device.send_report(&protocol::server_tickle(
        true,
        timeout_ms,
        false,
        window.start,
        window.end,
    ))
}

/// Disarm the watchdog so the pattern does not start after exit.
pub fn disarm_watchdog(device: &impl StatusLight) -> Result<()> {
    device.send_report(&protocol::server_tickle(false, 0, false, 0, 0))
}

/// Re-apply `state` after reconnecting: the new handle knows nothing about
/// the pattern or the LEDs' previous colors.
pub fn refresh_after_reconnect(
    device: &impl StatusLight,
    palette: &Palette,
    state: Option<IndicatorState>,
    fade_ms: u32,
    pattern: &[PatternLine],
) -> Result<WatchdogWindow> {
    let window = write_watchdog_pattern(device, pattern)?;
    if let Some(state) = state {
        apply_state(device, palette, state, fade_ms)?;
    }
    Ok(window)
}
