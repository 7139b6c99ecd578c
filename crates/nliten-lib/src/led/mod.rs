//! LED control — colors, palette, indicator states, watchdog pattern.

mod color;
mod ops;
mod palette;

pub use color::{Rgb, color_name, format_color, parse_color};
pub use ops::{
    MAX_WATCHDOG_LINES, WatchdogWindow, apply_state, default_watchdog_pattern, disarm_watchdog,
    fade, off, poke_watchdog, read_pattern, refresh_after_reconnect, show_pair,
    write_watchdog_pattern,
};
pub use palette::{ColorPair, Palette, resolve_palette};
