//! Protocol constants and report builders for the blink(1) USB status light.
//!
//! Every command is an 8-byte HID feature report with report id 1, sent with
//! a class `SET_REPORT` control transfer. Replies (version, pattern reads)
//! come back through `GET_REPORT` on the same report id.
//!
//! ## Report layouts
//!
//! | Command        | Bytes                                              |
//! |----------------|----------------------------------------------------|
//! | fade to RGB    | `[1, 'c', r, g, b, t_hi, t_lo, ledn]`              |
//! | set LED number | `[1, 'l', ledn, 0, 0, 0, 0, 0]`                    |
//! | write pattern  | `[1, 'P', r, g, b, t_hi, t_lo, pos]`               |
//! | read pattern   | `[1, 'R', 0, 0, 0, 0, 0, pos]`                     |
//! | server tickle  | `[1, 'D', on, t_hi, t_lo, stay_lit, start, end]`   |
//! | play           | `[1, 'p', on, start, end, count, 0, 0]`            |
//! | version        | `[1, 'v', 0, 0, 0, 0, 0, 0]`                       |
//!
//! All times are in units of 10 ms, big-endian.

use crate::led::Rgb;

// ── USB identity ──

/// ThingM vendor id.
pub const BLINK1_VID: u16 = 0x27B8;

/// blink(1) product id (all hardware revisions share it).
pub const BLINK1_PID: u16 = 0x01ED;

// ── HID transport ──

/// Feature report id used by every blink(1) command.
pub const REPORT_ID: u8 = 1;

/// Report length including the report id byte.
pub const REPORT_SIZE: usize = 8;

/// HID class request: SET_REPORT.
pub const HID_SET_REPORT: u8 = 0x09;

/// HID class request: GET_REPORT.
pub const HID_GET_REPORT: u8 = 0x01;

/// `wValue` for feature report id 1: `(report_type << 8) | report_id`.
pub const HID_FEATURE_REPORT: u16 = (3 << 8) | REPORT_ID as u16;

/// HID interface number on the device.
pub const HID_INTERFACE: u8 = 0;

/// Control transfer timeout.
pub const USB_TIMEOUT_MS: u64 = 1000;

// ── Device limits ──

/// Pattern slots available in device RAM.
pub const MAX_PATTERN_LINES: usize = 16;

/// Slots reserved by the firmware's own flashing pattern, not usable for
/// the watchdog pattern.
pub const RESERVED_PATTERN_LINES: usize = 2;

/// Longest fade the 16-bit time field can express.
pub const MAX_FADE_MS: u32 = u16::MAX as u32 * 10;

// ── Command bytes ──

pub const CMD_FADE_TO_RGB: u8 = b'c';
pub const CMD_SET_LEDN: u8 = b'l';
pub const CMD_WRITE_PATTERN_LINE: u8 = b'P';
pub const CMD_READ_PATTERN_LINE: u8 = b'R';
pub const CMD_SERVER_TICKLE: u8 = b'D';
pub const CMD_PLAY: u8 = b'p';
pub const CMD_GET_VERSION: u8 = b'v';

/// One complete feature report.
pub type Report = [u8; REPORT_SIZE];

/// Which LED a command addresses (mk2 and later have two).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    /// Both LEDs.
    All,
    /// LED 1, on the top of the device.
    Top,
    /// LED 2, on the bottom of the device.
    Bottom,
}

impl Led {
    /// Wire value of the `ledn` byte.
    pub fn number(self) -> u8 {
        match self {
            Led::All => 0,
            Led::Top => 1,
            Led::Bottom => 2,
        }
    }
}

/// Convert milliseconds into the device's 10 ms units, big-endian.
///
/// Durations longer than [`MAX_FADE_MS`] saturate.
pub fn time_units(ms: u32) -> [u8; 2] {
    let units = (ms / 10).min(u16::MAX as u32) as u16;
    units.to_be_bytes()
}

fn report(cmd: u8, body: [u8; 6]) -> Report {
    let mut buf = [0u8; REPORT_SIZE];
    buf[0] = REPORT_ID;
    buf[1] = cmd;
    buf[2..].copy_from_slice(&body);
    buf
}

/// Fade one or both LEDs to `color` over `fade_ms`.
pub fn fade_to_rgb(color: Rgb, fade_ms: u32, led: Led) -> Report {
    let [th, tl] = time_units(fade_ms);
    report(
        CMD_FADE_TO_RGB,
        [color.r, color.g, color.b, th, tl, led.number()],
    )
}

/// Select which LED subsequent pattern lines apply to.
pub fn set_ledn(led: Led) -> Report {
    report(CMD_SET_LEDN, [led.number(), 0, 0, 0, 0, 0])
}

/// Store a pattern line in RAM at slot `pos`.
pub fn write_pattern_line(color: Rgb, fade_ms: u32, pos: u8) -> Report {
    let [th, tl] = time_units(fade_ms);
    report(CMD_WRITE_PATTERN_LINE, [color.r, color.g, color.b, th, tl, pos])
}

/// Ask for the contents of pattern slot `pos`; the answer arrives via GET_REPORT.
pub fn read_pattern_line(pos: u8) -> Report {
    report(CMD_READ_PATTERN_LINE, [0, 0, 0, 0, 0, pos])
}

/// Arm (or disarm) the watchdog.
///
/// If the device is not tickled again within `timeout_ms`, it plays pattern
/// slots `start..=end`.
pub fn server_tickle(enable: bool, timeout_ms: u32, stay_lit: bool, start: u8, end: u8) -> Report {
    let [th, tl] = time_units(timeout_ms);
    report(
        CMD_SERVER_TICKLE,
        [enable as u8, th, tl, stay_lit as u8, start, end],
    )
}

/// Start or stop playing pattern slots `start..=end`, `count` times (0 = forever).
pub fn play(enable: bool, start: u8, end: u8, count: u8) -> Report {
    report(CMD_PLAY, [enable as u8, start, end, count, 0, 0])
}

/// Request the firmware version.
pub fn get_version() -> Report {
    report(CMD_GET_VERSION, [0; 6])
}

/// Decode a version reply: two ASCII digits at bytes 3 and 4.
pub fn parse_version(reply: &Report) -> Option<u16> {
    let major = (reply[3] as char).to_digit(10)?;
    let minor = (reply[4] as char).to_digit(10)?;
    Some((major * 100 + minor) as u16)
}

/// A pattern line as stored on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternLine {
    pub color: Rgb,
    pub fade_ms: u32,
}

/// Decode a read-pattern reply: `[1, 'R', r, g, b, t_hi, t_lo, pos]`.
pub fn parse_pattern_line(reply: &Report) -> PatternLine {
    let units = u16::from_be_bytes([reply[5], reply[6]]);
    PatternLine {
        color: Rgb::new(reply[2], reply[3], reply[4]),
        fade_ms: units as u32 * 10,
    }
}
