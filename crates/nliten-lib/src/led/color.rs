//! Color parsing and formatting for the blink(1).
//!
//! The device takes plain 8-bit RGB triples. Names follow the CSS3 keywords
//! that blink(1) tooling conventionally accepts.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An RGB color as sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    pub fn is_off(&self) -> bool {
        *self == Rgb::BLACK
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_color(*self))
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_color(*self))
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_color(&s).map_err(serde::de::Error::custom)
    }
}

const NAMED: &[(&str, Rgb)] = &[
    ("black", Rgb::new(0x00, 0x00, 0x00)),
    ("off", Rgb::new(0x00, 0x00, 0x00)),
    ("white", Rgb::new(0xFF, 0xFF, 0xFF)),
    ("gray", Rgb::new(0x80, 0x80, 0x80)),
    ("grey", Rgb::new(0x80, 0x80, 0x80)),
    ("silver", Rgb::new(0xC0, 0xC0, 0xC0)),
    ("red", Rgb::new(0xFF, 0x00, 0x00)),
    ("maroon", Rgb::new(0x80, 0x00, 0x00)),
    ("orange", Rgb::new(0xFF, 0xA5, 0x00)),
    ("gold", Rgb::new(0xFF, 0xD7, 0x00)),
    ("yellow", Rgb::new(0xFF, 0xFF, 0x00)),
    ("olive", Rgb::new(0x80, 0x80, 0x00)),
    ("chartreuse", Rgb::new(0x7F, 0xFF, 0x00)),
    ("lime", Rgb::new(0x00, 0xFF, 0x00)),
    ("green", Rgb::new(0x00, 0x80, 0x00)),
    ("teal", Rgb::new(0x00, 0x80, 0x80)),
    ("cyan", Rgb::new(0x00, 0xFF, 0xFF)),
    ("aqua", Rgb::new(0x00, 0xFF, 0xFF)),
    ("blue", Rgb::new(0x00, 0x00, 0xFF)),
    ("navy", Rgb::new(0x00, 0x00, 0x80)),
    ("purple", Rgb::new(0x80, 0x00, 0x80)),
    ("magenta", Rgb::new(0xFF, 0x00, 0xFF)),
    ("fuchsia", Rgb::new(0xFF, 0x00, 0xFF)),
    ("pink", Rgb::new(0xFF, 0xC0, 0xCB)),
];

/// Parse a color string.
///
/// Accepts:
/// - Hex: `"#FFA500"`, `"FFA500"`, `"#ffa500"`
/// - CSS3 names: `"orange"`, `"gray"`, `"chartreuse"`, ... and `"off"`
pub fn parse_color(s: &str) -> crate::error::Result<Rgb> {
    let s = s.trim();

    let lower = s.to_lowercase();
    if let Some((_, rgb)) = NAMED.iter().find(|(name, _)| *name == lower) {
        return Ok(*rgb);
    }

    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        return Err(crate::NlitenError::Color(format!(
            "Invalid color: {s} (use #RRGGBB or a color name)"
        )));
    }
    // from_str_radix also takes a leading sign
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(crate::NlitenError::Color(format!("Invalid hex color: {s}")));
    }
    let val = u32::from_str_radix(hex, 16)
        .map_err(|_| crate::NlitenError::Color(format!("Invalid hex color: {s}")))?;
    Ok(Rgb::new((val >> 16) as u8, (val >> 8) as u8, val as u8))
}

/// Format a color as `#RRGGBB`.
pub fn format_color(rgb: Rgb) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb.r, rgb.g, rgb.b)
}

/// Reverse lookup: the CSS3 name of a color, if it has one.
pub fn color_name(rgb: Rgb) -> Option<&'static str> {
    NAMED
        .iter()
        .find(|(name, c)| *c == rgb && *name != "off")
        .map(|(name, _)| *name)
}
