//! Indicator palette — which colors each LED shows in each state.

use serde::Serialize;

use crate::config::PaletteConfig;
use crate::monitor::IndicatorState;

use super::color::{Rgb, parse_color};

const GRAY: Rgb = Rgb::new(0x80, 0x80, 0x80);
const GREEN: Rgb = Rgb::new(0x00, 0x80, 0x00);
const RED: Rgb = Rgb::new(0xFF, 0x00, 0x00);
const ORANGE: Rgb = Rgb::new(0xFF, 0xA5, 0x00);

/// Colors for the top (LED 1) and bottom (LED 2) LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorPair {
    pub top: Rgb,
    pub bottom: Rgb,
}

impl ColorPair {
    pub const fn new(top: Rgb, bottom: Rgb) -> Self {
        ColorPair { top, bottom }
    }

    /// Color to show on a single-LED (mk1) device.
    ///
    /// The top LED carries the primary signal; fall back to the bottom one
    /// when the top is dark so that e.g. Normal still shows green.
    pub fn single(&self) -> Rgb {
        if self.top.is_off() { self.bottom } else { self.top }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub startup: ColorPair,
    pub normal: ColorPair,
    pub abnormal: ColorPair,
    pub stale: ColorPair,
    pub fault: ColorPair,
    pub off: ColorPair,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            startup: ColorPair::new(GRAY, GRAY),
            normal: ColorPair::new(Rgb::BLACK, GREEN),
            abnormal: ColorPair::new(RED, Rgb::BLACK),
            stale: ColorPair::new(ORANGE, Rgb::BLACK),
            fault: ColorPair::new(ORANGE, RED),
            off: ColorPair::new(Rgb::BLACK, Rgb::BLACK),
        }
    }
}

impl Palette {
    pub fn colors(&self, state: IndicatorState) -> ColorPair {
        match state {
            IndicatorState::Startup => self.startup,
            IndicatorState::Normal => self.normal,
            IndicatorState::Abnormal => self.abnormal,
            IndicatorState::Stale => self.stale,
            IndicatorState::Fault => self.fault,
            IndicatorState::Off => self.off,
        }
    }

    fn colors_mut(&mut self, state: IndicatorState) -> &mut ColorPair {
        match state {
            IndicatorState::Startup => &mut self.startup,
            IndicatorState::Normal => &mut self.normal,
            IndicatorState::Abnormal => &mut self.abnormal,
            IndicatorState::Stale => &mut self.stale,
            IndicatorState::Fault => &mut self.fault,
            IndicatorState::Off => &mut self.off,
        }
    }
}

/// Apply configured overrides on top of the default palette.
///
/// Fails on the first unparseable color; [`Config::validate`] reports all
/// of them.
///
/// [`Config::validate`]: crate::config::Config::validate
pub fn resolve_palette(config: &PaletteConfig) -> crate::error::Result<Palette> {
    let mut palette = Palette::default();
    for (state, led, value) in config.entries() {
        let rgb = parse_color(value).map_err(|e| {
            crate::NlitenError::Config(format!("palette.{state}.{led}: {e}"))
        })?;
        let pair = palette.colors_mut(state);
        match led {
            "top" => pair.top = rgb,
            _ => pair.bottom = rgb,
        }
    }
    Ok(palette)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColorPairConfig;

    #[test]
    fn default_palette_matches_documented_colors() {
        let p = Palette::default();
        assert_eq!(p.normal, ColorPair::new(Rgb::BLACK, parse_color("green").unwrap()));
        assert_eq!(p.abnormal, ColorPair::new(parse_color("red").unwrap(), Rgb::BLACK));
        assert_eq!(p.stale, ColorPair::new(parse_color("orange").unwrap(), Rgb::BLACK));
        assert_eq!(
            p.fault,
            ColorPair::new(parse_color("orange").unwrap(), parse_color("red").unwrap())
        );
        assert_eq!(p.startup.top, parse_color("gray").unwrap());
        assert!(p.off.top.is_off() && p.off.bottom.is_off());
    }

    #[test]
    fn every_state_has_distinct_colors() {
        let p = Palette::default();
        let states = IndicatorState::ALL;
        for i in 0..states.len() {
            for j in (i + 1)..states.len() {
                assert_ne!(
                    p.colors(states[i]),
                    p.colors(states[j]),
                    "{} and {} look the same",
                    states[i],
                    states[j]
                );
            }
        }
    }

    #[test]
    fn single_led_prefers_top() {
        assert_eq!(Palette::default().fault.single(), ORANGE);
        assert_eq!(Palette::default().normal.single(), GREEN);
        assert!(Palette::default().off.single().is_off());
    }

    #[test]
    fn resolve_empty_config_is_default() {
        let palette = resolve_palette(&PaletteConfig::default()).unwrap();
        assert_eq!(palette, Palette::default());
    }

    #[test]
    fn resolve_overrides_single_led() {
        let config = PaletteConfig {
            normal: ColorPairConfig {
                top: None,
                bottom: Some("lime".into()),
            },
            ..Default::default()
        };
        let palette = resolve_palette(&config).unwrap();
        assert_eq!(palette.normal.top, Rgb::BLACK);
        assert_eq!(palette.normal.bottom, Rgb::new(0, 0xFF, 0));
        assert_eq!(palette.fault, Palette::default().fault);
    }

    #[test]
    fn resolve_reports_field_of_bad_color() {
        let config = PaletteConfig {
            stale: ColorPairConfig {
                top: Some("mauve-ish".into()),
                bottom: None,
            },
            ..Default::default()
        };
        let err = resolve_palette(&config).unwrap_err().to_string();
        assert!(err.contains("palette.stale.top"), "got: {err}");
    }
}
