//! `light` subcommand — show one indicator state and exit.

use super::{Context, IndicatorState, Result, StatusLight, describe_pair, device, led};

pub(super) fn cmd_light(ctx: &Context, state: IndicatorState) -> Result<()> {
    let palette = led::resolve_palette(&ctx.config.palette)?;
    let dev = device::open_device_by_serial(&ctx.config.device_serial)?;
    println!("[device] {}", dev.info().path);

    if state == IndicatorState::Off {
        led::off(&dev)?;
    } else {
        led::apply_state(&dev, &palette, state, ctx.config.fade_ms)?;
    }
    println!("  {} -> {}", state.name().to_uppercase(), describe_pair(palette.colors(state)));
    Ok(())
}
