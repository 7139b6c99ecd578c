//! `monitor` subcommand — poll the system and drive the light until Ctrl+C.

use nliten_lib::device::PlatformDevice;
use nliten_lib::led::Palette;
use nliten_lib::monitor::next_poll_delay;
use nliten_lib::protocol::PatternLine;
use nliten_lib::session::LightSession;

use super::{
    ClientOptions, Config, Context, IndicatorState, Result, StatusIndicator, StatusLight,
    describe_pair, device, led, print_json, time,
};

type Session = LightSession<PlatformDevice>;

/// Open the device, show Startup and arm the watchdog.
fn monitor_setup(config: &Config, palette: Palette, pattern: Vec<PatternLine>) -> Result<Session> {
    let device = device::open_device_by_serial(&config.device_serial)?;
    let info = device.info();
    println!(
        "[device] {} ({}, firmware {})",
        info.path,
        info.product,
        info.firmware_label()
    );
    if !info.has_two_leds() {
        println!("[device] Single LED, one color per state");
    }

    let lines = pattern.len();
    let serial = config.device_serial.clone();
    let session = LightSession::start(
        device,
        Box::new(move || device::open_device_by_serial(&serial)),
        StatusIndicator::new(palette, config.fade_ms),
        pattern,
        config.watchdog,
    )?;
    println!("[watchdog] {} ms, {lines} pattern line(s)", config.watchdog);
    Ok(session)
}

fn print_change(session: &Session, state: IndicatorState) {
    println!(
        "  {:<8} -> {}",
        state.name().to_uppercase(),
        describe_pair(session.indicator().palette().colors(state))
    );
}

/// Monitor main loop: poll the API, apply the state, wait.
fn monitor_loop(ctx: &Context, session: &mut Session) -> Result<()> {
    let config = &ctx.config;
    let shutdown = &ctx.shutdown;
    let options = ClientOptions {
        timeout: config.request_timeout(),
        ..ctx.client_options()
    };
    let mut client = ctx.connect_with(options)?;
    println!("[api]    System {}", client.system_id());
    if ctx.verbose > 0 {
        print_json(client.all_systems())?;
    }
    println!();
    println!("Monitoring... (Ctrl+C to stop)");

    while !shutdown.is_triggered() {
        let report = session.poll(
            &mut client,
            time::now_epoch(),
            config.update_interval(),
            shutdown,
        );
        if shutdown.is_triggered() {
            break;
        }
        let state = report.state();
        let was_connected = session.is_connected();
        if let Some(s) = session.show(state) {
            print_change(session, s);
        }
        if was_connected && !session.is_connected() {
            println!("[device] Lost, will keep trying to reconnect");
        }

        let delay = next_poll_delay(state, config.poll_interval(), config.retry_delay());
        log::info!("[monitor] {state}, next poll in {}s", delay.as_secs());
        if session.wait(delay, shutdown) {
            break;
        }
    }
    Ok(())
}

/// Disarm the watchdog and turn the light off.
fn monitor_teardown(session: &Session) {
    println!();
    println!("Turning the light off...");
    if let Err(e) = session.teardown() {
        log::warn!("could not turn the light off: {e}");
    }
    println!("Done.");
}

pub(super) fn cmd_monitor(ctx: &Context) -> Result<()> {
    let config = &ctx.config;
    let palette = led::resolve_palette(&config.palette)?;
    let pattern = config.resolve_watchdog_pattern()?;

    println!("nliten: Enphase system health on a blink(1).");
    println!(
        "  Poll every {}h while healthy, every {}s otherwise",
        config.rate,
        config.retry_delay().min(config.poll_interval()).as_secs()
    );
    println!("Press Ctrl+C to exit (turns the light off).");
    println!();

    let mut session = monitor_setup(config, palette, pattern)?;
    let result = monitor_loop(ctx, &mut session);
    monitor_teardown(&session);
    result
}
