//! nliten — watch an Enphase solar array through the Enlighten API and show
//! its health on a blink(1) status light.

use clap::Parser;

use nliten_lib::shutdown::Shutdown;

mod cli;

#[derive(Parser)]
#[command(
    name = "nliten",
    version,
    about = "Monitor an Enphase solar array with a blink(1) status light"
)]
struct Args {
    #[command(flatten)]
    global: cli::GlobalArgs,

    #[command(subcommand)]
    command: cli::Command,
}

fn main() {
    let args = Args::parse();

    let shutdown = Shutdown::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.trigger()).ok();
    }

    if let Err(e) = cli::run(args.global, args.command, &shutdown) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
