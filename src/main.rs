//! Lockdown command-line entry point.

use clap::Parser;

use lockdown::cli::{args::Args, commands};
use lockdown::constants;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("lockdown=info"))
        .init();

    let args = Args::parse();
    log::debug!("{} v{} starting", constants::APP_NAME, constants::APP_VERSION);

    commands::run(args.config_dir, &args.command)
}
