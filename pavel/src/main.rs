use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgMatches;
use pavel_core::config::{ConsumerConfig, DEFAULT_OFFSET, ProducerConfig, Settings};
use tracing::{error, info};

mod cmdline;
mod setup_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    setup_tracing::register();

    let matches = cmdline::root_cli().get_matches();
    if let Err(e) = run(&matches).await {
        error!("Error: {e}");
        return ExitCode::FAILURE;
    }
    info!("Exiting...");
    ExitCode::SUCCESS
}

async fn run(matches: &ArgMatches) -> pavel_core::Result<()> {
    let settings = Settings::load(std::env::vars())?;

    match matches.subcommand() {
        Some(("produce", args)) => {
            let config = ProducerConfig::new(
                required(args, "broker"),
                required(args, "topic"),
                args.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
                settings,
            )?;
            pavel_core::produce(config).await?;
        }
        Some(("consume", args)) => {
            let offset = args
                .get_one::<String>("offset")
                .map_or(DEFAULT_OFFSET, String::as_str);
            let config = ConsumerConfig::new(
                required(args, "broker"),
                required(args, "topic"),
                args.get_one::<PathBuf>("file").cloned(),
                args.get_flag("listen"),
                offset,
                settings,
            )?;
            pavel_core::consume(config).await?;
        }
        other => {
            return Err(pavel_core::Error::Config(format!(
                "Unknown command {:?}",
                other.map(|(name, _)| name)
            )));
        }
    }
    Ok(())
}

// clap rejects the command line when a required argument is missing, the empty fallback is
// caught by config validation.
fn required<'a>(args: &'a ArgMatches, id: &str) -> &'a str {
    args.get_one::<String>(id).map_or("", String::as_str)
}
