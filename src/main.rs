use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;

use solarpi::cli::{self, Cli};

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Cli::parse();
    init_logging(&args.log_level);
    log::info!("☀️  SolarPi v{}", solarpi::VERSION);

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Cli) -> anyhow::Result<()> {
    cli::execute(args)
        .await
        .with_context(|| format!("{:?} failed", args.command()))
}
