use clap::Parser;
use colored::*;
use std::process;
use tracing_subscriber::EnvFilter;

use catsup::cli::{self, Cli, Commands, StageFailure};
use catsup::stage::Stage;
use catsup::CatsupError;

fn main() {
    let cli = Cli::parse();

    // CATSUP_LOG sets the level unless RUST_LOG gives a full filter
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let log_level = std::env::var("CATSUP_LOG").unwrap_or_else(|_| default_level.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);

        let exit_code = if let Some(err) = e.downcast_ref::<CatsupError>() {
            cli::exit_code(err.kind())
        } else if let Some(StageFailure(report)) = e.downcast_ref::<StageFailure>() {
            cli::exit_code(report.reason.as_deref().unwrap_or_default())
        } else {
            1
        };
        process::exit(exit_code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = cli.context();

    match cli.command {
        Commands::Template(args) => cli::commands::template::run(args, &ctx),
        Commands::Prepare(args) => cli::commands::stage::run(Stage::Prepare, args, &ctx),
        Commands::Pipeline(args) => cli::commands::stage::run(Stage::Pipeline, args, &ctx),
        Commands::Upload(args) => cli::commands::stage::run(Stage::Upload, args, &ctx),
        Commands::Run(args) => cli::commands::run::run(args, &ctx),
        Commands::Status(args) => cli::commands::status::run(args, &ctx),
        Commands::List(args) => cli::commands::status::list(args, &ctx),
        Commands::Reset(args) => cli::commands::reset::run(args, &ctx),
        Commands::Config(args) => cli::commands::config::run(args, &ctx),
    }
}
