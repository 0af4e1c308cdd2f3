use clap::{Args, Subcommand};
use std::fs;

use crate::cli::output::*;
use crate::cli::Context;
use crate::core::config::{example_config, load_config};
use crate::core::paths;
use crate::CatsupError;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Write an example configuration file
    Init {
        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Check that the configuration can drive every stage
    Check,

    /// Show where catsup reads and writes its files
    Paths,
}

pub fn run(args: ConfigArgs, ctx: &Context) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Init { force } => init(ctx, force),
        ConfigCommand::Check => check(ctx),
        ConfigCommand::Paths => show_paths(ctx),
    }
}

fn init(ctx: &Context, force: bool) -> anyhow::Result<()> {
    let path = &ctx.config_path;
    if path.exists() && !force {
        return Err(CatsupError::AlreadyExists(format!(
            "{} exists (use --force to overwrite)",
            path.display()
        ))
        .into());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, example_config())?;

    success(&format!("Wrote example configuration to {}", path.display()));
    info("Edit the pipeline and upload sections, then run: catsup config check");
    Ok(())
}

fn check(ctx: &Context) -> anyhow::Result<()> {
    let path = &ctx.config_path;
    if !path.exists() {
        return Err(CatsupError::Configuration(format!(
            "{} does not exist (create it with: catsup config init)",
            path.display()
        ))
        .into());
    }

    let config = load_config(path)?;
    section_header(&format!("Configuration {}", path.display()));
    tree_item(false, "Pipeline", Some(&config.pipeline.name));
    tree_item(false, "Container", Some(&config.pipeline.container));
    tree_item(
        true,
        "Upload",
        Some(if config.upload.has_destination() { "configured" } else { "not configured" }),
    );

    if let Err(e) = config.validate() {
        if let CatsupError::Configuration(problems) = &e {
            for problem in problems.split("; ") {
                error(problem);
            }
        }
        return Err(e.into());
    }
    if !config.upload.has_destination() {
        warning("No par_url or bucket configured; uploads need one");
    }

    success("Configuration is valid");
    Ok(())
}

fn show_paths(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let submissions = match &ctx.submissions_dir {
        Some(dir) => dir.clone(),
        None => paths::submissions_dir(config.general.submissions_dir.as_deref()),
    };

    section_header("catsup paths");
    tree_item(false, "Home", Some(&paths::catsup_home().display().to_string()));
    tree_item(false, "Config", Some(&ctx.config_path.display().to_string()));
    tree_item(true, "Submissions", Some(&submissions.display().to_string()));
    Ok(())
}
