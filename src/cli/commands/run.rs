use clap::Args;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crate::cli::commands::stage::{print_json, print_report};
use crate::cli::output::*;
use crate::cli::{Context, StageFailure};
use crate::core::{SequencingVariant, StageOptions};
use crate::utils::progress::{create_spinner, hidden_spinner};

#[derive(Args)]
pub struct RunArgs {
    /// Submission name
    #[arg(value_name = "SUBMISSION")]
    pub name: String,

    /// Keep going until every stage has completed or one fails
    #[arg(short, long)]
    pub all: bool,

    /// Sequencing variant, if the submission has to be created
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<SequencingVariant>,

    /// Fill a new input manifest from the read files in this directory
    #[arg(short, long, value_name = "DIR")]
    pub reads_dir: Option<PathBuf>,

    /// Pre-authenticated upload URL for this submission
    #[arg(long, value_name = "URL")]
    pub par_url: Option<String>,

    /// Skip the content checks on the input manifest
    #[arg(long)]
    pub skip_validation: bool,

    /// Print the stage reports as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: RunArgs, ctx: &Context) -> anyhow::Result<()> {
    let manager = ctx.manager()?;
    let options = StageOptions {
        variant: args.variant,
        reads_dir: args.reads_dir.clone(),
        par_url: args.par_url.clone(),
        skip_validation: args.skip_validation,
        ..Default::default()
    };

    let mut reports = Vec::new();
    while let Some(handle) = manager.run_next(&args.name, &options)? {
        let spinner = if args.json {
            hidden_spinner()
        } else {
            create_spinner(&format!(
                "Stage {} ({}) of {}...",
                handle.stage().number(),
                handle.stage().description(),
                args.name
            ))
        };
        while !handle.is_finished() {
            thread::sleep(Duration::from_millis(200));
        }
        spinner.finish_and_clear();

        let report = handle.join();
        if !args.json {
            print_report(&report);
        }
        let failed = !report.is_success();
        reports.push(report);

        if failed || !args.all {
            break;
        }
    }

    if args.json {
        print_json(&reports)?;
    } else if reports.is_empty() {
        success(&format!("Every stage of {} has completed", args.name));
    }

    match reports.pop() {
        Some(report) if !report.is_success() => Err(StageFailure(report).into()),
        _ => Ok(()),
    }
}
