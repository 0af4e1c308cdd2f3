use clap::Args;

use crate::cli::output::*;
use crate::cli::Context;
use crate::core::StageOptions;
use crate::stage::{Stage, StageReport};
use crate::utils::progress::{create_spinner, hidden_spinner};

#[derive(Args)]
pub struct StageArgs {
    /// Submission name
    #[arg(value_name = "SUBMISSION")]
    pub name: String,

    /// Run the stage again even though it already completed
    #[arg(short, long)]
    pub force: bool,

    /// Skip the content checks on the input manifest (prepare)
    #[arg(long)]
    pub skip_validation: bool,

    /// Pre-authenticated upload URL, overriding the submission's own (upload)
    #[arg(long, value_name = "URL")]
    pub par_url: Option<String>,

    /// Print the stage report as JSON
    #[arg(long)]
    pub json: bool,
}

impl StageArgs {
    pub fn options(&self) -> StageOptions {
        StageOptions {
            force: self.force,
            skip_validation: self.skip_validation,
            par_url: self.par_url.clone(),
            ..Default::default()
        }
    }
}

pub fn run(stage: Stage, args: StageArgs, ctx: &Context) -> anyhow::Result<()> {
    let manager = ctx.manager()?;

    let spinner = if args.json {
        hidden_spinner()
    } else {
        create_spinner(&format!("Running {} for {}...", stage.description(), args.name))
    };
    let result = manager.execute(&args.name, stage, &args.options());
    spinner.finish_and_clear();

    let report = StageReport::from_result(&args.name, stage, &result);
    if args.json {
        print_json(&report)?;
    } else if report.is_success() {
        print_report(&report);
    } else if stage == Stage::Pipeline {
        let log = manager.layout(&args.name)?.nextflow_log();
        info(&format!("Pipeline log: {}", log.display()));
    }

    result?;
    Ok(())
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Human-readable outcome of one stage run
pub(crate) fn print_report(report: &StageReport) {
    if report.is_success() {
        success(&format!(
            "Stage {} ({}) of {} completed",
            report.stage.number(),
            report.stage.description(),
            report.submission
        ));
        if let Some(next) = report.stage.next() {
            action(&format!("Next: catsup {} {}", next, report.submission));
        }
    } else {
        error(&format!(
            "Stage {} ({}) of {} failed",
            report.stage.number(),
            report.stage.description(),
            report.submission
        ));
        if let Some(reason) = &report.reason {
            tree_item(report.detail.is_none(), "Reason", Some(reason));
        }
        if let Some(detail) = &report.detail {
            tree_item(true, "Detail", Some(detail));
        }
    }
}
