use clap::Args;

use crate::cli::commands::stage::print_json;
use crate::cli::output::*;
use crate::cli::Context;
use crate::stage::{StageState, SubmissionStatus};

#[derive(Args)]
pub struct StatusArgs {
    /// Submission name
    #[arg(value_name = "SUBMISSION")]
    pub name: String,

    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,

    /// Also print the pipeline's log
    #[arg(long)]
    pub log: bool,
}

#[derive(Args)]
pub struct ListArgs {
    /// Print the submissions as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: StatusArgs, ctx: &Context) -> anyhow::Result<()> {
    let manager = ctx.manager()?;
    let status = manager.status(&args.name)?;

    if args.json {
        print_json(&status)?;
    } else {
        print_status(&status);
    }

    if args.log {
        match manager.pipeline_log(&args.name)? {
            Some(log) => {
                section_header("Pipeline log");
                print!("{}", log);
            }
            None => empty("The pipeline has not written a log yet"),
        }
    }

    Ok(())
}

fn print_status(status: &SubmissionStatus) {
    section_header(&format!("Submission {}", status.submission));

    for (i, stage) in status.stages.iter().enumerate() {
        let is_last = i == status.stages.len() - 1;
        let label = format!("{}. {}", stage.stage.number(), stage.stage.description());
        let mut value = state_label(stage.state).to_string();
        if let Some(updated_at) = stage.updated_at {
            value = format!("{} ({})", value, updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        tree_item(is_last, &label, Some(&value));

        if let (StageState::Error, Some(failure)) = (stage.state, &stage.failure) {
            let continued = if is_last { "   " } else { "│  " };
            println!("{}└─ {}: {}", continued, failure.reason, failure.detail);
        }
    }

    match status.next_stage {
        Some(next) => action(&format!("Next: catsup {} {}", next, status.submission)),
        None => success("Every stage has completed"),
    }
}

pub fn list(args: ListArgs, ctx: &Context) -> anyhow::Result<()> {
    let manager = ctx.manager()?;
    let submissions = manager.list_submissions()?;

    if args.json {
        return print_json(&submissions);
    }

    if submissions.is_empty() {
        empty(&format!("No submissions in {}", manager.base_dir().display()));
        return Ok(());
    }

    let mut table = create_standard_table();
    table.set_header(vec![
        header_cell("Submission"),
        header_cell("Modified"),
        header_cell("Stage"),
        header_cell("State"),
        header_cell("Next"),
    ]);
    for entry in &submissions {
        let current = entry.status.current_stage;
        table.add_row(vec![
            entry.name.clone(),
            entry.modified.format("%Y-%m-%d %H:%M").to_string(),
            current.to_string(),
            entry.status.state_of(current).to_string(),
            entry
                .status
                .next_stage
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{}", table);

    Ok(())
}
