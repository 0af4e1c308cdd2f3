use clap::Args;
use std::path::PathBuf;

use crate::cli::commands::stage::print_json;
use crate::cli::output::*;
use crate::cli::Context;
use crate::core::{SequencingVariant, StageOptions};
use crate::stage::{Stage, StageReport};

#[derive(Args)]
pub struct TemplateArgs {
    /// Submission name; becomes the submission directory
    #[arg(value_name = "SUBMISSION")]
    pub name: String,

    /// Sequencing variant (illumina-paired, illumina-single, nanopore)
    #[arg(long, value_name = "VARIANT")]
    pub variant: Option<SequencingVariant>,

    /// Fill the manifest from the read files in this directory
    #[arg(short, long, value_name = "DIR")]
    pub reads_dir: Option<PathBuf>,

    /// Pre-authenticated upload URL for this submission
    #[arg(long, value_name = "URL")]
    pub par_url: Option<String>,

    /// Print the stage report as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: TemplateArgs, ctx: &Context) -> anyhow::Result<()> {
    let manager = ctx.manager()?;
    let options = StageOptions {
        variant: args.variant,
        reads_dir: args.reads_dir.clone(),
        par_url: args.par_url.clone(),
        ..Default::default()
    };

    let result = manager.execute(&args.name, Stage::Template, &options);
    let report = StageReport::from_result(&args.name, Stage::Template, &result);
    result?;

    if args.json {
        return print_json(&report);
    }

    let layout = manager.layout(&args.name)?;
    success(&format!("Created submission {}", args.name));
    tree_item(false, "Directory", Some(&layout.root().display().to_string()));
    tree_item(
        false,
        "Variant",
        Some(args.variant.unwrap_or(manager.config().general.default_variant).as_str()),
    );
    tree_item(true, "Input manifest", Some(&layout.inputs_csv().display().to_string()));
    if args.reads_dir.is_none() {
        info("The manifest holds example rows; edit it to describe your samples");
    }
    action(&format!("Next: catsup prepare {}", args.name));

    Ok(())
}
