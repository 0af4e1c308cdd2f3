use clap::Args;

use crate::cli::output::*;
use crate::cli::Context;
use crate::stage::Stage;

#[derive(Args)]
pub struct ResetArgs {
    /// Submission name
    #[arg(value_name = "SUBMISSION")]
    pub name: String,

    /// Stage to reset (template, prepare, pipeline, upload or 1-4)
    #[arg(value_name = "STAGE")]
    pub stage: Stage,
}

pub fn run(args: ResetArgs, ctx: &Context) -> anyhow::Result<()> {
    let manager = ctx.manager()?;
    manager.reset(&args.name, args.stage)?;

    success(&format!(
        "Reset stage {} ({}) of {}",
        args.stage.number(),
        args.stage.description(),
        args.name
    ));
    Ok(())
}
