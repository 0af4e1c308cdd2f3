//! External programs: the decontamination pipeline and command execution

pub mod pipeline;
pub mod traits;

pub use pipeline::PipelineInvoker;
pub use traits::{CommandExecutor, CommandOutput, ExternalCommand, SystemExecutor};

#[cfg(test)]
pub(crate) use traits::fake;
