pub mod config;
pub mod reset;
pub mod run;
pub mod stage;
pub mod status;
pub mod template;
