/// Run a subprocess
mod run_cmd;
pub use run_cmd::{capture, command_line, run_cmd};

/// Building shell and PBS scripts
mod script_builder;
pub use script_builder::ScriptBuilder;

/// One polling cycle over many jobs
mod driver;
pub use driver::{Driver, Summary};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Empty command line")]
    EmptyCommand,
    #[error("Cannot attach to child process output")]
    NoChildPipe,
    #[error("Error communicating with child process")]
    Communicate,
}
