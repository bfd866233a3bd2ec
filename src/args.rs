use clap::{ArgAction, Parser, Subcommand};

const CMD_NAME: &str = "ag";
const DEFAULT_DIR: &str = ".";

/// Stores our command-line args format.
#[derive(Parser, Debug)]
#[command(name = CMD_NAME, version, about = "Inspect and edit persisted job managers", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Bypass user confirmation
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// Print additional info (repeat for more)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Dry run; print info but don't modify anything.
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Summarize one or more state files
    Info {
        #[arg(value_name = "STATE", required = true)]
        states: Vec<String>,
    },
    /// Append a queue id to a manager's runner
    Queueid {
        #[arg(value_name = "STATE")]
        state: String,
        #[arg(value_name = "ID")]
        id: String,
    },
    /// Set an existing field of a manager, e.g. `runner.walltime 2:00:00`
    Set {
        #[arg(value_name = "STATE")]
        state: String,
        #[arg(value_name = "FIELD")]
        field: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },
    /// Mark managers incomplete so they regenerate input and rerun
    Invalidate {
        #[arg(value_name = "STATE", required = true)]
        states: Vec<String>,
    },
    /// List the status of every state file in a directory
    Status {
        #[arg(value_name = "DIR", default_value = DEFAULT_DIR)]
        #[arg(env = "AUTOGEN_DIR")]
        dir: String,
    },
}
