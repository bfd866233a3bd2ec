/// High-level command line app
mod app;
/// Definition of command-line args
mod args;
/// Aggregating staged jobs into batch submissions
mod bundler;
/// Subprocesses, scripts and the polling driver
mod exec;
/// Filesystem operations
mod fs;
/// Persisted job managers
mod manager;
/// Concrete runners
mod runner;
/// Combined command-line run settings
mod settings;
/// Text UI
mod ui;

mod invalidate;

pub use backend::{
    resolve_status, CollectStatus, Config, JobFiles, Launch, QueueStatus, Reader, Record, Runner,
    Status, Writer,
};
pub use merge::{FieldPolicy, MergePolicy, MergeReport, MergeWarning, Reconcile};

pub use bundler::{BundleSubmission, Bundler};
pub use exec::{Driver, Summary};
pub use fs::{read_record, Fs, StateFile, STATE_VERSION};
pub use manager::{Job, JobId, JobStatus, Manager, Stage, Step};
pub use runner::{parse_qstat, parse_queueid, LocalRunner, PbsRunner};

// exported for tests:
pub use app::App;
pub use args::{Args, Command};
pub use settings::Settings;

/// Error types, by module.
pub mod error {
    pub use crate::app::Error as AppError;
    pub use crate::fs::Error as FsError;
    pub use crate::manager::Error as ManagerError;
    pub use crate::runner::Error as RunnerError;
    pub use crate::settings::Error as SettingsError;
}

/// Run the command-line app.
pub fn run() -> Result<(), anyhow::Error> {
    use clap::Parser;
    let args = Args::parse();

    // INTERPRET SETTINGS ///////////////
    let settings: Settings = args.try_into()?;

    let log_level = match settings.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    simple_logging::log_to_stderr(log_level);

    // RUN THE THING /////////////////
    let app = App::new(settings);
    app.run()?;

    Ok(())
}
