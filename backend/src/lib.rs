/// Queue, job and collect statuses, and the status resolver
mod status;
pub use status::{resolve_status, CollectStatus, QueueStatus, Status};

/// Contracts for the collaborators a manager drives
mod traits;
pub use traits::{Launch, Reader, Runner, Writer};

/// File names derived from a job name
mod files;
pub use files::JobFiles;

/// Flat result records
mod record;
pub use record::Record;

/// Executable locations and queue commands
mod config;
pub use config::Config;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No executable configured for \"{0}\"")]
    UnknownExecutable(String),
}
