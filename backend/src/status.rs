use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Reader, Runner};

/// What the queue says about a runner's jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// queued or executing
    Running,
    /// nothing of ours is in the queue
    Ok,
    /// the queue could not be asked
    Error,
}

/// Phase of a job, as seen from its runner, reader and output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Done,
    Running,
    NotStarted,
    ReadyForAnalysis,
}

/// A reader's verdict on one output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectStatus {
    /// converged and complete
    Ok,
    /// incomplete or not converged; rerun
    Restart,
    /// the process was killed before finishing
    Killed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Done => "done",
            Self::Running => "running",
            Self::NotStarted => "not_started",
            Self::ReadyForAnalysis => "ready_for_analysis",
        };
        f.write_str(s)
    }
}

impl fmt::Display for CollectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Restart => "restart",
            Self::Killed => "killed",
        };
        f.write_str(s)
    }
}

/// Combine reader, queue and output file into a single job phase.
///
/// The queue is only consulted if the reader isn't done, and the output
/// file is only looked at if the queue isn't running anything.
pub fn resolve_status<Q: Runner, R: Reader>(runner: &Q, reader: &R, outfile: &Path) -> Status {
    if reader.completed() {
        return Status::Done;
    }

    match runner.check_status() {
        QueueStatus::Running => return Status::Running,
        QueueStatus::Error => {
            log::warn!("queue status unavailable; treating job as not running");
        }
        QueueStatus::Ok => (),
    }

    if !outfile.exists() {
        Status::NotStarted
    } else {
        Status::ReadyForAnalysis
    }
}
