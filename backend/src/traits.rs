use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use merge::Reconcile;

use crate::{CollectStatus, JobFiles, QueueStatus, Record};

/// Shell commands that start one backend run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Launch {
    /// Plain commands run before the task (e.g. copying the input into place).
    pub setup: Vec<String>,
    /// The backend invocation itself.
    pub task: String,
}

impl Launch {
    pub fn task(task: impl Into<String>) -> Self {
        Self {
            setup: Vec::new(),
            task: task.into(),
        }
    }

    pub fn with_setup(mut self, cmd: impl Into<String>) -> Self {
        self.setup.push(cmd.into());
        self
    }
}

/// Runs batches of shell commands, on a queue or locally.
pub trait Runner: Reconcile {
    /// Ask the queue whether any of this runner's jobs are still queued or running.
    fn check_status(&self) -> QueueStatus;

    /// Accumulate a command that launches a (possibly parallel) backend.
    fn add_task(&mut self, cmd: &str);

    /// Accumulate a plain shell command.
    fn add_command(&mut self, cmd: &str);

    /// Commands accumulated but not yet submitted.
    fn pending(&self) -> &[String];

    /// Submit the accumulated commands from `dir`.
    ///
    /// Returns the submitted script, or `None` if there was nothing to run.
    /// On error the runner is left as it was.
    fn submit(&mut self, dir: &Path, jobname: &str) -> Result<Option<PathBuf>>;

    /// Hand over the accumulated commands to someone else (a bundler).
    fn release_commands(&mut self) -> Vec<String>;

    /// Queue ids of past submissions, oldest first.
    fn queueid(&self) -> &[String];

    fn push_queueid(&mut self, qid: &str);

    /// Number of nodes this runner asks for.
    fn nodes(&self) -> u32;
}

/// Parses one output artifact and judges whether it is a complete result.
pub trait Reader: Reconcile {
    /// Parse `outfile`; sets `completed` iff the verdict is `Ok`.
    fn collect(&mut self, outfile: &Path) -> Result<CollectStatus>;

    fn completed(&self) -> bool;

    /// Forget the verdict so the next run is collected again.
    fn invalidate(&mut self);

    /// Parsed quantities.
    fn output(&self) -> &Map<String, Value>;
}

/// Produces backend input from parameters.
pub trait Writer: Reconcile {
    /// True if the input on disk matches the current parameters.
    fn completed(&self) -> bool;

    /// Force the input to be regenerated.
    fn invalidate(&mut self);

    /// Write the input artifacts into `dir`, staging any restart guesses.
    /// Sets `completed`.
    fn write_input(&mut self, dir: &Path, files: &JobFiles) -> Result<()>;

    /// Commands that run the primary calculation.
    fn launch(&self, files: &JobFiles) -> Launch;

    /// Commands that run the properties stage, if the backend has one.
    fn launch_properties(&self, _files: &JobFiles) -> Option<Launch> {
        None
    }

    /// Files produced by a run that are worth archiving on restart.
    fn checkpoints(&self) -> Vec<String> {
        Vec::new()
    }

    /// Change parameters after a failed attempt (e.g. restart from a checkpoint).
    fn prepare_restart(&mut self, _dir: &Path, _files: &JobFiles, _attempt: u32) -> Result<()> {
        Ok(())
    }

    /// Apply a temporary convergence aid. Returns false if the backend has none.
    fn apply_convergence_aid(&mut self) -> bool {
        false
    }

    fn remove_convergence_aid(&mut self) {}

    /// True while this writer still needs the record of the job it depends on.
    fn needs_dependency(&self) -> bool {
        false
    }

    fn accept_dependency(&mut self, _record: &Record) -> Result<()> {
        Ok(())
    }

    /// Parameters reported in the job's record.
    fn parameters(&self) -> Record {
        Record::default()
    }
}
