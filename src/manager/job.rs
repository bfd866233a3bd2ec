use std::path::PathBuf;

use anyhow::Result;

use backend::{CollectStatus, Reader, Record, Runner, Writer};

use crate::exec::ScriptBuilder;

use super::{JobId, JobStatus, Manager, Step};

/// A manager with its collaborator types erased, so drivers and bundlers
/// can hold jobs of different kinds together.
pub trait Job {
    fn id(&self) -> &JobId;
    fn logname(&self) -> String;
    fn nextstep(&mut self) -> Result<Step>;
    fn collect(&mut self) -> Result<CollectStatus>;
    fn status(&self) -> JobStatus;
    fn export_record(&self) -> Record;

    /// True if staged commands are left for a bundler.
    fn is_bundled(&self) -> bool;

    /// True if commands are staged and waiting for submission.
    fn run_ready(&self) -> bool;

    /// Nodes the staged commands need.
    fn nodes(&self) -> u32;

    /// Write the staged commands to `<path>/<name>.sh` and return its path.
    fn write_script(&self) -> Result<PathBuf>;

    /// Hand over the staged commands. Call `save` to persist.
    fn release_commands(&mut self) -> Vec<String>;

    /// Record a queue id from a submission made on our behalf. Call `save` to persist.
    fn update_queueid(&mut self, qid: &str);

    fn save(&self) -> Result<()>;
}

impl<W, R, Q, P> Job for Manager<W, R, Q, P>
where
    W: Writer,
    R: Reader,
    Q: Runner,
    P: Reader,
{
    fn id(&self) -> &JobId {
        &self.id
    }

    fn logname(&self) -> String {
        Manager::logname(self)
    }

    fn nextstep(&mut self) -> Result<Step> {
        Manager::nextstep(self)
    }

    fn collect(&mut self) -> Result<CollectStatus> {
        Manager::collect(self)
    }

    fn status(&self) -> JobStatus {
        Manager::status(self)
    }

    fn export_record(&self) -> Record {
        Manager::export_record(self)
    }

    fn is_bundled(&self) -> bool {
        self.bundle
    }

    fn run_ready(&self) -> bool {
        !self.runner.pending().is_empty()
            || self
                .properties
                .as_ref()
                .is_some_and(|stage| !stage.runner.pending().is_empty())
    }

    fn nodes(&self) -> u32 {
        let primary = (!self.runner.pending().is_empty()).then(|| self.runner.nodes());
        let stage = self
            .properties
            .as_ref()
            .filter(|stage| !stage.runner.pending().is_empty())
            .map(|stage| stage.runner.nodes());
        primary.into_iter().chain(stage).max().unwrap_or(1)
    }

    fn write_script(&self) -> Result<PathBuf> {
        let mut text = String::with_capacity(256);
        let mut builder = ScriptBuilder::new(&mut text);
        builder.write_prefix();
        builder.write_lines(self.runner.pending());
        if let Some(stage) = &self.properties {
            builder.write_lines(stage.runner.pending());
        }
        let script = self.path_of(&self.files().script);
        self.fs().write_script(&script, &text)?;
        Ok(script)
    }

    fn release_commands(&mut self) -> Vec<String> {
        let mut commands = self.runner.release_commands();
        if let Some(stage) = self.properties.as_mut() {
            commands.extend(stage.runner.release_commands());
        }
        commands
    }

    fn update_queueid(&mut self, qid: &str) {
        self.runner.push_queueid(qid);
        if let Some(stage) = self.properties.as_mut().filter(|stage| !stage.completed) {
            stage.runner.push_queueid(qid);
        }
    }

    fn save(&self) -> Result<()> {
        Manager::save(self)
    }
}
