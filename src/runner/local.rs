use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use backend::{Config, QueueStatus, Runner};
use merge::{FieldPolicy, MergePolicy, Reconcile};

use crate::exec::{run_cmd, ScriptBuilder};
use crate::fs::Fs;

const LOCAL_POLICY: MergePolicy = MergePolicy::new(&[
    ("shell", FieldPolicy::Skip),
    ("nn", FieldPolicy::Skip),
    ("prefix", FieldPolicy::Skip),
    ("queueid", FieldPolicy::TakeOnChange),
    ("exelines", FieldPolicy::TakeOnChange),
]);

/// Runs staged commands on this machine and waits for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRunner {
    pub shell: String,
    /// node share reported to bundlers
    pub nn: u32,
    pub prefix: Vec<String>,
    pub exelines: Vec<String>,
    pub queueid: Vec<String>,
}

impl LocalRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            shell: config.shell.clone(),
            nn: 1,
            prefix: Vec::new(),
            exelines: Vec::new(),
            queueid: Vec::new(),
        }
    }
}

impl Reconcile for LocalRunner {
    const MERGE_POLICY: MergePolicy = LOCAL_POLICY;
}

impl Runner for LocalRunner {
    /// Nothing is ever left running once `submit` returns.
    fn check_status(&self) -> QueueStatus {
        QueueStatus::Ok
    }

    fn add_task(&mut self, cmd: &str) {
        self.exelines.push(cmd.to_owned());
    }

    fn add_command(&mut self, cmd: &str) {
        self.exelines.push(cmd.to_owned());
    }

    fn pending(&self) -> &[String] {
        &self.exelines
    }

    fn submit(&mut self, dir: &Path, jobname: &str) -> Result<Option<PathBuf>> {
        if self.exelines.is_empty() {
            return Ok(None);
        }
        let fs = Fs::new(dir, false);
        let script_name = format!("{jobname}.sh");
        let script = dir.join(&script_name);
        let mut text = String::with_capacity(256);
        let mut builder = ScriptBuilder::new(&mut text);
        builder.write_prefix();
        builder.write_lines(&self.prefix);
        builder.write_lines(&self.exelines);
        fs.write_script(&script, &text)?;

        let (mut out, mut err) = (PathBuf::with_capacity(128), PathBuf::with_capacity(128));
        fs.stdout(jobname, &mut out);
        fs.stderr(jobname, &mut err);

        let mut cmd = Command::new(&self.shell);
        cmd.arg(&script_name).current_dir(dir);
        let success = run_cmd(&mut cmd, &out, &err, &fs, false)?;
        if !success {
            log::warn!("{jobname}: local run exited with an error; see {err:?}");
        }

        let qid = format!("local.{}", self.queueid.len());
        log::info!("{jobname}: ran as {qid}");
        self.queueid.push(qid);
        self.exelines.clear();
        Ok(Some(script))
    }

    fn release_commands(&mut self) -> Vec<String> {
        std::mem::take(&mut self.exelines)
    }

    fn queueid(&self) -> &[String] {
        &self.queueid
    }

    fn push_queueid(&mut self, qid: &str) {
        self.queueid.push(qid.to_owned());
    }

    fn nodes(&self) -> u32 {
        self.nn
    }
}
