#![allow(dead_code)]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use autogen::{
    CollectStatus, FieldPolicy, JobFiles, Launch, Manager, MergePolicy, QueueStatus, Reader,
    Reconcile, Record, Runner, Writer,
};

pub type TestManager = Manager<MockWriter, ScriptedReader, MockQueue>;

/// Writes a one-line-per-parameter input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockWriter {
    pub completed: bool,
    /// physics parameter: changing it would need a rerun
    pub basis: String,
    pub maxcycle: u32,
    pub restart: bool,
    pub guess: Option<String>,
    pub levshift: bool,
    pub needs_trial: bool,
    pub trial_energy: Option<f64>,
}

impl Default for MockWriter {
    fn default() -> Self {
        Self {
            completed: false,
            basis: "vtz".to_owned(),
            maxcycle: 100,
            restart: false,
            guess: None,
            levshift: false,
            needs_trial: false,
            trial_energy: None,
        }
    }
}

impl Reconcile for MockWriter {
    const MERGE_POLICY: MergePolicy = MergePolicy::new(&[
        ("maxcycle", FieldPolicy::Skip),
        ("needs_trial", FieldPolicy::Skip),
        ("completed", FieldPolicy::TakeOnChange),
        ("restart", FieldPolicy::TakeOnChange),
        ("guess", FieldPolicy::TakeOnChange),
        ("levshift", FieldPolicy::TakeOnChange),
        ("trial_energy", FieldPolicy::TakeOnChange),
    ]);
}

impl Writer for MockWriter {
    fn completed(&self) -> bool {
        self.completed
    }

    fn invalidate(&mut self) {
        self.completed = false;
    }

    fn write_input(&mut self, dir: &Path, files: &JobFiles) -> Result<()> {
        let text = format!(
            "basis {}\nmaxcycle {}\nrestart {}\nguess {:?}\nlevshift {}\ntrial {:?}\n",
            self.basis, self.maxcycle, self.restart, self.guess, self.levshift, self.trial_energy
        );
        std::fs::write(dir.join(&files.input), text)?;
        self.completed = true;
        Ok(())
    }

    fn launch(&self, files: &JobFiles) -> Launch {
        Launch::task(format!("mock {} > {}", files.input, files.output))
            .with_setup(format!("cp {} INPUT", files.input))
    }

    fn launch_properties(&self, files: &JobFiles) -> Option<Launch> {
        Some(Launch::task(format!("mockprops > {}", files.properties_output)))
    }

    fn checkpoints(&self) -> Vec<String> {
        vec!["fort.79".to_owned()]
    }

    fn prepare_restart(&mut self, dir: &Path, _files: &JobFiles, _attempt: u32) -> Result<()> {
        self.restart = true;
        if dir.join("fort.79").exists() {
            self.guess = Some("fort.79".to_owned());
        }
        Ok(())
    }

    fn apply_convergence_aid(&mut self) -> bool {
        self.levshift = true;
        true
    }

    fn remove_convergence_aid(&mut self) {
        self.levshift = false;
    }

    fn needs_dependency(&self) -> bool {
        self.needs_trial && self.trial_energy.is_none()
    }

    fn accept_dependency(&mut self, record: &Record) -> Result<()> {
        let energy = record
            .get("total_energy")
            .and_then(Value::as_f64)
            .ok_or_else(|| anyhow!("dependency record has no total_energy"))?;
        self.trial_energy = Some(energy);
        self.completed = false;
        Ok(())
    }

    fn parameters(&self) -> Record {
        let mut record = Record::new();
        record.insert("basis", self.basis.clone());
        record.insert("restart", self.restart);
        record
    }
}

/// Judges an output file by its first line (`ok`, `restart` or `killed`);
/// later `key=value` lines become outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedReader {
    pub completed: bool,
    pub output: Map<String, Value>,
    pub errtol: f64,
}

impl Reconcile for ScriptedReader {
    const MERGE_POLICY: MergePolicy = MergePolicy::new(&[
        ("errtol", FieldPolicy::Skip),
        ("completed", FieldPolicy::TakeOnChange),
        ("output", FieldPolicy::TakeOnChange),
    ]);
}

impl Reader for ScriptedReader {
    fn collect(&mut self, outfile: &Path) -> Result<CollectStatus> {
        let text = std::fs::read_to_string(outfile)?;
        let mut lines = text.lines();
        let verdict = match lines.next().map(str::trim) {
            Some("ok") => CollectStatus::Ok,
            Some("restart") => CollectStatus::Restart,
            Some("killed") => CollectStatus::Killed,
            other => bail!("unreadable output {other:?}"),
        };
        for line in lines {
            if let Some((key, value)) = line.split_once('=') {
                let value = serde_json::from_str(value).unwrap_or(Value::String(value.to_owned()));
                self.output.insert(key.to_owned(), value);
            }
        }
        self.completed = verdict == CollectStatus::Ok;
        Ok(verdict)
    }

    fn completed(&self) -> bool {
        self.completed
    }

    fn invalidate(&mut self) {
        self.completed = false;
    }

    fn output(&self) -> &Map<String, Value> {
        &self.output
    }
}

/// An in-process queue. On submission it can play the job by writing
/// `on_submit` to `<jobname>.o`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockQueue {
    pub running: bool,
    pub fail: bool,
    pub nn: u32,
    pub on_submit: Option<String>,
    pub exelines: Vec<String>,
    pub queueid: Vec<String>,
    pub submissions: u32,
}

impl MockQueue {
    pub fn new() -> Self {
        Self {
            nn: 1,
            ..Self::default()
        }
    }

    pub fn playing(text: &str) -> Self {
        Self {
            on_submit: Some(text.to_owned()),
            ..Self::new()
        }
    }
}

impl Reconcile for MockQueue {
    const MERGE_POLICY: MergePolicy = MergePolicy::new(&[
        ("running", FieldPolicy::Skip),
        ("fail", FieldPolicy::Skip),
        ("nn", FieldPolicy::Skip),
        ("on_submit", FieldPolicy::Skip),
        ("exelines", FieldPolicy::TakeOnChange),
        ("queueid", FieldPolicy::TakeOnChange),
        ("submissions", FieldPolicy::TakeOnChange),
    ]);
}

impl Runner for MockQueue {
    fn check_status(&self) -> QueueStatus {
        if self.running {
            QueueStatus::Running
        } else {
            QueueStatus::Ok
        }
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
        if self.fail {
            bail!("queue is down");
        }
        if let Some(text) = &self.on_submit {
            std::fs::write(dir.join(format!("{jobname}.o")), text)?;
        }
        self.submissions += 1;
        self.queueid.push(format!("{}", 100 + self.submissions));
        self.exelines.clear();
        Ok(Some(dir.join(format!("{jobname}.qsub"))))
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

/// A fresh manager configuration for `dir/job`.
pub fn manager(dir: &Path, runner: MockQueue) -> TestManager {
    Manager::new(
        "job",
        dir,
        MockWriter::default(),
        ScriptedReader::default(),
        runner,
    )
    .with_kind("MockManager")
}

/// Parsed state file of `dir/<name>.json`.
pub fn state_json(dir: &Path, name: &str) -> Result<Value> {
    let text = std::fs::read_to_string(dir.join(format!("{name}.json")))?;
    Ok(serde_json::from_str(&text)?)
}

/// A stand-in queue command, run through `sh`.
pub fn fake_command(dir: &Path, name: &str, body: &str) -> Result<String> {
    let path = dir.join(name);
    std::fs::write(&path, format!("{body}\n"))?;
    Ok(format!("sh {}", path.display()))
}
