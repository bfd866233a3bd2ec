use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use backend::{JobFiles, Launch, Reader, Runner, Writer};
use merge::{FieldPolicy, MergePolicy, MergeWarning, Reconcile};

use crate::fs::{Fs, StateFile};

/// The per-cycle state machine
mod nextstep;

/// Secondary properties stage
mod properties;

/// Flat result records
mod record;

/// Object-safe view of a manager
mod job;
pub use job::Job;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}: no properties stage is configured")]
    NoPropertiesStage(String),
}

const MANAGER_POLICY: MergePolicy = MergePolicy::new(&[
    ("id", FieldPolicy::Skip),
    ("kind", FieldPolicy::Skip),
    ("bundle", FieldPolicy::Skip),
    ("max_restarts", FieldPolicy::Skip),
    ("trylev", FieldPolicy::Skip),
    ("dependency", FieldPolicy::Skip),
    ("writer", FieldPolicy::Skip),
    ("reader", FieldPolicy::Skip),
    ("runner", FieldPolicy::Skip),
    ("properties", FieldPolicy::Skip),
    ("restarts", FieldPolicy::TakeOnChange),
    ("completed", FieldPolicy::TakeOnChange),
    ("frozen", FieldPolicy::TakeOnChange),
    ("aided", FieldPolicy::TakeOnChange),
]);

const STAGE_POLICY: MergePolicy = MergePolicy::new(&[
    ("reader", FieldPolicy::Skip),
    ("runner", FieldPolicy::Skip),
    ("completed", FieldPolicy::TakeOnChange),
]);

/// Where a manager lives on disk. Never changes after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobId {
    pub name: String,
    pub path: PathBuf,
}

impl JobId {
    pub fn new(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_owned(),
            path: path.into(),
        }
    }

    /// $PATH/name.json
    pub fn state_file(&self) -> PathBuf {
        self.path.join(JobFiles::new(&self.name).state)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.join(&self.name).display())
    }
}

/// What one `nextstep` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// the job this one depends on hasn't exported a completed record yet
    AwaitingDependency,
    /// no input yet, nothing to run
    Idle,
    /// launch commands staged (and submitted unless bundled)
    Enqueued,
    Running,
    /// a failed or aided attempt was archived and rerun
    Restarted,
    /// restart budget exhausted
    Frozen,
    Done,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingDependency => "awaiting dependency",
            Self::Idle => "idle",
            Self::Enqueued => "enqueued",
            Self::Running => "running",
            Self::Restarted => "restarted",
            Self::Frozen => "frozen",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Coarse status reported to drivers and records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Ok,
    NotFinished,
    Frozen,
}

impl JobStatus {
    pub fn from_flags(completed: bool, frozen: bool) -> Self {
        if completed {
            Self::Ok
        } else if frozen {
            Self::Frozen
        } else {
            Self::NotFinished
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::NotFinished => "not_finished",
            Self::Frozen => "frozen",
        };
        f.write_str(s)
    }
}

/// A secondary reader/runner pair run after the primary calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage<P, Q> {
    pub reader: P,
    pub runner: Q,
    pub completed: bool,
}

impl<P: Reader, Q: Runner> Reconcile for Stage<P, Q> {
    const MERGE_POLICY: MergePolicy = STAGE_POLICY;
}

/// Persisted driver of one job: owns its writer, reader and runner,
/// and optionally a properties stage and a dependency on another job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manager<W, R, Q, P = R> {
    id: JobId,
    kind: String,
    bundle: bool,
    max_restarts: u32,
    trylev: bool,
    dependency: Option<JobId>,

    restarts: u32,
    completed: bool,
    frozen: bool,
    aided: bool,

    writer: W,
    reader: R,
    runner: Q,
    properties: Option<Stage<P, Q>>,
}

impl<W, R, Q, P> Reconcile for Manager<W, R, Q, P>
where
    W: Writer,
    R: Reader,
    Q: Runner,
    P: Reader,
{
    const MERGE_POLICY: MergePolicy = MANAGER_POLICY;
}

impl<W: Writer, R: Reader, Q: Runner> Manager<W, R, Q> {
    /// Fresh configuration for a job. Call `open` to merge in persisted state.
    pub fn new(name: &str, path: impl Into<PathBuf>, writer: W, reader: R, runner: Q) -> Self {
        Self {
            id: JobId::new(name, path),
            kind: "Manager".to_owned(),
            bundle: false,
            max_restarts: 5,
            trylev: false,
            dependency: None,
            restarts: 0,
            completed: false,
            frozen: false,
            aided: false,
            writer,
            reader,
            runner,
            properties: None,
        }
    }

    /// Add a properties stage, run after the primary calculation completes.
    pub fn with_properties<P: Reader>(self, reader: P, runner: Q) -> Manager<W, R, Q, P> {
        Manager {
            id: self.id,
            kind: self.kind,
            bundle: self.bundle,
            max_restarts: self.max_restarts,
            trylev: self.trylev,
            dependency: self.dependency,
            restarts: self.restarts,
            completed: self.completed,
            frozen: self.frozen,
            aided: self.aided,
            writer: self.writer,
            reader: self.reader,
            runner: self.runner,
            properties: Some(Stage {
                reader,
                runner,
                completed: false,
            }),
        }
    }
}

impl<W, R, Q, P> Manager<W, R, Q, P>
where
    W: Writer,
    R: Reader,
    Q: Runner,
    P: Reader,
{
    pub fn with_kind(mut self, kind: &str) -> Self {
        self.kind = kind.to_owned();
        self
    }

    /// Leave staged commands for a bundler instead of submitting them.
    pub fn bundled(mut self, bundle: bool) -> Self {
        self.bundle = bundle;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    /// Apply the writer's convergence aid when restarting.
    pub fn with_trylev(mut self, trylev: bool) -> Self {
        self.trylev = trylev;
        self
    }

    /// Wait for the record of `dependency` before writing input.
    pub fn depends_on(mut self, dependency: JobId) -> Self {
        self.dependency = Some(dependency);
        self
    }

    /// Merge persisted state (if any) into this configuration, then persist.
    pub fn open(mut self) -> Result<Self> {
        self.fs().ensure_root_exists()?;
        self.reload()?;
        self.save()?;
        log::info!("{}: opened", self.logname());
        Ok(self)
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn logname(&self) -> String {
        format!("{}@{}", self.kind, self.id)
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn is_aided(&self) -> bool {
        self.aided
    }

    pub fn is_bundled(&self) -> bool {
        self.bundle
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn runner(&self) -> &Q {
        &self.runner
    }

    pub fn properties(&self) -> Option<&Stage<P, Q>> {
        self.properties.as_ref()
    }

    pub fn files(&self) -> JobFiles {
        JobFiles::new(&self.id.name)
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_flags(self.completed, self.frozen)
    }

    fn fs(&self) -> Fs {
        Fs::new(&self.id.path, false)
    }

    fn path_of(&self, file: &str) -> PathBuf {
        self.id.path.join(file)
    }

    /// Merge `persisted` (a previously saved manager) into self.
    ///
    /// Self holds the fresh configuration; persisted progress (restarts,
    /// completion, queue ids, parsed output, restart guesses) is taken over
    /// from `persisted`. Returns the warnings of every merge.
    pub fn recover(&mut self, persisted: &Value) -> Result<Vec<MergeWarning>> {
        let label = self.logname();
        let mut report = self.reconcile(persisted, &label)?;

        if let Some(runner) = persisted.get("runner") {
            report.absorb(self.runner.reconcile(runner, &format!("{label} runner"))?);
        }
        if let Some(reader) = persisted.get("reader") {
            report.absorb(self.reader.reconcile(reader, &format!("{label} reader"))?);
        }
        if let Some(writer) = persisted.get("writer") {
            let writer_report = self.writer.reconcile(writer, &format!("{label} writer"))?;
            if writer_report.updated_besides(&["completed"]) {
                log::info!("{label}: writer state recovered; input will be regenerated");
                self.writer.invalidate();
            }
            report.absorb(writer_report);
        }
        if let (Some(stage), Some(persisted_stage)) = (
            self.properties.as_mut(),
            persisted.get("properties").filter(|v| !v.is_null()),
        ) {
            let stage_label = format!("{label} properties");
            report.absorb(stage.reconcile(persisted_stage, &stage_label)?);
            if let Some(runner) = persisted_stage.get("runner") {
                report.absorb(stage.runner.reconcile(runner, &format!("{stage_label} runner"))?);
            }
            if let Some(reader) = persisted_stage.get("reader") {
                report.absorb(stage.reader.reconcile(reader, &format!("{stage_label} reader"))?);
            }
        }

        Ok(report.warnings)
    }

    /// Re-read the state file and recover from it. A missing file is not an error.
    pub fn reload(&mut self) -> Result<Vec<MergeWarning>> {
        let path = self.id.state_file();
        let mut strbuf = String::new();
        let Some(state) = self.fs().load_state(&path, &mut strbuf)? else {
            return Ok(Vec::new());
        };
        if !state.kind.is_empty() && state.kind != self.kind {
            log::warn!(
                "{}: state file {path:?} was written by a {}",
                self.logname(),
                state.kind
            );
        }
        self.recover(&state.manager)
            .with_context(|| format!("while recovering from {path:?}"))
    }

    /// Persist self and its current record.
    pub fn save(&self) -> Result<()> {
        let manager = serde_json::to_value(self)
            .with_context(|| format!("while serializing {}", self.logname()))?;
        let state = StateFile::new(&self.kind, manager, self.export_record());
        self.fs().write_state(&self.id.state_file(), &state)
    }

    /// Stage a writer's launch commands on `runner`.
    fn enqueue(runner: &mut Q, launch: &Launch) {
        for cmd in &launch.setup {
            runner.add_command(cmd);
        }
        runner.add_task(&launch.task);
    }
}
