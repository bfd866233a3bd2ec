use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use backend::{Config, QueueStatus, Runner};
use merge::{FieldPolicy, MergePolicy, Reconcile};

use crate::exec::{capture, command_line, ScriptBuilder};
use crate::fs::Fs;

use super::{parse_qstat, parse_queueid, Error};

const PBS_POLICY: MergePolicy = MergePolicy::new(&[
    ("queue", FieldPolicy::Skip),
    ("walltime", FieldPolicy::Skip),
    ("np", FieldPolicy::Skip),
    ("nn", FieldPolicy::Skip),
    ("jobname", FieldPolicy::Skip),
    ("mode", FieldPolicy::Skip),
    ("account", FieldPolicy::Skip),
    ("prefix", FieldPolicy::Skip),
    ("postfix", FieldPolicy::Skip),
    ("mpi", FieldPolicy::Skip),
    ("qsub", FieldPolicy::Skip),
    ("qstat", FieldPolicy::Skip),
    ("queueid", FieldPolicy::TakeOnChange),
    ("exelines", FieldPolicy::TakeOnChange),
]);

/// Runs staged commands as one PBS job per submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PbsRunner {
    pub queue: String,
    pub walltime: String,
    /// processes per node
    pub np: u32,
    /// nodes
    pub nn: u32,
    /// name shown by qstat
    pub jobname: String,
    /// extra node property, e.g. "xe"
    pub mode: Option<String>,
    pub account: Option<String>,
    pub prefix: Vec<String>,
    pub postfix: Vec<String>,
    /// parallel launcher put in front of tasks, e.g. "mpirun"
    pub mpi: Option<String>,
    pub qsub: String,
    pub qstat: String,
    pub exelines: Vec<String>,
    pub queueid: Vec<String>,
}

impl PbsRunner {
    pub fn new(config: &Config) -> Self {
        Self {
            queue: "batch".to_owned(),
            walltime: "48:00:00".to_owned(),
            np: 1,
            nn: 1,
            jobname: "autogen".to_owned(),
            mode: None,
            account: None,
            prefix: Vec::new(),
            postfix: Vec::new(),
            mpi: None,
            qsub: config.qsub.clone(),
            qstat: config.qstat.clone(),
            exelines: Vec::new(),
            queueid: Vec::new(),
        }
    }

    /// Text of the submission script for the staged commands.
    pub fn script(&self, strbuf: &mut String) {
        let mut builder = ScriptBuilder::new(strbuf);
        builder.write_prefix();
        builder.write_directive(&format!("-q {}", self.queue));
        match &self.mode {
            Some(mode) => builder.write_directive(&format!(
                "-l nodes={}:ppn={}:{mode}",
                self.nn, self.np
            )),
            None => builder.write_directive(&format!("-l nodes={}:ppn={}", self.nn, self.np)),
        }
        builder.write_directive(&format!("-l walltime={}", self.walltime));
        builder.write_directive("-j oe");
        if let Some(account) = &self.account {
            builder.write_directive(&format!("-A {account}"));
        }
        builder.write_directive(&format!("-N {}", self.jobname));
        builder.write_directive(&format!("-o {}.qsub.out", self.jobname));
        builder.write_cd_var("PBS_O_WORKDIR");
        builder.write_lines(&self.prefix);
        builder.write_lines(&self.exelines);
        builder.write_lines(&self.postfix);
    }
}

impl Reconcile for PbsRunner {
    const MERGE_POLICY: MergePolicy = PBS_POLICY;
}

impl Runner for PbsRunner {
    fn check_status(&self) -> QueueStatus {
        if self.queueid.is_empty() {
            return QueueStatus::Ok;
        }
        let output = command_line(&self.qstat)
            .map_err(anyhow::Error::from)
            .and_then(|mut cmd| capture(&mut cmd));
        match output {
            Ok(output) if output.success => {
                if parse_qstat(&output.stdout, &self.queueid) {
                    QueueStatus::Running
                } else {
                    QueueStatus::Ok
                }
            }
            Ok(output) => {
                log::warn!("{} failed: {}", self.qstat, output.stderr.trim());
                QueueStatus::Error
            }
            Err(e) => {
                log::warn!("{e:#}");
                QueueStatus::Error
            }
        }
    }

    fn add_task(&mut self, cmd: &str) {
        match &self.mpi {
            Some(mpi) => self
                .exelines
                .push(format!("{mpi} -np {} {cmd}", self.nn * self.np)),
            None => self.exelines.push(cmd.to_owned()),
        }
    }

    fn add_command(&mut self, cmd: &str) {
        self.exelines.push(cmd.to_owned());
    }

    fn pending(&self) -> &[String] {
        &self.exelines
    }

    fn submit(&mut self, dir: &Path, jobname: &str) -> Result<Option<PathBuf>> {
        if self.exelines.is_empty() {
            log::debug!("{jobname}: nothing to submit");
            return Ok(None);
        }
        let fs = Fs::new(dir, false);
        let mut qsubfile = PathBuf::with_capacity(128);
        fs.qsub_file(jobname, &mut qsubfile);

        let mut text = String::with_capacity(512);
        self.script(&mut text);
        fs.write_file(&qsubfile, &text)?;

        let mut cmd = command_line(&self.qsub)?;
        cmd.arg(format!("{jobname}.qsub")).current_dir(dir);
        let output = capture(&mut cmd).with_context(|| format!("while submitting {qsubfile:?}"))?;
        if !output.success {
            return Err(Error::SubmissionFailed(self.qsub.clone(), output.stderr.trim().to_owned()).into());
        }
        let qid = parse_queueid(&output.stdout).ok_or_else(|| Error::NoQueueId(output.stdout.clone()))?;
        log::info!("{jobname}: submitted as {qid}");
        self.queueid.push(qid);
        self.exelines.clear();
        Ok(Some(qsubfile))
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

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    /// A stand-in queue command, run through `sh`.
    fn fake_command(dir: &Path, name: &str, body: &str) -> Result<String> {
        let path = dir.join(name);
        std::fs::write(&path, format!("{body}\n"))?;
        Ok(format!("sh {}", path.display()))
    }

    #[test]
    fn test_mpi_prefix() {
        let mut runner = PbsRunner::new(&Config::default());
        runner.nn = 2;
        runner.np = 16;
        runner.add_task("Pcrystal &> si.o");
        runner.mpi = Some("mpirun".to_owned());
        runner.add_command("cp si INPUT");
        runner.add_task("Pcrystal &> si.o");
        assert_eq!(
            runner.pending(),
            ["Pcrystal &> si.o", "cp si INPUT", "mpirun -np 32 Pcrystal &> si.o"]
        );
    }

    #[test]
    fn test_script_directives() {
        let mut runner = PbsRunner::new(&Config::default());
        runner.mode = Some("xe".to_owned());
        runner.account = Some("batr".to_owned());
        runner.add_task("run");
        let mut text = String::new();
        runner.script(&mut text);
        assert!(text.contains("#PBS -l nodes=1:ppn=1:xe\n"));
        assert!(text.contains("#PBS -A batr\n"));
        assert!(text.contains("cd \"${PBS_O_WORKDIR}\"\nrun\n"));
    }

    #[test]
    fn test_submit_records_queueid() -> Result<()> {
        let dir = tempdir()?;
        let config = Config {
            qsub: fake_command(dir.path(), "qsub", "echo 4242.server")?,
            ..Config::default()
        };
        let mut runner = PbsRunner::new(&config);
        assert_eq!(runner.submit(dir.path(), "si")?, None);

        runner.add_task("run");
        let script = runner.submit(dir.path(), "si")?.unwrap();
        assert_eq!(script, dir.path().join("si.qsub"));
        assert_eq!(runner.queueid(), ["4242"]);
        assert!(runner.pending().is_empty());
        Ok(())
    }

    #[test]
    fn test_failed_submit_leaves_runner() -> Result<()> {
        let dir = tempdir()?;
        let config = Config {
            qsub: fake_command(dir.path(), "qsub", "echo 'bad queue' 1>&2; exit 1")?,
            ..Config::default()
        };
        let mut runner = PbsRunner::new(&config);
        runner.add_task("run");
        let before = runner.clone();
        let err = runner.submit(dir.path(), "si").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::SubmissionFailed(_, msg)) if msg == "bad queue"
        ));
        assert_eq!(runner, before);
        Ok(())
    }

    #[test]
    fn test_check_status() -> Result<()> {
        let dir = tempdir()?;
        let qstat = fake_command(dir.path(), "qstat", "echo '4242.server si alice 0 R batch'")?;
        let config = Config {
            qstat,
            ..Config::default()
        };
        let mut runner = PbsRunner::new(&config);
        assert_eq!(runner.check_status(), QueueStatus::Ok, "no ids, no query");
        runner.push_queueid("4242");
        assert_eq!(runner.check_status(), QueueStatus::Running);
        runner.queueid = vec!["7".to_owned()];
        assert_eq!(runner.check_status(), QueueStatus::Ok);
        runner.qstat = "/nonexistent/qstat".to_owned();
        assert_eq!(runner.check_status(), QueueStatus::Error);
        Ok(())
    }
}
