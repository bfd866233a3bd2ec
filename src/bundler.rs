use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use backend::Config;

use crate::exec::{capture, command_line, ScriptBuilder};
use crate::fs::Fs;
use crate::manager::Job;
use crate::runner::{parse_queueid, Error};

/// Outcome of one bundled submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleSubmission {
    pub jobname: String,
    pub queueid: String,
    pub nodes: u32,
    pub script: PathBuf,
}

/// Submits the staged commands of many jobs as a few large PBS jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundler {
    pub queue: String,
    pub walltime: String,
    pub jobname: String,
    /// nodes per bundle
    pub npb: u32,
    /// processes per node
    pub ppn: u32,
    pub mode: Option<String>,
    pub account: Option<String>,
    pub prefix: Vec<String>,
    pub postfix: Vec<String>,
    pub qsub: String,
    /// shell that runs each job's staged script
    pub shell: String,
    pub queueid: Vec<String>,
}

impl Bundler {
    pub fn new(config: &Config) -> Self {
        Self {
            queue: "normal".to_owned(),
            walltime: "48:00:00".to_owned(),
            jobname: "AGBundler".to_owned(),
            npb: 16,
            ppn: 32,
            mode: None,
            account: None,
            prefix: Vec::new(),
            postfix: Vec::new(),
            qsub: config.qsub.clone(),
            shell: config.shell.clone(),
            queueid: Vec::new(),
        }
    }

    /// Split `jobs` into consecutive bundles of at most `npb` nodes and
    /// submit each one as `<jobname>_<index>`.
    pub fn submit(&mut self, jobs: &mut [&mut dyn Job], dir: &Path) -> Result<Vec<BundleSubmission>> {
        log::info!("{}: submitting bundles of {} jobs", self.jobname, jobs.len());
        let assign = bundle_assignment(jobs.iter().map(|job| job.nodes()), self.npb);
        log::debug!("{}: bundle assignment {assign:?}", self.jobname);

        let mut submissions = Vec::new();
        let mut rest = jobs;
        let mut offset = 0;
        while !rest.is_empty() {
            let bidx = assign[offset];
            let len = assign[offset..].iter().take_while(|&&b| b == bidx).count();
            let (bundle, tail) = std::mem::take(&mut rest).split_at_mut(len);
            let jobname = format!("{}_{bidx}", self.jobname);
            submissions.push(self.submit_bundle(bundle, dir, Some(&jobname), None)?);
            rest = tail;
            offset += len;
        }
        Ok(submissions)
    }

    /// Submit `jobs` as one PBS job from `dir`.
    ///
    /// Every job must have commands staged. The node request defaults to the
    /// sum of the jobs' node shares. If submission fails no job is changed.
    /// Once the queue has accepted the bundle every job is updated, and a
    /// job that can't be saved is reported after the others are.
    pub fn submit_bundle(
        &mut self,
        jobs: &mut [&mut dyn Job],
        dir: &Path,
        jobname: Option<&str>,
        nodes: Option<u32>,
    ) -> Result<BundleSubmission> {
        for job in jobs.iter() {
            assert!(
                job.run_ready(),
                "{} has no staged commands to bundle",
                job.logname()
            );
        }
        let nodes = nodes.unwrap_or_else(|| jobs.iter().map(|job| job.nodes()).sum());
        let jobname = jobname.unwrap_or(&self.jobname).to_owned();

        let fs = Fs::new(dir, false);
        fs.ensure_root_exists()?;
        let mut script = PathBuf::with_capacity(128);
        fs.qsub_file(&jobname, &mut script);

        let mut text = String::with_capacity(1024);
        self.write_script(&mut text, jobs, dir, &jobname, nodes)?;
        fs.write_file(&script, &text)?;

        let mut cmd = command_line(&self.qsub)?;
        cmd.arg(format!("{jobname}.qsub")).current_dir(dir);
        let output = capture(&mut cmd).with_context(|| format!("while submitting {script:?}"))?;
        if !output.success {
            log::error!("{jobname}: error submitting bundle; check queue settings");
            return Err(Error::SubmissionFailed(self.qsub.clone(), output.stderr.trim().to_owned()).into());
        }
        let queueid =
            parse_queueid(&output.stdout).ok_or_else(|| Error::NoQueueId(output.stdout.clone()))?;
        log::info!("{jobname}: submitted {} jobs on {nodes} nodes as {queueid}", jobs.len());

        for job in jobs.iter_mut() {
            job.release_commands();
            job.update_queueid(&queueid);
        }
        self.queueid.push(queueid.clone());

        let mut unsaved = Vec::new();
        for job in jobs.iter() {
            if let Err(e) = job.save() {
                log::error!("{}: could not save after bundling: {e:#}", job.logname());
                unsaved.push(job.logname());
            }
        }
        if !unsaved.is_empty() {
            return Err(Error::UnsavedJobs(queueid, unsaved.join(", ")).into());
        }

        Ok(BundleSubmission {
            jobname,
            queueid,
            nodes,
            script,
        })
    }

    fn write_script(
        &self,
        strbuf: &mut String,
        jobs: &[&mut dyn Job],
        dir: &Path,
        jobname: &str,
        nodes: u32,
    ) -> Result<()> {
        let mut builder = ScriptBuilder::new(strbuf);
        builder.write_prefix();
        builder.write_directive(&format!("-q {}", self.queue));
        match &self.mode {
            Some(mode) => builder.write_directive(&format!("-l nodes={nodes}:ppn={}:{mode}", self.ppn)),
            None => builder.write_directive(&format!("-l nodes={nodes}:ppn={}", self.ppn)),
        }
        builder.write_directive(&format!("-l walltime={}", self.walltime));
        builder.write_directive("-j oe");
        if let Some(account) = &self.account {
            builder.write_directive(&format!("-A {account}"));
        }
        builder.write_directive(&format!("-N {jobname}"));
        builder.write_directive(&format!("-o {jobname}.out"));
        // the batch job starts in $HOME, so every cd must be absolute
        let dir = absolute(dir)?;
        let dir = dir.to_str().ok_or(util::PathEncodingError)?;
        builder.write_cd(dir);
        builder.write_lines(&self.prefix);
        for job in jobs.iter() {
            let job_script = job.write_script()?;
            let job_dir = absolute(&job.id().path)?;
            let job_dir = job_dir.to_str().ok_or(util::PathEncodingError)?;
            let file = job_script
                .file_name()
                .and_then(|f| f.to_str())
                .ok_or(util::PathEncodingError)?;
            builder.write_cd(job_dir);
            builder.write_background(&self.shell, file);
            builder.write_cd(dir);
        }
        builder.write_wait();
        builder.write_lines(&self.postfix);
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("while resolving {path:?}"))
}

/// Bundle index of each job, from cumulative node shares.
fn bundle_assignment(shares: impl Iterator<Item = u32>, npb: u32) -> Vec<u32> {
    let npb = npb.max(1);
    let mut cum = 0;
    shares
        .map(|share| {
            cum += share;
            cum.saturating_sub(1) / npb
        })
        .collect()
}
