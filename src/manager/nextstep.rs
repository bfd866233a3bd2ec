use std::path::Path;

use anyhow::{Context, Result};

use backend::{resolve_status, CollectStatus, JobFiles, Reader, Runner, Status, Writer};

use crate::fs::{read_record, Fs};

use super::{Manager, Step};

impl<W, R, Q, P> Manager<W, R, Q, P>
where
    W: Writer,
    R: Reader,
    Q: Runner,
    P: Reader,
{
    /// Advance the job by one step: reload, write input, check the queue,
    /// collect and restart as needed, submit, and persist.
    pub fn nextstep(&mut self) -> Result<Step> {
        self.reload()?;
        let logname = self.logname();
        log::info!("{logname}: next step");

        let fs = self.fs();
        fs.ensure_root_exists()?;
        let files = self.files();

        if self.frozen {
            if self.restarts < self.max_restarts {
                log::info!("{logname}: restart budget raised to {}; unfreezing", self.max_restarts);
                self.frozen = false;
            } else {
                log::error!(
                    "{logname}: frozen after {} restarts; human intervention required",
                    self.restarts
                );
                self.save()?;
                return Ok(Step::Frozen);
            }
        }

        if !self.dependency_ready()? {
            self.save()?;
            return Ok(Step::AwaitingDependency);
        }

        if !self.writer.completed() {
            log::info!("{logname}: writing input");
            self.writer
                .write_input(&self.id.path, &files)
                .with_context(|| format!("while writing input for {logname}"))?;
        }

        let outfile = self.path_of(&files.output);
        let status = resolve_status(&self.runner, &self.reader, &outfile);
        log::info!("{logname}: status {status}");

        let step = match status {
            Status::NotStarted => self.start(&files),
            Status::ReadyForAnalysis => self.analyze(&fs, &files, &outfile)?,
            Status::Running => Step::Running,
            Status::Done if self.aided => self.polish(&fs, &files)?,
            Status::Done => Step::Done,
        };

        self.completed = self.reader.completed() && !self.aided;

        if !self.bundle {
            self.submit_primary()?;
        }
        self.save()?;
        Ok(step)
    }

    /// Re-parse the primary output without submitting anything.
    pub fn collect(&mut self) -> Result<CollectStatus> {
        self.reload()?;
        log::info!("{}: collecting results", self.logname());
        let outfile = self.path_of(&self.files().output);
        let verdict = self.reader.collect(&outfile)?;
        self.completed = self.reader.completed() && !self.aided;
        self.save()?;
        Ok(verdict)
    }

    /// True if there is no dependency left to wait for.
    fn dependency_ready(&mut self) -> Result<bool> {
        let Some(dependency) = &self.dependency else {
            return Ok(true);
        };
        if !self.writer.needs_dependency() {
            return Ok(true);
        }
        match read_record(&dependency.state_file())? {
            Some(record) if record.completed() => {
                log::info!("{}: taking input from {dependency}", self.logname());
                self.writer.accept_dependency(&record)?;
                Ok(true)
            }
            _ => {
                log::info!("{}: waiting on {dependency}", self.logname());
                Ok(false)
            }
        }
    }

    fn start(&mut self, files: &JobFiles) -> Step {
        if !self.writer.completed() {
            return Step::Idle;
        }
        if self.runner.pending().is_empty() {
            Self::enqueue(&mut self.runner, &self.writer.launch(files));
        }
        Step::Enqueued
    }

    fn analyze(&mut self, fs: &Fs, files: &JobFiles, outfile: &Path) -> Result<Step> {
        let logname = self.logname();
        let verdict = match self.reader.collect(outfile) {
            Ok(verdict) => verdict,
            Err(e) => {
                log::warn!("{logname}: could not read {outfile:?} ({e:#}); treating it as a restart");
                CollectStatus::Restart
            }
        };
        log::info!("{logname}: collected {verdict}");

        match verdict {
            CollectStatus::Ok if self.aided => self.polish(fs, files),
            CollectStatus::Ok => Ok(Step::Done),
            CollectStatus::Restart | CollectStatus::Killed => {
                if self.exhausted() {
                    return Ok(Step::Frozen);
                }
                log::info!(
                    "{logname}: attempting restart ({} previous restarts)",
                    self.restarts
                );
                if self.trylev && !self.aided && self.writer.apply_convergence_aid() {
                    log::info!("{logname}: applying convergence aid");
                    self.aided = true;
                }
                self.rerun(fs, files)?;
                Ok(Step::Restarted)
            }
        }
    }

    /// Converged with the aid applied: rerun without it to be sure.
    fn polish(&mut self, fs: &Fs, files: &JobFiles) -> Result<Step> {
        if self.exhausted() {
            return Ok(Step::Frozen);
        }
        log::info!("{}: converged with convergence aid; rerunning without it", self.logname());
        self.writer.remove_convergence_aid();
        self.aided = false;
        self.reader.invalidate();
        self.rerun(fs, files)?;
        Ok(Step::Restarted)
    }

    /// Freeze if the restart budget is spent.
    fn exhausted(&mut self) -> bool {
        if self.restarts < self.max_restarts {
            return false;
        }
        log::error!(
            "{}: restarts exhausted ({} previous restarts); human intervention required",
            self.logname(),
            self.restarts
        );
        self.frozen = true;
        true
    }

    /// Archive the last attempt, regenerate input and stage it again.
    fn rerun(&mut self, fs: &Fs, files: &JobFiles) -> Result<()> {
        self.archive(fs, files)?;
        self.writer
            .prepare_restart(&self.id.path, files, self.restarts)
            .context("while preparing restart")?;
        self.writer
            .write_input(&self.id.path, files)
            .context("while rewriting input for restart")?;
        self.runner.release_commands();
        Self::enqueue(&mut self.runner, &self.writer.launch(files));
        self.restarts += 1;
        Ok(())
    }

    /// Copy input and checkpoints to `<restarts>.<file>`, move the output aside.
    fn archive(&self, fs: &Fs, files: &JobFiles) -> Result<()> {
        let mut srcbuf = self.id.path.clone();
        let mut tgtbuf = self.id.path.clone();
        for file in std::iter::once(files.input.clone()).chain(self.writer.checkpoints()) {
            let src = fs.job_file(&file, &mut srcbuf);
            if fs.exists(src) {
                fs.copy(src, fs.archive(&file, self.restarts, &mut tgtbuf))?;
            }
        }
        let output = fs.job_file(&files.output, &mut srcbuf);
        if fs.exists(output) {
            fs.rename(output, fs.archive(&files.output, self.restarts, &mut tgtbuf))?;
        }
        Ok(())
    }

    /// Submit staged primary commands. On failure they are dropped so the
    /// next cycle stages them again.
    fn submit_primary(&mut self) -> Result<()> {
        if self.runner.pending().is_empty() {
            return Ok(());
        }
        match self.runner.submit(&self.id.path, &self.id.name) {
            Ok(script) => {
                if let Some(script) = script {
                    log::info!("{}: submitted {script:?}", self.logname());
                }
                Ok(())
            }
            Err(e) => {
                let dropped = self.runner.release_commands();
                log::error!("{}: submission failed: {e:#}", self.logname());
                log::warn!("{}: dropping {} staged commands", self.logname(), dropped.len());
                self.save()?;
                Err(e.context(format!("while submitting {}", self.logname())))
            }
        }
    }
}
