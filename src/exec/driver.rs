use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;

use util::Timer;

use crate::bundler::{BundleSubmission, Bundler};
use crate::manager::{Job, JobId, Step};
use crate::ui::Ui;

/// What one polling cycle did.
#[derive(Debug, Default)]
pub struct Summary {
    pub steps: Vec<(JobId, Step)>,
    pub failures: Vec<(JobId, anyhow::Error)>,
    pub bundles: Vec<BundleSubmission>,
}

impl Summary {
    /// True if every job stepped without error and is done.
    pub fn all_done(&self) -> bool {
        self.failures.is_empty() && self.steps.iter().all(|(_, step)| *step == Step::Done)
    }

    pub fn print(&self) {
        for (id, step) in &self.steps {
            eprintln!("{:>20} {id}", Ui::step_str(*step));
        }
        for (id, e) in &self.failures {
            eprintln!("{:>20} {id}: {e:#}", "failed".red());
        }
        for bundle in &self.bundles {
            eprintln!(
                "{:>20} {} ({} nodes) as {}",
                "bundled".cyan(),
                bundle.jobname,
                bundle.nodes,
                bundle.queueid
            );
        }
    }
}

/// Steps a set of jobs once, then bundles whatever they staged.
pub struct Driver {
    bundler: Option<(Bundler, PathBuf)>,
    timer: Timer,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    pub fn new() -> Self {
        Self {
            bundler: None,
            timer: Timer::now(),
        }
    }

    /// Bundle the staged commands of bundled jobs, writing bundle scripts to `dir`.
    pub fn with_bundler(mut self, bundler: Bundler, dir: &Path) -> Self {
        self.bundler = Some((bundler, dir.to_path_buf()));
        self
    }

    pub fn bundler(&self) -> Option<&Bundler> {
        self.bundler.as_ref().map(|(bundler, _)| bundler)
    }

    /// Call `nextstep` on every job. A failing job is recorded and the cycle
    /// goes on; a failed bundle submission ends the cycle with an error.
    pub fn cycle(&mut self, jobs: &mut [Box<dyn Job>]) -> Result<Summary> {
        let mut summary = Summary::default();
        self.timer.lap();
        for job in jobs.iter_mut() {
            let result = job.nextstep();
            log::debug!("{}: step took {:?}", job.logname(), self.timer.lap());
            match result {
                Ok(step) => summary.steps.push((job.id().clone(), step)),
                Err(e) => {
                    log::error!("{}: {e:#}", job.logname());
                    summary.failures.push((job.id().clone(), e));
                }
            }
        }

        if let Some((bundler, dir)) = self.bundler.as_mut() {
            let mut ready: Vec<&mut dyn Job> = jobs
                .iter_mut()
                .filter(|job| job.is_bundled() && job.run_ready())
                .map(|job| &mut **job as &mut dyn Job)
                .collect();
            if !ready.is_empty() {
                summary.bundles = bundler.submit(&mut ready, dir.as_path())?;
            }
        }
        log::info!(
            "cycle over {} jobs done; driver running for {:?}",
            jobs.len(),
            self.timer.total()
        );
        Ok(summary)
    }
}
