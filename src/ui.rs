use std::cell::RefCell;
use std::fmt::Debug;

use anyhow::Result;
use colored::{ColoredString, Colorize};

use crate::manager::{JobStatus, Step};
use crate::settings::Settings;

/// Terminal output and prompts of the operator CLI.
pub struct Ui {
    /// -v: report progress on stderr
    pub verbose: bool,
    /// -y: answer yes to every prompt
    assume_yes: bool,
    /// line buffer for answers; RefCell so prompting doesn't need `&mut self`
    answer: RefCell<String>,
}

impl Ui {
    pub fn new(settings: &Settings) -> Self {
        Self {
            verbose: settings.verbose > 0,
            assume_yes: settings.yes,
            answer: RefCell::new(String::with_capacity(8)),
        }
    }

    /// Ask a yes/no question on stderr; anything but "y" or "yes" is no.
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        eprint!("{prompt} {} ", "[y/N]".bold());

        let mut answer = self.answer.borrow_mut();
        answer.clear();
        std::io::stdin().read_line(&mut answer)?;
        let answer = answer.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }

    pub fn verbose_msg(&self, msg: &str) {
        if self.verbose {
            eprintln!("{msg}");
        }
    }

    /// Start a progress line, finished by `done`.
    pub fn progress(&self, action: &str, target: impl Debug) {
        if self.verbose {
            eprint!("{} {target:?}... ", action.magenta());
        }
    }

    pub fn done(&self) {
        if self.verbose {
            eprintln!("{}", "done".green());
        }
    }

    /// A job status, colored by how much attention it needs.
    pub fn status_str(status: JobStatus) -> ColoredString {
        let text = status.to_string();
        match status {
            JobStatus::Ok => text.green(),
            JobStatus::NotFinished => text.yellow(),
            JobStatus::Frozen => text.red().bold(),
        }
    }

    /// The outcome of one step, colored the same way.
    pub fn step_str(step: Step) -> ColoredString {
        let text = step.to_string();
        match step {
            Step::Done => text.green(),
            Step::Frozen => text.red().bold(),
            Step::Running | Step::Enqueued => text.cyan(),
            Step::Restarted => text.yellow(),
            Step::AwaitingDependency | Step::Idle => text.magenta(),
        }
    }
}
