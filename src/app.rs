use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::Value;

use util::PathEncodingError;

use crate::fs::{Fs, StateFile};
use crate::invalidate::Invalidator;
use crate::settings::{Action, Settings};
use crate::ui::Ui;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Manager has no field \"{0}\"")]
    UnknownField(String),
    #[error("Refusing to set \"{0}\" to true: only a reader can mark a job complete")]
    CompletedByHand(String),
    #[error("Refusing to lower \"{0}\" from {1} to {2}")]
    RestartsLowered(String, u64, u64),
    #[error("Manager has no runner queue ids to append to")]
    NoQueueIds,
}

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
    /// User interface
    ui: Ui,
}

impl App {
    /// Create a new `App`.
    pub fn new(settings: Settings) -> Self {
        let ui = Ui::new(&settings);
        Self { settings, ui }
    }

    /// Run the app, using settings to determine which action to take.
    pub fn run(self) -> Result<()> {
        match &self.settings.action {
            Action::Info(states) => {
                for state in states {
                    self.info(state)?;
                }
            }
            Action::Queueid { state, id } => self.queueid(state, id)?,
            Action::Set {
                state,
                field,
                value,
            } => self.set(state, field, value)?,
            Action::Invalidate(states) => {
                let invalidator = Invalidator::new(&self.settings, &self.ui);
                for state in states {
                    invalidator.invalidate(state)?;
                }
            }
            Action::Status(dir) => self.status(dir)?,
        }
        Ok(())
    }

    fn fs_for(&self, state: &Path) -> Fs {
        Fs::new(state.parent().unwrap_or(Path::new("")), self.settings.dry_run)
    }

    fn write(&self, fs: &Fs, path: &Path, state: &StateFile) -> Result<()> {
        if self.settings.dry_run {
            eprintln!("Dry run; not writing {path:?}.");
            Ok(())
        } else {
            fs.write_state(path, state)
        }
    }
}

/// Read the state file at `path`, failing if it's missing.
pub fn load(fs: &Fs, path: &Path, strbuf: &mut String) -> Result<StateFile> {
    fs.load_state(path, strbuf)?
        .with_context(|| format!("state file {path:?} disappeared"))
}

/// Job name of a state file: its file stem.
pub fn job_name(path: &Path) -> Result<&str> {
    Ok(path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or(PathEncodingError)?)
}

// READING //////////////////
impl App {
    fn info(&self, path: &Path) -> Result<()> {
        self.ui.progress("Reading", path);
        let fs = self.fs_for(path);
        let mut strbuf = String::new();
        let state = load(&fs, path, &mut strbuf)?;
        self.ui.done();

        let ids = |field: &str| {
            state
                .field(field)
                .and_then(Value::as_array)
                .map(|ids| {
                    ids.iter()
                        .map(|id| id.as_str().map(str::to_owned).unwrap_or_else(|| id.to_string()))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default()
        };

        println!("{} {}", "name:".cyan(), job_name(path)?);
        println!("{} {}", "kind:".cyan(), state.kind);
        println!(
            "{} {}",
            "path:".cyan(),
            path.parent().unwrap_or(Path::new(".")).display()
        );
        println!("{} {}", "status:".cyan(), Ui::status_str(state.status()));
        if let Some(restarts) = state.field("restarts") {
            println!("{} {restarts}", "restarts:".cyan());
        }
        println!("{} [{}]", "queue ids:".cyan(), ids("runner.queueid"));
        if state.field("properties.runner").is_some() {
            println!("{} [{}]", "properties queue ids:".cyan(), ids("properties.runner.queueid"));
        }
        if self.ui.verbose {
            println!("{}", serde_json::to_string_pretty(&state.record)?);
        }
        Ok(())
    }

    fn status(&self, dir: &Path) -> Result<()> {
        let fs = Fs::new(dir, true);
        let mut states: Vec<PathBuf> = Vec::new();
        for entry in fs.read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                states.push(path);
            }
        }
        states.sort();

        let mut strbuf = String::new();
        let mut found_any = false;
        for path in &states {
            match fs.load_state(path, &mut strbuf) {
                Ok(Some(state)) => {
                    found_any = true;
                    let restarts = state.field("restarts").cloned().unwrap_or(Value::Null);
                    println!(
                        "{:<24} {:<16} {:<14} restarts={restarts}",
                        job_name(path)?,
                        state.kind,
                        Ui::status_str(state.status()),
                    );
                }
                Ok(None) => (),
                Err(e) => self.ui.verbose_msg(&format!("skipping {path:?}: {e:#}")),
            }
        }
        if !found_any {
            eprintln!("No state files in {dir:?}.");
        }
        Ok(())
    }
}

// EDITING //////////////////
impl App {
    fn queueid(&self, path: &Path, id: &str) -> Result<()> {
        let fs = self.fs_for(path);
        let mut strbuf = String::new();
        let mut state = load(&fs, path, &mut strbuf)?;
        let Some(Value::Array(ids)) = state.field_mut("runner.queueid") else {
            return Err(Error::NoQueueIds.into());
        };
        ids.push(Value::String(id.to_owned()));
        eprintln!("{} {id} to {path:?}", "Appending queue id".magenta());
        self.write(&fs, path, &state)
    }

    fn set(&self, path: &Path, field: &str, value: &str) -> Result<()> {
        let fs = self.fs_for(path);
        let mut strbuf = String::new();
        let mut state = load(&fs, path, &mut strbuf)?;

        let new = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
        let current = state
            .field(field)
            .ok_or_else(|| Error::UnknownField(field.to_owned()))?;
        check_edit(field, current, &new)?;

        eprintln!(
            "{} {field}: {current} -> {new}",
            "Setting".magenta()
        );
        if let Some(slot) = state.field_mut(field) {
            *slot = new;
        }
        state.sync_record();
        self.write(&fs, path, &state)
    }
}

/// Refuse edits that would fake progress.
fn check_edit(field: &str, current: &Value, new: &Value) -> Result<(), Error> {
    let last = field.rsplit('.').next().unwrap_or(field);
    if last == "completed" && new.as_bool() == Some(true) {
        return Err(Error::CompletedByHand(field.to_owned()));
    }
    if last == "restarts" {
        if let (Some(old), Some(new)) = (current.as_u64(), new.as_u64()) {
            if new < old {
                return Err(Error::RestartsLowered(field.to_owned(), old, new));
            }
        }
    }
    Ok(())
}
