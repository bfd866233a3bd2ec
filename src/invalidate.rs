use std::path::{Path, PathBuf};

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

use backend::JobFiles;

use crate::app::{job_name, load};
use crate::fs::{Fs, StateFile};
use crate::settings::Settings;
use crate::ui::Ui;

/// Flags cleared by an invalidation, as dotted manager fields.
const FLAGS: [&str; 6] = [
    "completed",
    "frozen",
    "writer.completed",
    "reader.completed",
    "properties.completed",
    "properties.reader.completed",
];

/// Logic for invalidating managers from previous runs.
pub struct Invalidator<'a> {
    ui: &'a Ui,
    settings: &'a Settings,
}

impl<'a> Invalidator<'a> {
    /// Create a new `Invalidator`.
    pub fn new(settings: &'a Settings, ui: &'a Ui) -> Self {
        Self { settings, ui }
    }
}

impl Invalidator<'_> {
    /// Mark the manager in `path` incomplete and remove its outputs,
    /// so the next step regenerates input and reruns.
    pub fn invalidate(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or(Path::new(""));
        let fs = Fs::new(dir, self.settings.dry_run);
        let mut strbuf = String::new();
        let mut state = load(&fs, path, &mut strbuf)?;
        let files = JobFiles::new(job_name(path)?);

        eprintln!("{} {path:?}", "Invalidating".magenta());
        let flags: Vec<&str> = FLAGS
            .into_iter()
            .filter(|flag| state.field(flag).is_some_and(|v| *v == Value::Bool(true)))
            .collect();
        let outputs: Vec<PathBuf> = [&files.output, &files.properties_output]
            .into_iter()
            .map(|file| dir.join(file))
            .filter(|output| fs.exists(output))
            .collect();

        if flags.is_empty() && outputs.is_empty() {
            eprintln!("Manager is already invalid; not changing.");
            return Ok(());
        }
        for flag in &flags {
            eprintln!("{} {flag}", "Clearing".red());
        }
        for output in &outputs {
            eprintln!("{} {output:?}", "Deleting".red());
        }
        if self.settings.dry_run || !self.ui.confirm("Proceed?")? {
            return Ok(());
        }

        clear_flags(&mut state, &flags);
        fs.write_state(path, &state)?;
        for output in &outputs {
            fs.delete_file(output)?;
        }
        self.ui.verbose_msg("Invalidated.");
        Ok(())
    }
}

fn clear_flags(state: &mut StateFile, flags: &[&str]) {
    for flag in flags {
        if let Some(slot) = state.field_mut(flag) {
            *slot = Value::Bool(false);
        }
    }
    state.sync_record();
}
