use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Where the queue commands and backend executables live.
///
/// Passed explicitly to runners and writers when they are constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// command used to submit a batch script
    pub qsub: String,
    /// command used to list queued jobs
    pub qstat: String,
    /// shell that runs staged scripts
    pub shell: String,
    /// backend name -> executable, e.g. "Pcrystal" -> "/opt/crystal/bin/Pcrystal"
    pub executables: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            qsub: "qsub".to_owned(),
            qstat: "qstat".to_owned(),
            shell: "bash".to_owned(),
            executables: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Read a config from a json file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("while reading config file {path:?}"))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("while parsing config file {path:?}"))?;
        Ok(config)
    }

    pub fn with_executable(mut self, name: &str, path: &str) -> Self {
        self.executables.insert(name.to_owned(), path.to_owned());
        self
    }

    pub fn with_shell(mut self, shell: &str) -> Self {
        self.shell = shell.to_owned();
        self
    }

    pub fn executable(&self, name: &str) -> Result<&str, Error> {
        self.executables
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownExecutable(name.to_owned()))
    }
}
