use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use backend::Record;

use crate::manager::JobStatus;
use util::PathEncodingError;

use super::{Error, Fs};

/// Version written into every state file.
pub const STATE_VERSION: u32 = 1;

/// On-disk envelope around a manager's serialized state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    /// manager label, e.g. "CrystalManager"
    pub kind: String,
    pub manager: Value,
    /// latest exported record, read by dependents and the cli
    #[serde(default)]
    pub record: Record,
}

impl StateFile {
    pub fn new(kind: &str, manager: Value, record: Record) -> Self {
        Self {
            version: STATE_VERSION,
            kind: kind.to_owned(),
            manager,
            record,
        }
    }

    /// Status derived from the manager's flags.
    pub fn status(&self) -> JobStatus {
        let flag = |name: &str| self.manager.get(name).and_then(Value::as_bool).unwrap_or(false);
        JobStatus::from_flags(flag("completed"), flag("frozen"))
    }

    /// A manager field by dotted path, e.g. `runner.queueid`.
    pub fn field(&self, dotted: &str) -> Option<&Value> {
        self.manager.pointer(&json_pointer(dotted))
    }

    pub fn field_mut(&mut self, dotted: &str) -> Option<&mut Value> {
        self.manager.pointer_mut(&json_pointer(dotted))
    }

    /// Copy the manager's progress flags into the cached record.
    pub fn sync_record(&mut self) {
        let completed = self.status() == JobStatus::Ok;
        self.record.insert("completed", completed);
        self.record.insert("status", self.status().to_string());
        if let Some(restarts) = self.manager.get("restarts") {
            self.record.insert("restarts", restarts.clone());
        }
    }

    /// Interpret a parsed document, upgrading bare (unversioned) manager state.
    fn from_value(path: &Path, value: Value) -> Result<Self> {
        let path_str = || path.to_str().map(str::to_owned).ok_or(PathEncodingError);
        let Value::Object(map) = value else {
            return Err(Error::InvalidStateFile(path_str()?).into());
        };
        match map.get("version").and_then(Value::as_u64) {
            Some(v) if v > u64::from(STATE_VERSION) => {
                Err(Error::UnsupportedVersion(path_str()?, v).into())
            }
            Some(_) => Ok(serde_json::from_value(Value::Object(map))
                .with_context(|| format!("while reading state file {path:?}"))?),
            None => {
                log::warn!("{path:?}: state file has no version; reading it as bare manager state");
                Ok(Self::new("", Value::Object(map), Record::default()))
            }
        }
    }
}

fn json_pointer(dotted: &str) -> String {
    dotted
        .split('.')
        .map(|part| format!("/{}", part.replace('~', "~0").replace('/', "~1")))
        .collect()
}

impl Fs {
    /// Load the state file at `path`, or `None` if there isn't one.
    pub fn load_state(&self, path: &Path, strbuf: &mut String) -> Result<Option<StateFile>> {
        if !self.exists(path) {
            return Ok(None);
        }
        self.read_to_buf(path, strbuf)
            .with_context(|| format!("while reading state file {path:?}"))?;
        let value: Value = serde_json::from_str(strbuf)
            .with_context(|| format!("while parsing state file {path:?}"))?;
        StateFile::from_value(path, value).map(Some)
    }

    /// Write a state file through a temporary file.
    pub fn write_state(&self, path: &Path, state: &StateFile) -> Result<()> {
        let text = serde_json::to_string_pretty(state)
            .with_context(|| format!("while serializing state for {path:?}"))?;
        self.write_file(path, &text)
    }
}

/// Read only the exported record of the state file at `path`.
/// Returns `None` if the file doesn't exist yet.
pub fn read_record(path: &Path) -> Result<Option<Record>> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let fs = Fs::new(dir, true);
    let mut strbuf = String::new();
    Ok(fs.load_state(path, &mut strbuf)?.map(|state| state.record))
}
