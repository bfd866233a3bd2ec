use serde::{Deserialize, Serialize};

/// Names of every file a job touches, all derived from the job name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFiles {
    /// primary input
    pub input: String,
    /// primary output, judged by the reader
    pub output: String,
    /// captured standard output of the backend
    pub stdout: String,
    /// input of the properties stage
    pub properties_input: String,
    /// output of the properties stage
    pub properties_output: String,
    /// persisted manager state
    pub state: String,
    /// commands staged for a bundler
    pub script: String,
}

impl JobFiles {
    pub fn new(name: &str) -> Self {
        Self {
            input: name.to_owned(),
            output: format!("{name}.o"),
            stdout: format!("{name}.out"),
            properties_input: format!("{name}.prop"),
            properties_output: format!("{name}.prop.o"),
            state: format!("{name}.json"),
            script: format!("{name}.sh"),
        }
    }

    /// Name under which attempt number `attempt` of `file` is archived.
    pub fn archived(file: &str, attempt: u32) -> String {
        format!("{attempt}.{file}")
    }
}
