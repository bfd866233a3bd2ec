/// Submission through a PBS queue
mod pbs;
pub use pbs::PbsRunner;

/// Synchronous execution on this machine
mod local;
pub use local::LocalRunner;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Submission with \"{0}\" failed: {1}")]
    SubmissionFailed(String, String),
    #[error("Could not find a queue id in submission output \"{0}\"")]
    NoQueueId(String),
    #[error("Bundle submitted as {0}, but saving these jobs failed: {1}")]
    UnsavedJobs(String, String),
}

/// Queue id from `qsub` output: the first token, up to its first '.'.
pub fn parse_queueid(stdout: &str) -> Option<String> {
    let token = stdout.split_whitespace().next()?;
    let id = token.split('.').next().unwrap_or(token);
    if id.is_empty() {
        None
    } else {
        Some(id.to_owned())
    }
}

/// True if any of `ids` is queued (`Q`) or running (`R`) in `qstat` output.
pub fn parse_qstat(stdout: &str, ids: &[String]) -> bool {
    stdout.lines().any(|line| {
        let cols: Vec<&str> = line.split_whitespace().collect();
        cols.len() > 4
            && matches!(cols[4], "R" | "Q")
            && ids.iter().any(|id| matches_id(cols[0], id))
    })
}

/// `1234.server` and `1234` both match id `1234`; `12345` doesn't.
fn matches_id(token: &str, id: &str) -> bool {
    token
        .strip_prefix(id)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}
