use anyhow::Result;

use backend::{resolve_status, Reader, Runner, Status, Writer};

use super::{Error, Manager};

impl<W, R, Q, P> Manager<W, R, Q, P>
where
    W: Writer,
    R: Reader,
    Q: Runner,
    P: Reader,
{
    /// Advance the primary job, then the properties stage once the primary is done.
    /// Returns true when the properties stage has completed.
    pub fn ready_properties(&mut self) -> Result<bool> {
        self.nextstep()?;
        if !self.completed {
            return Ok(false);
        }

        let logname = self.logname();
        let files = self.files();
        let launch = self
            .writer
            .launch_properties(&files)
            .ok_or_else(|| Error::NoPropertiesStage(logname.clone()))?;
        let outfile = self.path_of(&files.properties_output);
        let Some(stage) = self.properties.as_mut() else {
            return Err(Error::NoPropertiesStage(logname).into());
        };

        let status = resolve_status(&stage.runner, &stage.reader, &outfile);
        log::info!("{logname}: properties status {status}");
        match status {
            Status::NotStarted => {
                if stage.runner.pending().is_empty() {
                    Self::enqueue(&mut stage.runner, &launch);
                }
            }
            Status::ReadyForAnalysis => match stage.reader.collect(&outfile) {
                Ok(verdict) => log::info!("{logname}: properties collected {verdict}"),
                Err(e) => log::warn!("{logname}: could not read {outfile:?} ({e:#})"),
            },
            Status::Running | Status::Done => (),
        }
        stage.completed = stage.reader.completed();

        if !self.bundle && !stage.runner.pending().is_empty() {
            if let Err(e) = stage.runner.submit(&self.id.path, &format!("{}.prop", self.id.name)) {
                let dropped = stage.runner.release_commands();
                log::warn!("{logname}: dropping {} staged properties commands", dropped.len());
                self.save()?;
                return Err(e.context(format!("while submitting properties for {logname}")));
            }
        }

        let ready = stage.completed;
        if ready {
            log::info!("{logname}: properties completed successfully");
        } else {
            log::info!("{logname}: properties run incomplete");
        }
        self.save()?;
        Ok(ready)
    }
}
