use backend::{Reader, Record, Runner, Writer};

use super::Manager;

impl<W, R, Q, P> Manager<W, R, Q, P>
where
    W: Writer,
    R: Reader,
    Q: Runner,
    P: Reader,
{
    /// Flat summary of the job: identity, writer parameters, scalar reader
    /// outputs, and the standard QMC projections.
    pub fn export_record(&self) -> Record {
        let mut record = self.writer.parameters();
        record.add_scalar_outputs(self.reader.output());
        record.project_qmc(self.reader.output());
        if let Some(stage) = &self.properties {
            record.insert("properties_completed", stage.completed);
        }

        record.insert("manager", self.kind.clone());
        record.insert("name", self.id.name.clone());
        record.insert("path", self.id.path.to_string_lossy().into_owned());
        record.insert("completed", self.completed);
        record.insert("status", self.status().to_string());
        record.insert("restarts", self.restarts);
        record
    }
}
