use std::path::{Path, PathBuf};

use backend::JobFiles;

use super::Fs;

/// Utility fns for making common types of paths.
/// File names come from `JobFiles`; these fns only join them onto a directory.
impl Fs {
    /// $ROOT/file
    pub fn job_file<'a>(&self, file: &str, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(&self.root, file, buf)
    }

    /// $ROOT/<attempt>.file
    pub fn archive<'a>(&self, file: &str, attempt: u32, buf: &'a mut PathBuf) -> &'a Path {
        self.parts2(&self.root, JobFiles::archived(file, attempt), buf)
    }

    /// $ROOT/jobname.qsub
    pub fn qsub_file<'a>(&self, jobname: &str, buf: &'a mut PathBuf) -> &'a Path {
        buf.clear();
        buf.push(&self.root);
        buf.push(format!("{jobname}.qsub"));
        &*buf
    }

    /// $ROOT/jobname.stdout
    pub fn stdout<'a>(&self, jobname: &str, buf: &'a mut PathBuf) -> &'a Path {
        buf.clear();
        buf.push(&self.root);
        buf.push(format!("{jobname}.stdout"));
        &*buf
    }

    /// $ROOT/jobname.stderr
    pub fn stderr<'a>(&self, jobname: &str, buf: &'a mut PathBuf) -> &'a Path {
        buf.clear();
        buf.push(&self.root);
        buf.push(format!("{jobname}.stderr"));
        &*buf
    }

    fn parts2<'a, T, U>(&self, p1: T, p2: U, buf: &'a mut PathBuf) -> &'a Path
    where
        T: AsRef<Path>,
        U: AsRef<Path>,
    {
        buf.clear();
        buf.push(p1);
        buf.push(p2);
        &*buf
    }
}
