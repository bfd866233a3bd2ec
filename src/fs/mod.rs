use std::path::{Path, PathBuf};
use std::{fs, io};

use anyhow::{Context, Result};

use util::PathEncodingError;

/// Utility fns
mod ops;

/// Defines fns for creating common paths in a job directory
mod paths;

/// Reading and writing persisted manager state
mod state_file;
pub use state_file::{read_record, StateFile, STATE_VERSION};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Path is neither file nor symlink: {0}")]
    UnknownPathType(String),
    #[error("Job directory \"{0}\" is not a directory")]
    NotDirectory(String),
    #[error("Can't perform IO operation: \"{0}\" is not whitelisted")]
    NotWhitelisted(String),
    #[error("State file \"{0}\" has version {1}; this build understands up to {STATE_VERSION}")]
    UnsupportedVersion(String, u64),
    #[error("Invalid state file \"{0}\": expected a JSON object")]
    InvalidStateFile(String),
}

/// All file operations in the crate should go through this struct.
///
/// All destructive operations check that the path in question is a child of the
/// single whitelisted prefix (a job or bundle directory), otherwise they will
/// not be performed. Commands handed to a runner are not checked; it is up to
/// the writer that produces them to stay inside its directory.
#[derive(Debug, Clone)]
pub struct Fs {
    /// The directory we are allowed to modify
    root: PathBuf,
    /// if true, prevents all destructive operations
    dry_run: bool,
}

impl Fs {
    /// Create a new `Fs` rooted at the given directory.
    pub fn new(root: &Path, dry_run: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            dry_run,
        }
    }

    /// Check whether the root dir exists, and create it if not.
    pub fn ensure_root_exists(&self) -> Result<()> {
        if !self.root.exists() {
            if self.dry_run {
                log::info!("dry run; not creating job directory {:?}", self.root);
            } else {
                log::debug!("creating job directory {:?}", self.root);
                fs::create_dir_all(&self.root).context("creating job directory")?;
            }
        } else if !self.root.is_dir() {
            return Err(Error::NotDirectory(
                self.root.to_str().ok_or(PathEncodingError)?.to_string(),
            )
            .into());
        }
        Ok(())
    }

    /// Check if path exists on disk.
    pub fn exists<T: AsRef<Path>>(&self, path: T) -> bool {
        let path = path.as_ref();
        path.exists() || path.is_symlink()
    }

    /// Create (or truncate) a capture file for a child process.
    pub fn create_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let f = fs::File::create(path).with_context(|| format!("creating file {path:?}"))?;
        Ok(f)
    }

    /// Write entire str to a file.
    /// The text goes to a temporary sibling first and is renamed into place.
    pub fn write_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        log::trace!("writing {path:?}");
        ops::write_atomic(path, text).with_context(|| format!("writing file {path:?}"))?;
        Ok(())
    }

    /// Write a script and mark it executable.
    pub fn write_script<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.write_file(path, text)?;
        ops::make_executable(path).with_context(|| format!("setting permissions on {path:?}"))?;
        Ok(())
    }

    /// Delete a file.
    pub fn delete_file<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::remove_file(path).with_context(|| format!("deleting file {path:?}"))?;
        Ok(())
    }

    /// Copy file `src` to `tgt`. `src` may live outside the whitelist.
    pub fn copy<T: AsRef<Path>, U: AsRef<Path>>(&self, src: T, tgt: U) -> Result<()> {
        let (src, tgt) = (src.as_ref(), tgt.as_ref());
        self.check_whitelist(tgt)?;
        log::debug!("copying {src:?} to {tgt:?}");
        ops::copy(src, tgt).with_context(|| format!("copying {src:?} to {tgt:?}"))?;
        Ok(())
    }

    /// Move `src` to `tgt`; both must be whitelisted.
    pub fn rename<T: AsRef<Path>, U: AsRef<Path>>(&self, src: T, tgt: U) -> Result<()> {
        let (src, tgt) = (src.as_ref(), tgt.as_ref());
        self.check_whitelist(src)?;
        self.check_whitelist(tgt)?;
        log::debug!("moving {src:?} to {tgt:?}");
        fs::rename(src, tgt).with_context(|| format!("moving {src:?} to {tgt:?}"))?;
        Ok(())
    }

    /// Read a whole state or output file into `strbuf`, reusing its allocation.
    pub fn read_to_buf<T: AsRef<Path>>(&self, path: T, strbuf: &mut String) -> Result<()> {
        use std::io::Read;
        strbuf.clear();
        let mut f = fs::File::open(path.as_ref())?;
        f.read_to_string(strbuf)?;
        Ok(())
    }

    /// Entries of a directory of state files; reading never needs the whitelist.
    pub fn read_dir<T: AsRef<Path>>(&self, path: T) -> Result<fs::ReadDir, io::Error> {
        fs::read_dir(path)
    }

    /// Destructive operations need a path below the job directory,
    /// and are refused outright on a dry run.
    fn check_whitelist(&self, path: &Path) -> Result<()> {
        if !self.dry_run && path.starts_with(&self.root) {
            return Ok(());
        }
        let path = path.to_str().ok_or(PathEncodingError)?.to_owned();
        Err(Error::NotWhitelisted(path).into())
    }
}
