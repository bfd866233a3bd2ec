use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;

use util::PathEncodingError;

use super::Error;

/// Copy file `src` to `tgt`, recreating the link if `src` is a symlink.
pub fn copy(src: &Path, tgt: &Path) -> Result<()> {
    if src.is_symlink() {
        let link_tgt = fs::read_link(src)?;
        if tgt.is_symlink() || tgt.exists() {
            fs::remove_file(tgt)?;
        }
        symlink(&link_tgt, tgt)?;
    } else if src.is_file() {
        fs::copy(src, tgt)?;
    } else {
        return Err(
            Error::UnknownPathType(src.to_str().ok_or(PathEncodingError)?.to_owned()).into(),
        );
    }
    Ok(())
}

/// Write `text` to a hidden sibling of `path`, then rename it over `path`.
pub fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let tmp = tmp_sibling(path)?;
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(text.as_bytes())?;
        f.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn tmp_sibling(path: &Path) -> Result<PathBuf> {
    let fname = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or(PathEncodingError)?;
    Ok(path.with_file_name(format!(".{fname}.tmp")))
}

/// Set the executable bits on a file (no-op off unix).
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Symlink the given `link` to `tgt`; works for unix and windows.
pub fn symlink(tgt: &Path, link: &Path) -> Result<()> {
    #[cfg(unix)]
    std::os::unix::fs::symlink(tgt, link)?;

    #[cfg(windows)]
    if tgt.is_dir() {
        std::os::windows::fs::symlink_dir(tgt, link)?;
    } else {
        std::os::windows::fs::symlink_file(tgt, link)?;
    }
    Ok(())
}
