use crate::backup::result_error::result::Result;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Removes `path`, treating an already missing file as success.
pub fn remove_if_exists<P: AsRef<Path>>(path: P) -> Result<bool> {
    match std::fs::remove_file(path.as_ref()) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Restricts `path` to owner read/write.
pub fn restrict_permissions<P: AsRef<Path>>(path: P) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path.as_ref(), std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

/// Creates a new file at `path` that only the owner can read or write from
/// its first byte. Fails if `path` already exists.
pub fn create_private<P: AsRef<Path>>(path: P) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    Ok(options.open(path.as_ref())?)
}

/// Creates `dir` if needed and proves a file can be written in it.
pub fn ensure_writable_dir<P: AsRef<Path>>(dir: P) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;
    tempfile::Builder::new()
        .prefix(".write-probe")
        .tempfile_in(dir)?;
    Ok(())
}

pub fn is_writable_dir<P: AsRef<Path>>(dir: P) -> bool {
    let dir = dir.as_ref();
    dir.is_dir()
        && tempfile::Builder::new()
            .prefix(".write-probe")
            .tempfile_in(dir)
            .is_ok()
}

/// Deletes the file it guards when dropped, unless `keep` was called.
#[derive(Debug)]
pub struct RemoveOnDrop {
    path: PathBuf,
    armed: bool,
}

impl RemoveOnDrop {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = remove_if_exists(&self.path) {
            warn!("Failed to remove {:?}: {e}", self.path);
        }
    }
}
