//! On-disk markers kept next to an installed runner.
//!
//! The work directory doubles as the "installed" marker. Two optional files live inside it:
//! - `.pid`: decimal pid of the last listener the controller located;
//! - `.token`: the registration token, so deregistration works without the caller re-supplying it.
//!
//! An empty file means the same as a missing one. Nothing is cached in memory:
//! the vendor scripts run inside the same directory and every read goes back to disk.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use hostrunner_model::Pid;
use tracing::{debug, warn};

use crate::error::CoreError;

mod metadata;
pub use metadata::RunnerMetadata;

pub const PID_FILE: &str = ".pid";
pub const TOKEN_FILE: &str = ".token";

/// Handle to a runner work directory. Cheap to clone; holds only the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerWorkDir {
    path: PathBuf,
}

impl RunnerWorkDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid_file(&self) -> PathBuf {
        self.path.join(PID_FILE)
    }

    pub fn token_file(&self) -> PathBuf {
        self.path.join(TOKEN_FILE)
    }

    pub fn is_installed(&self) -> bool {
        self.path.is_dir()
    }

    /// `true` when the directory exists and holds no entries.
    pub fn is_empty(&self) -> Result<bool, CoreError> {
        let mut entries = fs::read_dir(&self.path).map_err(|e| CoreError::io(&self.path, e))?;
        Ok(entries.next().is_none())
    }

    pub fn create(&self) -> Result<(), CoreError> {
        fs::create_dir_all(&self.path).map_err(|e| CoreError::io(&self.path, e))?;
        debug!(target: "hostrunner.core.state", path = %self.path.display(), "work directory created");
        Ok(())
    }

    /// Deletes the directory and everything in it. Missing is fine.
    pub fn remove_all(&self) -> Result<(), CoreError> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!(target: "hostrunner.core.state", path = %self.path.display(), "work directory removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CoreError::io(&self.path, e)),
        }
    }

    /// Recorded listener pid, if any.
    ///
    /// Unparseable contents are logged and treated as absent.
    pub fn read_pid(&self) -> Result<Option<Pid>, CoreError> {
        let Some(raw) = read_marker(&self.pid_file())? else {
            return Ok(None);
        };
        match raw.parse::<Pid>() {
            Ok(pid) => Ok(Some(pid)),
            Err(e) => {
                warn!(target: "hostrunner.core.state", file = %self.pid_file().display(), error = %e, "ignoring malformed pid file");
                Ok(None)
            }
        }
    }

    pub fn write_pid(&self, pid: Pid) -> Result<(), CoreError> {
        write_atomic(&self.pid_file(), &pid.to_string())
    }

    pub fn clear_pid(&self) -> Result<(), CoreError> {
        remove_marker(&self.pid_file())
    }

    pub fn read_token(&self) -> Result<Option<String>, CoreError> {
        read_marker(&self.token_file())
    }

    pub fn write_token(&self, token: &str) -> Result<(), CoreError> {
        write_atomic(&self.token_file(), token)
    }

    /// Vendor-written `.runner` descriptor, if configuration got that far.
    pub fn metadata(&self) -> Result<Option<RunnerMetadata>, CoreError> {
        RunnerMetadata::load(&self.path)
    }
}

/// Trimmed file contents; `None` when missing or blank.
fn read_marker(path: &Path) -> Result<Option<String>, CoreError> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let value = raw.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

fn remove_marker(path: &Path) -> Result<(), CoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CoreError::io(path, e)),
    }
}

/// Write to a sibling temp file, then rename over `path`.
fn write_atomic(path: &Path, contents: &str) -> Result<(), CoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!("{file_name}.tmp-{}", std::process::id()));

    fs::write(&tmp, contents).map_err(|e| CoreError::io(&tmp, e))?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(CoreError::io(path, e));
    }
    Ok(())
}
