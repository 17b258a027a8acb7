use hostrunner_model::Pid;
use nix::{
    errno::Errno,
    sys::signal::{Signal, kill},
    unistd,
};
use tracing::trace;

use crate::error::{ExecError, ExecResult};

/// Result of a forceful termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOutcome {
    /// The signal was delivered.
    Killed,
    /// No process with that pid exists anymore.
    AlreadyExited,
}

/// Sends `SIGKILL` to `pid`.
///
/// A process that is already gone (`ESRCH`) is not an error.
#[cfg(unix)]
pub fn kill_forcefully(pid: Pid) -> ExecResult<KillOutcome> {
    match kill(unistd::Pid::from_raw(pid.as_raw()), Signal::SIGKILL) {
        Ok(()) => {
            trace!(target: "hostrunner.exec.signal", %pid, "SIGKILL delivered");
            Ok(KillOutcome::Killed)
        }
        Err(Errno::ESRCH) => {
            trace!(target: "hostrunner.exec.signal", %pid, "process already exited");
            Ok(KillOutcome::AlreadyExited)
        }
        Err(e) => Err(ExecError::Signal(format!("kill {pid}: {e}"))),
    }
}
