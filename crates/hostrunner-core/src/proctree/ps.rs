use std::{path::Path, process::Command};

use hostrunner_model::Pid;
use tracing::trace;

use super::ProcessTable;

/// [`ProcessTable`] backed by `ps` and `pgrep`, for Unix systems without `/proc`.
///
/// A non-zero exit from either tool is read as "no such process" / "no children".
#[derive(Debug, Clone, Default)]
pub struct PsTable;

impl PsTable {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessTable for PsTable {
    fn name_of(&self, pid: Pid) -> Option<String> {
        let out = capture("ps", &["-p", &pid.to_string(), "-o", "comm="])?;
        parse_comm(&out)
    }

    fn children_of(&self, pid: Pid) -> Vec<Pid> {
        capture("pgrep", &["-P", &pid.to_string()])
            .map(|out| parse_pids(&out))
            .unwrap_or_default()
    }
}

fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = match Command::new(program).args(args).output() {
        Ok(output) => output,
        Err(e) => {
            trace!(target: "hostrunner.core.ps", program, error = %e, "spawn failed");
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Some `ps` builds print the full executable path for `comm`; keep the basename.
fn parse_comm(out: &str) -> Option<String> {
    let line = out.lines().next()?.trim();
    if line.is_empty() {
        return None;
    }
    let base = Path::new(line)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(line);
    Some(base.to_string())
}

fn parse_pids(out: &str) -> Vec<Pid> {
    out.split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect()
}
