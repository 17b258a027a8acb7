use std::{
    fs,
    path::{Path, PathBuf},
};

use hostrunner_model::Pid;
use tracing::trace;

use super::ProcessTable;

/// [`ProcessTable`] backed by `/proc`.
///
/// Names and parent links both come from `/proc/<pid>/stat`.
/// Zombies (`Z`) and dead tasks (`X`) report no name: they can no longer serve anything.
/// The kernel cuts `comm` to 15 bytes; a name at that limit is completed from `cmdline`.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Reads from an alternative mount point.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn stat(&self, pid: Pid) -> Option<Stat> {
        read_stat(&self.root.join(pid.to_string()).join("stat"))
    }

    /// Basename of `argv[0]`, when it extends the truncated `comm`.
    fn full_name(&self, pid: Pid, comm: &str) -> Option<String> {
        let raw = fs::read(self.root.join(pid.to_string()).join("cmdline")).ok()?;
        let argv0 = raw.split(|b| *b == 0).next()?;
        let argv0 = String::from_utf8_lossy(argv0);
        let base = argv0.rsplit('/').next()?;
        (base.len() > comm.len() && base.starts_with(comm)).then(|| base.to_string())
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcFs {
    fn name_of(&self, pid: Pid) -> Option<String> {
        let stat = self.stat(pid)?;
        if matches!(stat.state, 'Z' | 'X' | 'x') || stat.comm.is_empty() {
            return None;
        }
        if stat.comm.len() < COMM_MAX {
            return Some(stat.comm);
        }
        Some(self.full_name(pid, &stat.comm).unwrap_or(stat.comm))
    }

    fn children_of(&self, pid: Pid) -> Vec<Pid> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            trace!(target: "hostrunner.core.procfs", root = %self.root.display(), "proc root unreadable");
            return Vec::new();
        };

        let mut children: Vec<Pid> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str()?.parse::<Pid>().ok())
            .filter(|candidate| {
                self.stat(*candidate)
                    .is_some_and(|stat| stat.ppid == pid.get())
            })
            .collect();
        children.sort_unstable();
        children
    }
}

/// `TASK_COMM_LEN - 1`.
const COMM_MAX: usize = 15;

struct Stat {
    comm: String,
    state: char,
    ppid: u32,
}

fn read_stat(path: &Path) -> Option<Stat> {
    parse_stat(&fs::read_to_string(path).ok()?)
}

/// `pid (comm) state ppid ...`; `comm` may itself contain spaces and parentheses.
fn parse_stat(line: &str) -> Option<Stat> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    let comm = line.get(open + 1..close)?.to_string();

    let mut rest = line.get(close + 1..)?.split_whitespace();
    let state = rest.next()?.chars().next()?;
    let ppid = rest.next()?.parse().ok()?;

    Some(Stat { comm, state, ppid })
}
