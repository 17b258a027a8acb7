//! Locating a named process among the descendants of a known root.
//!
//! ## Overview
//!
//! A launcher (`run.sh`, a shell wrapper) is the only pid the controller learns when it starts a runner.
//! The long-lived listener is forked somewhere below it, so the controller searches the live process tree.
//! - The search is a breadth-first walk; the first match at the shallowest depth wins.
//! - Enumeration is behind [`ProcessTable`], so the walk is identical on every platform.
//! - Nothing is cached: every query goes to the OS, since the tree changes between reads.
use std::collections::{HashSet, VecDeque};

use hostrunner_model::Pid;
use tracing::trace;

#[cfg(target_os = "linux")]
mod procfs;
#[cfg(target_os = "linux")]
pub use procfs::ProcFs;

#[cfg(unix)]
mod ps;
#[cfg(unix)]
pub use ps::PsTable;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        /// Process table used by default on this platform.
        pub type SystemTable = ProcFs;
    } else if #[cfg(unix)] {
        /// Process table used by default on this platform.
        pub type SystemTable = PsTable;
    } else {
        compile_error!("hostrunner-core supports unix targets only");
    }
}

/// Read-only view of the live process table.
///
/// Both queries are infallible by contract: a pid that has exited has no name and no children.
pub trait ProcessTable {
    /// Short executable name (`comm`) of a live process, or `None` if it is gone.
    fn name_of(&self, pid: Pid) -> Option<String>;

    /// Direct children of `pid`. Empty when it has none or no longer exists.
    fn children_of(&self, pid: Pid) -> Vec<Pid>;

    /// Whether `pid` currently denotes a live process.
    fn is_alive(&self, pid: Pid) -> bool {
        self.name_of(pid).is_some()
    }
}

/// Breadth-first search below (and including) `root` for a process named `target`.
pub fn find_descendant<T>(table: &T, root: Pid, target: &str) -> Option<Pid>
where
    T: ProcessTable + ?Sized,
{
    let mut queue = VecDeque::from([root]);
    let mut seen = HashSet::from([root]);

    while let Some(pid) = queue.pop_front() {
        let name = table.name_of(pid);
        trace!(target: "hostrunner.core.proctree", %pid, name = ?name, "visit");

        if name.as_deref() == Some(target) {
            return Some(pid);
        }
        for child in table.children_of(pid) {
            if seen.insert(child) {
                queue.push_back(child);
            }
        }
    }
    None
}
