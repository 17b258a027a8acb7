use serde::{Deserialize, Serialize};

/// Logical lifecycle state of an installation. Computed on demand, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunnerStatus {
    /// No work directory.
    Absent,
    /// Work directory present, no live listener confirmed.
    Installed,
    /// Work directory present and the recorded listener is alive.
    Running,
}

impl RunnerStatus {
    pub fn is_installed(&self) -> bool {
        !matches!(self, RunnerStatus::Absent)
    }
}
