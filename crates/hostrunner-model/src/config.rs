use std::fmt;

use serde::{Deserialize, Serialize};

use crate::RunnerLabels;

/// Registration parameters for a single runner.
///
/// Supplied already validated: every field is expected to be present and non-empty.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// One-time registration token issued by the coordinator.
    pub token: String,
    /// Endpoint the runner registers against (a repository or organization URL).
    pub coordinator_url: String,
    pub name: String,
    #[serde(default)]
    pub labels: RunnerLabels,
}

impl RunnerConfig {
    pub fn new(
        token: impl Into<String>,
        coordinator_url: impl Into<String>,
        name: impl Into<String>,
        labels: RunnerLabels,
    ) -> Self {
        Self {
            token: token.into(),
            coordinator_url: coordinator_url.into(),
            name: name.into(),
            labels,
        }
    }

    /// Coordinator page listing registered runners, where stale registrations and fresh tokens live.
    pub fn runners_page(&self) -> String {
        runners_page(&self.coordinator_url)
    }
}

/// See [`RunnerConfig::runners_page`].
pub fn runners_page(coordinator_url: &str) -> String {
    format!(
        "{}/settings/actions/runners",
        coordinator_url.trim_end_matches('/')
    )
}

// The token is a credential; keep it out of logs.
impl fmt::Debug for RunnerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("token", &"<redacted>")
            .field("coordinator_url", &self.coordinator_url)
            .field("name", &self.name)
            .field("labels", &self.labels)
            .finish()
    }
}
