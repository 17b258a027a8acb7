use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Capability tags a runner advertises to the coordinator.
///
/// Stored as an ordered set so the rendered flag value is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunnerLabels(BTreeSet<String>);

impl RunnerLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>) -> bool {
        self.0.insert(label.into())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Comma-joined form used as the `--labels` value.
    pub fn to_flag_value(&self) -> String {
        self.iter().collect::<Vec<_>>().join(",")
    }
}

impl<S: Into<String>> FromIterator<S> for RunnerLabels {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_value_is_sorted_and_deduplicated() {
        let labels: RunnerLabels = ["opencl", "cuda", "multicore", "cuda"].into_iter().collect();

        assert_eq!(labels.len(), 3);
        assert_eq!(labels.to_flag_value(), "cuda,multicore,opencl");
    }

    #[test]
    fn empty_labels_render_empty() {
        assert_eq!(RunnerLabels::new().to_flag_value(), "");
    }
}
