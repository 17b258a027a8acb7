use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Environment overrides applied to every vendor subprocess.
///
/// Internally stored as a list of key–value pairs and serialized as a transparent array wrapper.
/// The controller never touches the process-wide environment; overrides are handed to each child command instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunnerEnv(pub Vec<KeyValue>);

impl RunnerEnv {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the environment is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over all key–value pairs.
    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Get the value for a key, returning the last matching entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Append a key–value pair. Later entries override earlier ones when queried via [`RunnerEnv::get`].
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Merge two environments, where entries from `other` override earlier ones.
    pub fn merged(&self, other: &RunnerEnv) -> RunnerEnv {
        let mut out = self.0.clone();
        out.extend(other.0.clone());
        RunnerEnv(out)
    }

    /// Overrides that move `HOME` (and every inherited value mentioning it) into `new_home`.
    ///
    /// Reads the current process environment; see [`RunnerEnv::redirect_home_from`].
    pub fn redirect_home(new_home: &Path) -> Self {
        Self::redirect_home_from(std::env::vars(), new_home)
    }

    /// Same as [`RunnerEnv::redirect_home`], over an explicit set of variables.
    ///
    /// Values are treated as `:`-separated path lists. A segment equal to the old `HOME`,
    /// or starting with `<old HOME>/`, gets that prefix swapped for `new_home`.
    /// Variables with no such segment are left out, since children inherit them unchanged.
    /// When `HOME` is unset, empty or `/` only `HOME` itself is overridden.
    pub fn redirect_home_from<I, K, V>(vars: I, new_home: &Path) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let new_home = new_home.to_string_lossy();
        let vars: Vec<(String, String)> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let old_home = vars
            .iter()
            .rev()
            .find(|(k, _)| k == "HOME")
            .map(|(_, v)| v.trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty());

        let mut env = RunnerEnv::new();
        match old_home {
            Some(old_home) => {
                for (k, v) in &vars {
                    if let Some(rewritten) = rehome(v, &old_home, &new_home) {
                        env.push(k.as_str(), rewritten);
                    }
                }
                if env.get("HOME").is_none() {
                    env.push("HOME", new_home.as_ref());
                }
            }
            None => env.push("HOME", new_home.as_ref()),
        }
        env
    }
}

/// Rewrites the path-list segments of `value` rooted at `old_home`; `None` when none are.
fn rehome(value: &str, old_home: &str, new_home: &str) -> Option<String> {
    let mut changed = false;
    let segments: Vec<String> = value
        .split(':')
        .map(|segment| match segment.strip_prefix(old_home) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => {
                changed = true;
                format!("{new_home}{rest}")
            }
            _ => segment.to_string(),
        })
        .collect();
    changed.then(|| segments.join(":"))
}

impl Default for RunnerEnv {
    fn default() -> Self {
        Self::new()
    }
}
