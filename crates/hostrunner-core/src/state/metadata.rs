use std::{fs, io, path::Path};

use serde::Deserialize;

use crate::error::CoreError;

pub const METADATA_FILE: &str = ".runner";

/// Subset of the `.runner` descriptor the vendor's configure step writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerMetadata {
    /// Name the runner was registered under.
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub pool_name: Option<String>,
    #[serde(default, rename = "gitHubUrl")]
    pub coordinator_url: Option<String>,
}

impl RunnerMetadata {
    /// `None` when the file does not exist yet.
    pub fn load(work_dir: &Path) -> Result<Option<Self>, CoreError> {
        let path = work_dir.join(METADATA_FILE);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoreError::io(path, e)),
        };
        Self::parse(&raw)
            .map(Some)
            .map_err(|reason| CoreError::Metadata { path, reason })
    }

    /// The vendor tool writes this file with a UTF-8 byte-order mark.
    fn parse(raw: &[u8]) -> Result<Self, String> {
        let raw = raw.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(raw);
        serde_json::from_slice(raw).map_err(|e| e.to_string())
    }
}
