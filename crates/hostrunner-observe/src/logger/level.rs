use std::fmt;

use tracing_subscriber::EnvFilter;

use crate::logger::error::LoggerError;

/// A validated `EnvFilter` directive, e.g. `info` or `warn,hostrunner.lifecycle=debug`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerLevel(String);

impl LoggerLevel {
    pub fn new(directive: impl Into<String>) -> Result<Self, LoggerError> {
        let directive = directive.into();
        let directive = directive.trim();
        if directive.is_empty() {
            return Err(LoggerError::InvalidLogLevel(String::new()));
        }
        EnvFilter::try_new(directive)
            .map_err(|e| LoggerError::InvalidLogLevel(format!("{directive}: {e}")))?;
        Ok(Self(directive.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn filter(&self) -> Result<EnvFilter, LoggerError> {
        EnvFilter::try_new(&self.0).map_err(|e| LoggerError::InvalidLogLevel(format!("{}: {e}", self.0)))
    }
}

impl Default for LoggerLevel {
    fn default() -> Self {
        Self("info".to_string())
    }
}

impl fmt::Display for LoggerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
