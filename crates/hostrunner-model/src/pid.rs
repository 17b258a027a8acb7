use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Operating-system process id. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pid(u32);

impl Pid {
    /// Returns `None` for `0`, which never names a real process.
    pub fn new(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0
    }

    /// Signed form expected by `kill(2)` and friends.
    ///
    /// Values beyond `i32::MAX` cannot be produced by the kernel; they saturate.
    #[inline]
    pub fn as_raw(self) -> i32 {
        i32::try_from(self.0).unwrap_or(i32::MAX)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Pid {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .ok()
            .and_then(Pid::new)
            .ok_or_else(|| ModelError::InvalidPid(s.to_string()))
    }
}

impl TryFrom<u32> for Pid {
    type Error = ModelError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Pid::new(raw).ok_or_else(|| ModelError::InvalidPid(raw.to_string()))
    }
}
