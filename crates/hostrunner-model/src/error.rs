use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid pid: {0:?}")]
    InvalidPid(String),
    #[error("invalid settle strategy: {0}")]
    InvalidSettle(String),
}
