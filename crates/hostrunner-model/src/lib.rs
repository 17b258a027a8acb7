mod error;
pub use error::ModelError;

mod kv;
pub use kv::KeyValue;

mod env;
pub use env::RunnerEnv;

mod labels;
pub use labels::RunnerLabels;

mod config;
pub use config::{RunnerConfig, runners_page};

mod pid;
pub use pid::Pid;

mod settle;
pub use settle::SettleStrategy;

mod status;
pub use status::RunnerStatus;

/// Timeout value in milliseconds.
pub type TimeoutMs = u64;
