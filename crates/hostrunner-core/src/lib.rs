pub mod error;
pub use error::CoreError;
pub mod proctree;
pub use proctree::{ProcessTable, SystemTable, find_descendant};
pub mod state;
pub use state::{RunnerMetadata, RunnerWorkDir};
