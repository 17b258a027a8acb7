mod error;
pub use error::{ExecError, ExecResult};

pub mod command;
pub use command::VendorCommand;

pub mod signal;
pub use signal::{KillOutcome, kill_forcefully};

