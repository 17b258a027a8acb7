pub mod error;
pub use error::LifecycleError;

mod config;
pub use config::{ControllerConfig, VendorCommands};

mod install;
pub use install::Installer;

mod controller;
pub use controller::{RunnerController, StartOutcome, StopOutcome};

pub mod prelude {
    pub use crate::{
        ControllerConfig, LifecycleError, RunnerController, StartOutcome, StopOutcome,
        VendorCommands,
    };
    pub use hostrunner_model::{RunnerConfig, RunnerLabels, RunnerStatus, SettleStrategy};
}
