use std::path::PathBuf;

use hostrunner_core::CoreError;
use hostrunner_exec::ExecError;
use hostrunner_model::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("the runner has to be set up before this operation: {0} does not exist")]
    NotInstalled(PathBuf),

    #[error("the old runner at {0} has to be removed before it can be set up")]
    AlreadyInstalled(PathBuf),

    #[error("{0} does not exist so the runner can not be cleaned up")]
    NothingToClean(PathBuf),

    #[error("no removal token was supplied and none is recorded in {0}")]
    MissingToken(PathBuf),

    #[error("installation step `{step}` failed: {source}")]
    Install {
        step: String,
        #[source]
        source: ExecError,
    },

    #[error(
        "runner configuration failed: {source}. If the error is 'A runner exists with the same name', \
         remove the runner named '{name}' at {page} or use another name"
    )]
    Config {
        name: String,
        page: String,
        #[source]
        source: ExecError,
    },

    #[error(
        "runner removal failed: {source}. If it reports 'Failed: Removing runner from the server', \
         get a fresh token for the runner from {page} and retry"
    )]
    Removal {
        page: String,
        #[source]
        source: ExecError,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("invalid controller configuration: {0}")]
    Model(#[from] ModelError),

    #[error("process control failed: {0}")]
    Exec(#[from] ExecError),
}

impl LifecycleError {
    /// Operation invoked in the wrong lifecycle state.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            LifecycleError::NotInstalled(_)
                | LifecycleError::AlreadyInstalled(_)
                | LifecycleError::NothingToClean(_)
                | LifecycleError::MissingToken(_)
        )
    }

    /// A vendor command exited unsuccessfully.
    pub fn is_vendor_failure(&self) -> bool {
        matches!(
            self,
            LifecycleError::Install { .. }
                | LifecycleError::Config { .. }
                | LifecycleError::Removal { .. }
        )
    }
}
