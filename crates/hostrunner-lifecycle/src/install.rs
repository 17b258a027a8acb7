use hostrunner_core::RunnerWorkDir;
use hostrunner_model::{RunnerConfig, RunnerEnv};
use tracing::{debug, info, instrument};

use crate::{config::ControllerConfig, error::LifecycleError};

/// Materializes the runner into its work directory and registers it with the coordinator.
///
/// Not atomic: a failed step leaves the directory as far as it got.
/// Recovery is `remove`/`clean` (or deleting the directory) followed by a fresh `setup`.
pub struct Installer<'a> {
    cfg: &'a ControllerConfig,
    work: &'a RunnerWorkDir,
    env: &'a RunnerEnv,
}

impl<'a> Installer<'a> {
    pub fn new(cfg: &'a ControllerConfig, work: &'a RunnerWorkDir, env: &'a RunnerEnv) -> Self {
        Self { cfg, work, env }
    }

    #[instrument(level = "debug", skip(self, runner), fields(name = %runner.name, url = %runner.coordinator_url))]
    pub async fn setup(&self, runner: &RunnerConfig) -> Result<(), LifecycleError> {
        // A leftover empty directory carries no installation.
        if self.work.is_installed() && !self.work.is_empty()? {
            return Err(LifecycleError::AlreadyInstalled(self.work.path().to_path_buf()));
        }
        self.work.create()?;

        for step in &self.cfg.commands.install_steps {
            debug!(target: "hostrunner.lifecycle.install", step = %step, "running install step");
            self.cfg
                .commands
                .install_step(step)
                .current_dir(self.work.path())
                .env(self.env)
                .run()
                .await
                .map_err(|source| LifecycleError::Install {
                    step: step.clone(),
                    source,
                })?;
        }

        let configure = self
            .cfg
            .commands
            .configure(runner)
            .current_dir(self.work.path())
            .env(self.env);
        info!(target: "hostrunner.lifecycle.install", command = %configure, "configuring runner");
        configure
            .run()
            .await
            .map_err(|source| LifecycleError::Config {
                name: runner.name.clone(),
                page: runner.runners_page(),
                source,
            })?;

        self.work.write_token(&runner.token)?;

        info!(target: "hostrunner.lifecycle.install", runner = %runner.name, path = %self.work.path().display(), "runner has been set up");
        Ok(())
    }
}
