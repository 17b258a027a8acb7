use std::path::{Path, PathBuf};

use hostrunner_core::RunnerWorkDir;
use hostrunner_exec::VendorCommand;
use hostrunner_model::{RunnerConfig, RunnerEnv, SettleStrategy};

const RUNNER_VERSION: &str = "2.300.2";
const RUNNER_SHA256: &str = "ed5bf2799c1ef7b2dd607df66e6b676dff8c44fb359c6fedc9ebf7db53339f0c";

/// Where the runner lives and how it is driven.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Directory holding the work directory and the launch logs.
    pub base_dir: PathBuf,
    /// Work directory name under `base_dir`.
    pub folder: String,
    /// `comm` of the long-lived process forked by the run command.
    pub listener_name: String,
    /// How long `start` keeps looking for the listener.
    pub settle: SettleStrategy,
    /// Pause after killing the listener so the OS can reap it.
    pub stop_grace_ms: u64,
    pub commands: VendorCommands,
    /// Overrides for every vendor subprocess.
    ///
    /// `None` redirects `HOME` into the work directory (see [`RunnerEnv::redirect_home`]).
    pub env: Option<RunnerEnv>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            folder: "actions-runner".to_string(),
            listener_name: "Runner.Listener".to_string(),
            settle: SettleStrategy::default(),
            stop_grace_ms: 1_000,
            commands: VendorCommands::default(),
            env: None,
        }
    }
}

impl ControllerConfig {
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn with_listener_name(mut self, name: impl Into<String>) -> Self {
        self.listener_name = name.into();
        self
    }

    pub fn with_settle(mut self, settle: SettleStrategy) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_stop_grace_ms(mut self, ms: u64) -> Self {
        self.stop_grace_ms = ms;
        self
    }

    pub fn with_commands(mut self, commands: VendorCommands) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_env(mut self, env: RunnerEnv) -> Self {
        self.env = Some(env);
        self
    }

    pub fn work_dir(&self) -> RunnerWorkDir {
        RunnerWorkDir::new(self.base_dir.join(&self.folder))
    }

    /// Overrides handed to each vendor subprocess.
    pub(crate) fn subprocess_env(&self) -> RunnerEnv {
        match &self.env {
            Some(env) => env.clone(),
            None => {
                let work = self.base_dir.join(&self.folder);
                let work = std::path::absolute(&work).unwrap_or(work);
                RunnerEnv::redirect_home(&work)
            }
        }
    }
}

/// Vendor tool entry points, all resolved relative to the work directory.
#[derive(Debug, Clone)]
pub struct VendorCommands {
    /// Shell lines run in order to download and unpack the runner.
    pub install_steps: Vec<String>,
    /// Registration script; also performs deregistration via its `remove` subcommand.
    pub configure_program: String,
    /// Foreground launcher for the listener.
    pub run_program: String,
}

impl Default for VendorCommands {
    fn default() -> Self {
        let archive = format!("actions-runner-linux-x64-{RUNNER_VERSION}.tar.gz");
        Self {
            install_steps: vec![
                format!(
                    "curl -o {archive} -L https://github.com/actions/runner/releases/download/v{RUNNER_VERSION}/{archive}"
                ),
                format!("echo \"{RUNNER_SHA256}  {archive}\" | shasum -a 256 -c"),
                format!("tar xzf ./{archive}"),
                format!("rm {archive}"),
            ],
            configure_program: "./config.sh".to_string(),
            run_program: "./run.sh".to_string(),
        }
    }
}

impl VendorCommands {
    pub fn install_step(&self, step: &str) -> VendorCommand {
        VendorCommand::shell(step)
    }

    /// `config.sh --unattended --url .. --name .. [--labels ..] --token ..`
    pub fn configure(&self, runner: &RunnerConfig) -> VendorCommand {
        let mut cmd = VendorCommand::new(&self.configure_program)
            .arg("--unattended")
            .args(["--url", runner.coordinator_url.as_str()])
            .args(["--name", runner.name.as_str()]);
        if !runner.labels.is_empty() {
            cmd = cmd.args(["--labels".to_string(), runner.labels.to_flag_value()]);
        }
        cmd.arg("--token").secret_arg(&runner.token)
    }

    /// `config.sh remove --token ..`
    pub fn remove(&self, token: &str) -> VendorCommand {
        VendorCommand::new(&self.configure_program)
            .arg("remove")
            .arg("--token")
            .secret_arg(token)
    }

    pub fn run(&self) -> VendorCommand {
        VendorCommand::new(&self.run_program)
    }

    /// Whether the registration script has been unpacked into `work_dir`.
    pub fn has_configure_script(&self, work_dir: &Path) -> bool {
        work_dir.join(&self.configure_program).is_file()
    }
}
