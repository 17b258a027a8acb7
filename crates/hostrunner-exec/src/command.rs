//! Invocation boundary for the vendor runner tool.
//!
//! Two shapes of call are needed:
//! - run to completion, where exit code `0` is success and anything else is a failure;
//! - launch detached, where only the pid is kept and the streams go to a log file.
use std::{
    fmt,
    fs::OpenOptions,
    path::{Path, PathBuf},
    process::Stdio,
};

use hostrunner_model::{Pid, RunnerEnv};
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{ExecError, ExecResult};

const REDACTED: &str = "***";

/// A single external command: program, arguments, working directory and environment overrides.
///
/// Arguments added through [`VendorCommand::secret_arg`] are masked wherever the command is rendered.
#[derive(Clone)]
pub struct VendorCommand {
    program: String,
    args: Vec<String>,
    secret: Vec<usize>,
    env: RunnerEnv,
    cwd: Option<PathBuf>,
}

impl VendorCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secret: Vec::new(),
            env: RunnerEnv::new(),
            cwd: None,
        }
    }

    /// `sh -c <script>`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Argument that must never show up in logs or error messages.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secret.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, env: &RunnerEnv) -> Self {
        self.env = self.env.merged(env);
        self
    }

    pub fn current_dir(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn build(&self) -> ExecResult<Command> {
        if self.program.trim().is_empty() {
            return Err(ExecError::MissingProgram);
        }
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        for kv in self.env.iter() {
            cmd.env(kv.key(), kv.value());
        }
        // Vendor scripts prompt on a terminal; give them EOF instead.
        cmd.stdin(Stdio::null());
        Ok(cmd)
    }

    /// Runs to completion with inherited stdout/stderr.
    pub async fn run(&self) -> ExecResult<()> {
        let mut cmd = self.build()?;
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        trace!(target: "hostrunner.exec", command = %self, "spawn");
        let mut child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", self.program)))?;
        let status = child.wait().await?;

        if status.success() {
            debug!(target: "hostrunner.exec", command = %self, "exit success");
            return Ok(());
        }
        match status.code() {
            Some(code) => {
                debug!(target: "hostrunner.exec", command = %self, code, "exit non-zero");
                Err(ExecError::NonZeroExit { code })
            }
            None => Err(ExecError::KilledBySignal),
        }
    }

    /// Starts the command in its own process group and returns without waiting.
    ///
    /// stdout and stderr are appended to `log`; stdin is closed.
    pub fn launch_detached(&self, log: &Path) -> ExecResult<Pid> {
        let out = OpenOptions::new().create(true).append(true).open(log)?;
        let err = out.try_clone()?;

        let mut cmd = self.build()?;
        cmd.stdout(Stdio::from(out));
        cmd.stderr(Stdio::from(err));
        cmd.kill_on_drop(false);
        #[cfg(unix)]
        cmd.process_group(0);

        trace!(target: "hostrunner.exec", command = %self, log = %log.display(), "launch detached");
        let child = cmd
            .spawn()
            .map_err(|e| ExecError::Spawn(format!("{}: {e}", self.program)))?;
        let pid = child
            .id()
            .and_then(Pid::new)
            .ok_or_else(|| ExecError::Spawn(format!("{}: exited before reporting a pid", self.program)))?;

        debug!(target: "hostrunner.exec", command = %self, %pid, "launched");
        Ok(pid)
    }
}

impl fmt::Display for VendorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for (idx, arg) in self.args.iter().enumerate() {
            if self.secret.contains(&idx) {
                write!(f, " {REDACTED}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for VendorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorCommand")
            .field("command", &self.to_string())
            .field("cwd", &self.cwd)
            .field("env_overrides", &self.env.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, time::Duration};

    #[test]
    fn display_masks_secret_args() {
        let cmd = VendorCommand::new("./config.sh")
            .arg("remove")
            .arg("--token")
            .secret_arg("AAAATOKEN");

        assert_eq!(cmd.to_string(), "./config.sh remove --token ***");
        assert!(!format!("{cmd:?}").contains("AAAATOKEN"));
    }

    #[tokio::test]
    async fn run_reports_success_and_exit_code() {
        VendorCommand::shell("exit 0").run().await.unwrap();

        let err = VendorCommand::shell("exit 3").run().await.unwrap_err();
        assert!(matches!(err, ExecError::NonZeroExit { code: 3 }));
    }

    #[tokio::test]
    async fn run_rejects_empty_program() {
        let err = VendorCommand::new("  ").run().await.unwrap_err();
        assert!(matches!(err, ExecError::MissingProgram));
    }

    #[tokio::test]
    async fn run_reports_spawn_failure() {
        let err = VendorCommand::new("/definitely/not/a/program")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Spawn(_)));
    }

    #[tokio::test]
    async fn run_applies_cwd_and_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = RunnerEnv::new();
        env.push("HOSTRUNNER_PROBE", "from-override");

        VendorCommand::shell("printf '%s' \"$HOSTRUNNER_PROBE\" > probe.txt")
            .current_dir(dir.path())
            .env(&env)
            .run()
            .await
            .unwrap();

        let written = fs::read_to_string(dir.path().join("probe.txt")).unwrap();
        assert_eq!(written, "from-override");
        assert!(std::env::var("HOSTRUNNER_PROBE").is_err());
    }

    #[tokio::test]
    async fn launch_detached_redirects_output_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("log.txt");

        let pid = VendorCommand::shell("echo launched; echo oops >&2")
            .launch_detached(&log)
            .unwrap();
        assert!(pid.get() > 0);

        let mut contents = String::new();
        for _ in 0..50 {
            contents = fs::read_to_string(&log).unwrap_or_default();
            if contents.contains("oops") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(contents.contains("launched"));
        assert!(contents.contains("oops"));
    }
}
