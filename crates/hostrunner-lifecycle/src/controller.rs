//! Start / stop / remove / clean for one installed runner.
//!
//! States are `Absent` (no work directory), `Installed` and `Running`.
//! Liveness is checked lazily against the process table rather than persisted.
//! `stop` always runs before anything re-launches or deregisters the runner,
//! so two listeners never serve the same registration.
use std::{path::PathBuf, time::Duration};

use hostrunner_core::{ProcessTable, RunnerWorkDir, SystemTable, find_descendant};
use hostrunner_exec::{KillOutcome, kill_forcefully};
use hostrunner_model::{Pid, RunnerConfig, RunnerEnv, RunnerStatus, runners_page};
use time::{OffsetDateTime, macros::format_description};
use tracing::{debug, info, instrument, warn};

use crate::{config::ControllerConfig, error::LifecycleError, install::Installer};

/// What `start` managed to establish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The listener was located and its pid recorded.
    Listening(Pid),
    /// The launcher ran but no listener showed up within the settle window. Nothing recorded.
    ListenerNotFound { launcher: Pid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The listener was killed.
    Stopped(Pid),
    /// Nothing recorded, or the recorded process is already gone.
    NotRunning,
}

pub struct RunnerController<P = SystemTable> {
    cfg: ControllerConfig,
    work: RunnerWorkDir,
    env: RunnerEnv,
    table: P,
}

impl RunnerController<SystemTable> {
    pub fn new(cfg: ControllerConfig) -> Self {
        Self::with_table(cfg, SystemTable::default())
    }
}

impl<P> RunnerController<P>
where
    P: ProcessTable + Clone + Send + 'static,
{
    pub fn with_table(cfg: ControllerConfig, table: P) -> Self {
        let work = cfg.work_dir();
        let env = cfg.subprocess_env();
        Self {
            cfg,
            work,
            env,
            table,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.cfg
    }

    pub fn work_dir(&self) -> &RunnerWorkDir {
        &self.work
    }

    pub fn is_installed(&self) -> bool {
        self.work.is_installed()
    }

    /// Installs and registers the runner. See [`Installer`].
    pub async fn setup(&self, runner: &RunnerConfig) -> Result<(), LifecycleError> {
        Installer::new(&self.cfg, &self.work, &self.env)
            .setup(runner)
            .await
    }

    pub async fn status(&self) -> Result<RunnerStatus, LifecycleError> {
        if !self.work.is_installed() {
            return Ok(RunnerStatus::Absent);
        }
        let running = match self.work.read_pid()? {
            Some(pid) => self.locate_listener(pid).await.is_some(),
            None => false,
        };
        Ok(if running {
            RunnerStatus::Running
        } else {
            RunnerStatus::Installed
        })
    }

    /// Stops any previous listener, launches the runner and records the new listener pid.
    #[instrument(level = "debug", skip(self), fields(path = %self.work.path().display()))]
    pub async fn start(&self) -> Result<StartOutcome, LifecycleError> {
        self.ensure_installed()?;
        self.cfg.settle.validate()?;
        self.stop().await?;

        let log = self.cfg.base_dir.join(log_file_name(now()));
        let launcher = self
            .cfg
            .commands
            .run()
            .current_dir(self.work.path())
            .env(&self.env)
            .launch_detached(&log)?;
        debug!(target: "hostrunner.lifecycle", %launcher, log = %log.display(), "runner launched");

        match self.await_listener(launcher).await {
            Some(listener) => {
                self.work.write_pid(listener)?;
                info!(target: "hostrunner.lifecycle", runner = %self.runner_name(), pid = %listener, "the runner has started");
                Ok(StartOutcome::Listening(listener))
            }
            None => {
                self.work.clear_pid()?;
                warn!(
                    target: "hostrunner.lifecycle",
                    runner = %self.runner_name(),
                    %launcher,
                    listener = %self.cfg.listener_name,
                    timeout_ms = self.cfg.settle.timeout_ms,
                    "listener never appeared; no pid recorded"
                );
                Ok(StartOutcome::ListenerNotFound { launcher })
            }
        }
    }

    /// Kills the recorded listener, if it is still the process we launched.
    #[instrument(level = "debug", skip(self), fields(path = %self.work.path().display()))]
    pub async fn stop(&self) -> Result<StopOutcome, LifecycleError> {
        self.ensure_installed()?;

        let Some(recorded) = self.work.read_pid()? else {
            debug!(target: "hostrunner.lifecycle", "no recorded pid; nothing to stop");
            return Ok(StopOutcome::NotRunning);
        };
        // The pid may have been reused since it was recorded; only kill a process with the listener's name.
        let Some(listener) = self.locate_listener(recorded).await else {
            debug!(target: "hostrunner.lifecycle", %recorded, "recorded listener is gone");
            return Ok(StopOutcome::NotRunning);
        };

        match kill_forcefully(listener)? {
            KillOutcome::AlreadyExited => Ok(StopOutcome::NotRunning),
            KillOutcome::Killed => {
                tokio::time::sleep(Duration::from_millis(self.cfg.stop_grace_ms)).await;
                info!(target: "hostrunner.lifecycle", runner = %self.runner_name(), pid = %listener, "the runner has stopped");
                Ok(StopOutcome::Stopped(listener))
            }
        }
    }

    /// Deregisters the runner from the coordinator and deletes the work directory.
    ///
    /// `token` falls back to the one recorded at setup.
    #[instrument(level = "debug", skip(self, token), fields(path = %self.work.path().display()))]
    pub async fn remove(&self, token: Option<&str>) -> Result<(), LifecycleError> {
        self.ensure_installed()?;

        let token = match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => token.to_string(),
            None => self
                .work
                .read_token()?
                .ok_or_else(|| LifecycleError::MissingToken(self.work.path().to_path_buf()))?,
        };
        let name = self.runner_name();

        if self.cfg.commands.has_configure_script(self.work.path()) {
            let page = self.runners_page();
            self.cfg
                .commands
                .remove(&token)
                .current_dir(self.work.path())
                .env(&self.env)
                .run()
                .await
                .map_err(|source| LifecycleError::Removal { page, source })?;
        } else {
            warn!(
                target: "hostrunner.lifecycle",
                program = %self.cfg.commands.configure_program,
                "configure script missing; skipping deregistration"
            );
        }

        self.work.remove_all()?;
        info!(target: "hostrunner.lifecycle", runner = %name, "the runner has been removed");
        Ok(())
    }

    /// `stop` followed by `remove`.
    pub async fn clean(&self, token: Option<&str>) -> Result<(), LifecycleError> {
        if !self.work.is_installed() {
            return Err(LifecycleError::NothingToClean(self.work.path().to_path_buf()));
        }
        self.stop().await?;
        self.remove(token).await
    }

    fn ensure_installed(&self) -> Result<(), LifecycleError> {
        if self.work.is_installed() {
            Ok(())
        } else {
            Err(LifecycleError::NotInstalled(self.work.path().to_path_buf()))
        }
    }

    /// Polls below `launcher` until the listener appears or the settle window closes.
    async fn await_listener(&self, launcher: Pid) -> Option<Pid> {
        for delay in self.cfg.settle.delays() {
            tokio::time::sleep(delay).await;
            if let Some(listener) = self.locate_listener(launcher).await {
                return Some(listener);
            }
            // Once the launcher is gone its orphans are reparented and unreachable from here.
            if !self.lookup(move |table| table.is_alive(launcher)).await.unwrap_or(false) {
                debug!(target: "hostrunner.lifecycle", %launcher, "launcher exited before the listener appeared");
                return None;
            }
        }
        self.locate_listener(launcher).await
    }

    async fn locate_listener(&self, root: Pid) -> Option<Pid> {
        let name = self.cfg.listener_name.clone();
        self.lookup(move |table| find_descendant(table, root, &name))
            .await
            .flatten()
    }

    /// Runs a process-table query on the blocking pool; `/proc` reads and `ps` calls block.
    async fn lookup<R, F>(&self, query: F) -> Option<R>
    where
        F: FnOnce(&P) -> R + Send + 'static,
        R: Send + 'static,
    {
        let table = self.table.clone();
        match tokio::task::spawn_blocking(move || query(&table)).await {
            Ok(found) => Some(found),
            Err(e) => {
                warn!(target: "hostrunner.lifecycle", error = %e, "process table lookup failed");
                None
            }
        }
    }

    /// Registered name from the vendor descriptor, falling back to the folder name.
    fn runner_name(&self) -> String {
        let name = match self.work.metadata() {
            Ok(meta) => meta.and_then(|meta| meta.agent_name),
            Err(e) => {
                warn!(target: "hostrunner.lifecycle", error = %e, "unreadable runner metadata");
                None
            }
        };
        name.unwrap_or_else(|| self.cfg.folder.clone())
    }

    fn runners_page(&self) -> String {
        self.work
            .metadata()
            .ok()
            .flatten()
            .and_then(|meta| meta.coordinator_url)
            .map(|url| runners_page(&url))
            .unwrap_or_else(|| "the coordinator's runner settings page".to_string())
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `log-YYYY-MM-DD--HH-MM-SS.txt`
fn log_file_name(at: OffsetDateTime) -> PathBuf {
    let stamp = at
        .format(format_description!(
            "[year]-[month]-[day]--[hour]-[minute]-[second]"
        ))
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    PathBuf::from(format!("log-{stamp}.txt"))
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use hostrunner_model::SettleStrategy;
    use tempfile::TempDir;

    use super::*;
    use crate::config::VendorCommands;

    const TOKEN: &str = "TESTTOKEN";

    struct Vendor {
        configure_exit: i32,
        remove_exit: i32,
        run_script: &'static str,
    }

    impl Default for Vendor {
        fn default() -> Self {
            Self {
                configure_exit: 0,
                remove_exit: 0,
                run_script: "sleep 30",
            }
        }
    }

    /// Fake vendor scripts staged in `<base>/vendor` and copied in by the install step.
    /// Every `config.sh` call is appended to `<base>/calls.log`.
    fn fixture(vendor: Vendor, listener: &str) -> (TempDir, RunnerController) {
        let base = tempfile::tempdir().unwrap();
        let staging = base.path().join("vendor");
        fs::create_dir_all(&staging).unwrap();

        fs::write(
            staging.join("config.sh"),
            format!(
                "#!/bin/sh\n\
                 echo \"$*\" >> ../calls.log\n\
                 if [ \"$1\" = remove ]; then exit {remove}; fi\n\
                 printf '{{\"agentName\":\"test-runner\",\"gitHubUrl\":\"https://example.test/org/repo\"}}' > .runner\n\
                 exit {configure}\n",
                remove = vendor.remove_exit,
                configure = vendor.configure_exit,
            ),
        )
        .unwrap();
        fs::write(
            staging.join("run.sh"),
            format!("#!/bin/sh\n{}\n", vendor.run_script),
        )
        .unwrap();

        let commands = VendorCommands {
            install_steps: vec![format!(
                "cp '{}'/*.sh . && chmod +x config.sh run.sh",
                staging.display()
            )],
            ..VendorCommands::default()
        };
        let cfg = ControllerConfig::default()
            .with_base_dir(base.path())
            .with_listener_name(listener)
            .with_commands(commands)
            .with_stop_grace_ms(100)
            .with_settle(SettleStrategy {
                first_ms: 25,
                max_ms: 200,
                factor: 2.0,
                timeout_ms: 5_000,
            });

        (base, RunnerController::new(cfg))
    }

    fn runner() -> RunnerConfig {
        RunnerConfig::new(
            TOKEN,
            "https://example.test/org/repo",
            "test-runner",
            ["cuda", "multicore"].into_iter().collect(),
        )
    }

    fn calls(base: &Path) -> String {
        fs::read_to_string(base.join("calls.log")).unwrap_or_default()
    }

    #[tokio::test]
    async fn setup_installs_registers_and_records_token() {
        let (base, ctl) = fixture(Vendor::default(), "sleep");

        ctl.setup(&runner()).await.unwrap();

        assert!(ctl.is_installed());
        assert_eq!(ctl.status().await.unwrap(), RunnerStatus::Installed);
        assert_eq!(ctl.work_dir().read_token().unwrap().as_deref(), Some(TOKEN));
        assert_eq!(
            calls(base.path()).trim(),
            "--unattended --url https://example.test/org/repo --name test-runner --labels cuda,multicore --token TESTTOKEN"
        );
    }

    #[tokio::test]
    async fn setup_refuses_existing_installation() {
        let (_base, ctl) = fixture(Vendor::default(), "sleep");
        ctl.setup(&runner()).await.unwrap();

        let err = ctl.setup(&runner()).await.unwrap_err();
        assert!(matches!(err, LifecycleError::AlreadyInstalled(_)));
        assert!(err.is_precondition());
    }

    #[tokio::test]
    async fn setup_reuses_leftover_empty_directory() {
        let (_base, ctl) = fixture(Vendor::default(), "sleep");
        fs::create_dir_all(ctl.work_dir().path()).unwrap();

        ctl.setup(&runner()).await.unwrap();
        assert!(ctl.work_dir().read_token().unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_configure_is_config_error_and_keeps_directory() {
        let vendor = Vendor {
            configure_exit: 1,
            ..Vendor::default()
        };
        let (_base, ctl) = fixture(vendor, "sleep");

        let err = ctl.setup(&runner()).await.unwrap_err();

        assert!(matches!(err, LifecycleError::Config { .. }));
        assert!(err.to_string().contains("test-runner"));
        assert!(err.to_string().contains("/settings/actions/runners"));
        assert!(ctl.is_installed());
        assert_eq!(ctl.work_dir().read_token().unwrap(), None);
    }

    #[tokio::test]
    async fn failed_install_step_is_named_in_the_error() {
        let (_base, ctl) = fixture(Vendor::default(), "sleep");
        let mut cfg = ctl.config().clone();
        cfg.commands.install_steps = vec!["true".into(), "exit 4".into()];
        let ctl = RunnerController::new(cfg);

        let err = ctl.setup(&runner()).await.unwrap_err();

        match err {
            LifecycleError::Install { step, source } => {
                assert_eq!(step, "exit 4");
                assert!(matches!(
                    source,
                    hostrunner_exec::ExecError::NonZeroExit { code: 4 }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn remove_after_setup_deregisters_with_recorded_token() {
        let (base, ctl) = fixture(Vendor::default(), "sleep");
        ctl.setup(&runner()).await.unwrap();

        ctl.remove(None).await.unwrap();

        assert!(!ctl.is_installed());
        assert_eq!(ctl.status().await.unwrap(), RunnerStatus::Absent);
        assert!(calls(base.path()).contains("remove --token TESTTOKEN"));
    }

    #[tokio::test]
    async fn remove_prefers_supplied_token() {
        let (base, ctl) = fixture(Vendor::default(), "sleep");
        ctl.setup(&runner()).await.unwrap();

        ctl.remove(Some("FRESH")).await.unwrap();

        assert!(calls(base.path()).contains("remove --token FRESH"));
    }

    #[tokio::test]
    async fn failed_removal_keeps_directory_and_hints_fresh_token() {
        let vendor = Vendor {
            remove_exit: 2,
            ..Vendor::default()
        };
        let (_base, ctl) = fixture(vendor, "sleep");
        ctl.setup(&runner()).await.unwrap();

        let err = ctl.remove(None).await.unwrap_err();

        assert!(matches!(err, LifecycleError::Removal { .. }));
        assert!(
            err.to_string()
                .contains("https://example.test/org/repo/settings/actions/runners")
        );
        assert!(ctl.is_installed());
    }

    #[tokio::test]
    async fn remove_without_any_token_is_rejected() {
        let (_base, ctl) = fixture(Vendor::default(), "sleep");
        ctl.setup(&runner()).await.unwrap();
        fs::remove_file(ctl.work_dir().token_file()).unwrap();

        let err = ctl.remove(None).await.unwrap_err();
        assert!(matches!(err, LifecycleError::MissingToken(_)));
        assert!(ctl.is_installed());
    }

    #[tokio::test]
    async fn operations_on_absent_runner_are_precondition_errors() {
        let (_base, ctl) = fixture(Vendor::default(), "sleep");

        assert_eq!(ctl.status().await.unwrap(), RunnerStatus::Absent);
        assert!(matches!(
            ctl.start().await,
            Err(LifecycleError::NotInstalled(_))
        ));
        assert!(matches!(
            ctl.stop().await,
            Err(LifecycleError::NotInstalled(_))
        ));
        assert!(matches!(
            ctl.remove(Some(TOKEN)).await,
            Err(LifecycleError::NotInstalled(_))
        ));
        assert!(matches!(
            ctl.clean(Some(TOKEN)).await,
            Err(LifecycleError::NothingToClean(_))
        ));
    }

    #[tokio::test]
    async fn start_records_listener_and_stop_is_idempotent() {
        let (base, ctl) = fixture(Vendor::default(), "sleep");
        ctl.setup(&runner()).await.unwrap();

        let StartOutcome::Listening(listener) = ctl.start().await.unwrap() else {
            panic!("listener not located");
        };
        assert_eq!(ctl.work_dir().read_pid().unwrap(), Some(listener));
        assert_eq!(ctl.status().await.unwrap(), RunnerStatus::Running);

        let logs: Vec<_> = fs::read_dir(base.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("log-"))
            .collect();
        assert_eq!(logs.len(), 1);

        assert_eq!(ctl.stop().await.unwrap(), StopOutcome::Stopped(listener));
        assert_eq!(ctl.stop().await.unwrap(), StopOutcome::NotRunning);
        assert_eq!(ctl.status().await.unwrap(), RunnerStatus::Installed);
    }

    #[tokio::test]
    async fn restart_replaces_the_previous_listener() {
        let (_base, ctl) = fixture(Vendor::default(), "sleep");
        ctl.setup(&runner()).await.unwrap();

        let StartOutcome::Listening(first) = ctl.start().await.unwrap() else {
            panic!("first listener not located");
        };
        let StartOutcome::Listening(second) = ctl.start().await.unwrap() else {
            panic!("second listener not located");
        };

        assert_ne!(first, second);
        assert!(!SystemTable::default().is_alive(first));
        assert_eq!(ctl.work_dir().read_pid().unwrap(), Some(second));

        ctl.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_without_listener_succeeds_with_no_pid() {
        let vendor = Vendor {
            run_script: "exit 0",
            ..Vendor::default()
        };
        let (_base, ctl) = fixture(vendor, "Runner.Listener");
        ctl.setup(&runner()).await.unwrap();
        ctl.work_dir()
            .write_pid(Pid::new(std::process::id()).unwrap())
            .unwrap();

        let outcome = ctl.start().await.unwrap();

        assert!(matches!(outcome, StartOutcome::ListenerNotFound { .. }));
        assert_eq!(ctl.work_dir().read_pid().unwrap(), None);
        assert_eq!(ctl.stop().await.unwrap(), StopOutcome::NotRunning);
    }

    #[tokio::test]
    async fn start_gives_up_when_settle_window_closes_on_live_launcher() {
        let (_base, ctl) = fixture(Vendor::default(), "Runner.Listener");
        ctl.setup(&runner()).await.unwrap();
        let cfg = ctl.config().clone().with_settle(SettleStrategy {
            first_ms: 20,
            max_ms: 40,
            factor: 2.0,
            timeout_ms: 150,
        });
        let ctl = RunnerController::new(cfg);

        let outcome = ctl.start().await.unwrap();

        let StartOutcome::ListenerNotFound { launcher } = outcome else {
            panic!("unexpected outcome: {outcome:?}");
        };
        let table = SystemTable::default();
        assert!(table.is_alive(launcher));
        assert_eq!(ctl.work_dir().read_pid().unwrap(), None);
        assert_eq!(ctl.stop().await.unwrap(), StopOutcome::NotRunning);

        let sleep = find_descendant(&table, launcher, "sleep");
        kill_forcefully(launcher).unwrap();
        if let Some(sleep) = sleep.filter(|sleep| *sleep != launcher) {
            let _ = kill_forcefully(sleep);
        }
    }

    #[tokio::test]
    async fn start_rejects_invalid_settle_before_launching() {
        let (base, ctl) = fixture(Vendor::default(), "sleep");
        ctl.setup(&runner()).await.unwrap();
        let mut cfg = ctl.config().clone();
        cfg.settle.factor = 0.5;
        let ctl = RunnerController::new(cfg);

        let err = ctl.start().await.unwrap_err();

        assert!(matches!(err, LifecycleError::Model(_)));
        let launched = fs::read_dir(base.path())
            .unwrap()
            .flatten()
            .any(|e| e.file_name().to_string_lossy().starts_with("log-"));
        assert!(!launched);
    }

    #[tokio::test]
    async fn stop_ignores_recorded_pid_of_an_unrelated_process() {
        let (_base, ctl) = fixture(Vendor::default(), "Runner.Listener");
        ctl.setup(&runner()).await.unwrap();
        let me = Pid::new(std::process::id()).unwrap();
        ctl.work_dir().write_pid(me).unwrap();

        assert_eq!(ctl.stop().await.unwrap(), StopOutcome::NotRunning);
        assert!(SystemTable::default().is_alive(me));
    }

    #[tokio::test]
    async fn clean_stops_then_removes() {
        let (base, ctl) = fixture(Vendor::default(), "sleep");
        ctl.setup(&runner()).await.unwrap();
        let StartOutcome::Listening(listener) = ctl.start().await.unwrap() else {
            panic!("listener not located");
        };

        ctl.clean(None).await.unwrap();

        assert!(!ctl.is_installed());
        assert!(!SystemTable::default().is_alive(listener));
        assert!(calls(base.path()).contains("remove --token TESTTOKEN"));
    }

    #[test]
    fn log_file_name_format() {
        let at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(
            log_file_name(at),
            PathBuf::from("log-2023-11-14--22-13-20.txt")
        );
    }
}
