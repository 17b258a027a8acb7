use std::env;

use anyhow::{Context, bail};
use tracing::info;

use hostrunner_lifecycle::prelude::*;
use hostrunner_observe::{LoggerConfig, LoggerLevel, logger_init};

/// Drives one lifecycle operation, chosen by `RUNNER_ACTION`:
///
/// ```text
/// RUNNER_ACTION=setup RUNNER_TOKEN=.. RUNNER_URL=https://github.com/org/repo RUNNER_NAME=ci-01 runnerctl
/// RUNNER_ACTION=start|stop|status runnerctl
/// RUNNER_ACTION=remove|clean [RUNNER_TOKEN=..] runnerctl
/// ```
///
/// `RUNNER_BASE_DIR` (default `.`) holds the `actions-runner` folder and launch logs.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    let cfg = LoggerConfig {
        level: LoggerLevel::new(var("RUNNER_LOG").unwrap_or_else(|| "info".into()))?,
        format: var("RUNNER_LOG_FORMAT").unwrap_or_default().parse()?,
        ..Default::default()
    };
    logger_init(&cfg)?;

    // 2) Controller
    let mut controller_cfg = ControllerConfig::default();
    if let Some(base) = var("RUNNER_BASE_DIR") {
        controller_cfg = controller_cfg.with_base_dir(base);
    }
    let controller = RunnerController::new(controller_cfg);

    // 3) Operation
    let action = var("RUNNER_ACTION").context("RUNNER_ACTION is not set")?;
    let token = var("RUNNER_TOKEN");
    match action.as_str() {
        "setup" => {
            let runner = RunnerConfig::new(
                token.context("RUNNER_TOKEN is required for setup")?,
                var("RUNNER_URL").context("RUNNER_URL is required for setup")?,
                var("RUNNER_NAME").context("RUNNER_NAME is required for setup")?,
                labels(var("RUNNER_LABELS").as_deref()),
            );
            controller.setup(&runner).await?;
        }
        "start" => match controller.start().await? {
            StartOutcome::Listening(pid) => info!("listener running as pid {pid}"),
            StartOutcome::ListenerNotFound { launcher } => {
                info!("launcher {launcher} started but the listener was not located")
            }
        },
        "stop" => {
            let outcome = controller.stop().await?;
            info!("stop: {outcome:?}");
        }
        "remove" => controller.remove(token.as_deref()).await?,
        "clean" => controller.clean(token.as_deref()).await?,
        "status" => info!("status: {:?}", controller.status().await?),
        other => bail!("unknown RUNNER_ACTION `{other}` (expected setup|start|stop|remove|clean|status)"),
    }

    Ok(())
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn labels(raw: Option<&str>) -> RunnerLabels {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
