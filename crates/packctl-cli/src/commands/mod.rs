//! CLI commands

use std::time::Duration;

use clap::Args;
use humantime_serde::re::humantime;
use packctl_core::{PackctlConfig, PollSettings};
use packctl_kube::{KubeStore, NonCriticalReason, PackageClient, ProgressSession, downgrade};

use crate::display::Spinner;
use crate::error::Result;

pub mod package;
pub mod repository;
pub mod secret;

/// Settings shared by every command, resolved from flags and config
#[derive(Debug, Clone)]
pub struct Context {
    pub namespace: String,
    pub config: PackctlConfig,
}

impl Context {
    /// Flags take precedence over the config file and `PACKCTL_NAMESPACE`
    pub fn new(config: PackctlConfig, namespace: Option<String>) -> Self {
        let namespace = namespace.unwrap_or_else(|| config.namespace.clone());
        Self { namespace, config }
    }
}

/// Flags controlling how often and how long to poll
#[derive(Args, Debug, Clone, Default)]
pub struct PollArgs {
    /// Time between status checks (e.g. 2s)
    #[arg(long, value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Give up waiting after this long (e.g. 10m)
    #[arg(long, value_parser = parse_duration)]
    pub poll_timeout: Option<Duration>,
}

impl PollArgs {
    pub fn settings(&self, config: &PackctlConfig) -> PollSettings {
        let defaults = config.poll_settings();
        PollSettings::new(
            self.poll_interval.unwrap_or(defaults.interval),
            self.poll_timeout.unwrap_or(defaults.timeout),
        )
    }
}

/// Flags controlling whether to wait for reconciliation
#[derive(Args, Debug, Clone, Default)]
pub struct WaitArgs {
    /// Return once the resource is submitted, without waiting for reconciliation
    #[arg(long)]
    pub no_wait: bool,

    #[command(flatten)]
    pub poll: PollArgs,
}

impl WaitArgs {
    pub fn wait(&self) -> bool {
        !self.no_wait
    }

    pub fn settings(&self, config: &PackctlConfig) -> PollSettings {
        self.poll.settings(config)
    }
}

fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

pub async fn connect() -> Result<PackageClient<KubeStore>> {
    Ok(PackageClient::try_default().await?)
}

/// Drive a session under a spinner until it reports its outcome
///
/// Ctrl-C cancels the operation; the session still reports the cancellation
/// as its outcome.
pub async fn drive(session: ProgressSession, spinner: &Spinner) -> Result<Option<NonCriticalReason>> {
    let token = session.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling operation");
            token.cancel();
        }
    });

    let result = session.wait_with(|message| spinner.update(message)).await;
    interrupt.abort();
    spinner.clear();

    Ok(downgrade(result)?)
}
