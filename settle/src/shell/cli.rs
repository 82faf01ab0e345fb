//! # settle CLI
//!
//! Command-line host for the condition waiter: blocks until a built-in probe
//! succeeds, the timeout passes, or Ctrl-C is pressed.

use crate::{
    config::{PolicyKind, WaitConfig},
    error::WaitError,
    probe::Probe,
    request::{WaitRequest, WaitSettings},
    utils::logging::init_logging,
    waiter::{ConditionWaiter, WaitOutcome, WaitReport},
};
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::ExitCode};
use tokio_util::sync::CancellationToken;

pub const EXIT_SATISFIED: u8 = 0;
pub const EXIT_TIMED_OUT: u8 = 1;
pub const EXIT_FAILED: u8 = 2;
pub const EXIT_CANCELLED: u8 = 130;

/// settle: wait for a condition instead of sleeping.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "settle polls a readiness probe until it succeeds or the timeout passes.

Exit codes: 0 satisfied, 1 timed out, 2 invalid argument or probe failure, 130 cancelled.

Examples:
   settle --timeout-ms 30000 tcp localhost:5432
   settle --interval-ms 100 path /tmp/ready.flag
   settle --backoff exec -- pg_isready -h db"
)]
pub struct Cli {
    /// Milliseconds between probe attempts (overrides config and SETTLE_POLL_INTERVAL_MS)
    #[arg(long, allow_negative_numbers = true)]
    pub interval_ms: Option<i64>,

    /// Milliseconds before giving up (overrides config and SETTLE_TIMEOUT_MS)
    #[arg(long, allow_negative_numbers = true)]
    pub timeout_ms: Option<i64>,

    /// Grow the interval between attempts using the configured backoff
    #[arg(long)]
    pub backoff: bool,

    /// Path to a TOML wait configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Log to a file in the cache directory instead of stderr
    #[arg(long)]
    pub log_to_file: bool,

    #[command(subcommand)]
    pub probe: ProbeCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ProbeCommand {
    /// Wait until a path exists
    Path { path: PathBuf },
    /// Wait until a TCP connection succeeds
    Tcp {
        /// Address as HOST:PORT
        address: String,
    },
    /// Wait until a command exits with status 0
    Exec {
        program: String,
        #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
        args: Vec<String>,
    },
}

impl From<ProbeCommand> for Probe {
    fn from(command: ProbeCommand) -> Self {
        match command {
            ProbeCommand::Path { path } => Probe::Path(path),
            ProbeCommand::Tcp { address } => Probe::Tcp(address),
            ProbeCommand::Exec { program, args } => Probe::Exec { program, args },
        }
    }
}

pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.debug { "debug" } else { "info" };
    init_logging(log_level, cli.log_to_file)?;

    let config = resolve_config(&cli)?;
    let settings = match config.settings() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("settle: {err}");
            return Ok(ExitCode::from(EXIT_FAILED));
        }
    };

    let probe = Probe::from(cli.probe);
    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, cancelling wait");
            ctrl_c_token.cancel();
        }
    });

    tracing::info!(probe = %probe, "Waiting for condition");
    let result = wait_for_probe(&probe, settings, token).await;
    match &result {
        Ok(report) => eprintln!(
            "settle: {probe} {} after {} poll(s) in {:?}",
            report.outcome, report.polls, report.elapsed
        ),
        Err(err) => eprintln!("settle: {probe}: {err}"),
    }
    Ok(ExitCode::from(exit_code(&result)))
}

/// Config file (or defaults), then environment, then command-line flags.
pub fn resolve_config(cli: &Cli) -> Result<WaitConfig> {
    let config = match &cli.config {
        Some(path) => WaitConfig::load(path)?,
        None => WaitConfig::default(),
    };
    Ok(apply_cli_overrides(config.apply_env()?, cli))
}

pub fn apply_cli_overrides(mut config: WaitConfig, cli: &Cli) -> WaitConfig {
    if let Some(interval_ms) = cli.interval_ms {
        config.poll_interval_ms = interval_ms;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if cli.backoff {
        config.policy = PolicyKind::Backoff;
    }
    config
}

/// Poll `probe` under `settings` until it resolves. A single attempt may run
/// up to the whole timeout; the waiter drops it when the deadline passes.
pub async fn wait_for_probe(
    probe: &Probe,
    settings: WaitSettings,
    token: CancellationToken,
) -> Result<WaitReport, WaitError> {
    let attempt_timeout = settings.timeout();
    let request =
        WaitRequest::from_settings(|| probe.check(attempt_timeout), settings).with_cancellation(token);
    ConditionWaiter::new(request).wait().await
}

pub fn exit_code(result: &Result<WaitReport, WaitError>) -> u8 {
    match result {
        Ok(report) => match report.outcome {
            WaitOutcome::Satisfied => EXIT_SATISFIED,
            WaitOutcome::TimedOut => EXIT_TIMED_OUT,
            WaitOutcome::Cancelled => EXIT_CANCELLED,
        },
        Err(_) => EXIT_FAILED,
    }
}
