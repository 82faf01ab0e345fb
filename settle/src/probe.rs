//! Built-in readiness checks used by the `settle` binary.
//!
//! Each probe answers one question ("does the path exist", "does the port
//! accept connections", "does the command exit 0") and is polled through a
//! [`crate::ConditionWaiter`] like any other predicate.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Satisfied once the path exists
    Path(PathBuf),
    /// Satisfied once a TCP connection to `host:port` succeeds
    Tcp(String),
    /// Satisfied once the command exits with status 0
    Exec { program: String, args: Vec<String> },
}

impl Probe {
    /// Run the probe once.
    ///
    /// Conditions that may still change (connection refused, non-zero exit, an
    /// attempt running longer than `attempt_timeout`) report `Ok(false)`.
    /// Errors mean the probe cannot work at all, such as a command that cannot
    /// be spawned.
    pub async fn check(&self, attempt_timeout: Duration) -> std::io::Result<bool> {
        match self {
            Probe::Path(path) => tokio::fs::try_exists(path).await,
            Probe::Tcp(address) => {
                match tokio::time::timeout(attempt_timeout, TcpStream::connect(address.as_str()))
                    .await
                {
                    Ok(Ok(_stream)) => Ok(true),
                    Ok(Err(err)) => {
                        tracing::trace!(address = %address, error = %err, "Connection attempt failed");
                        Ok(false)
                    }
                    Err(_) => Ok(false),
                }
            }
            Probe::Exec { program, args } => {
                let mut child = Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .spawn()?;
                match tokio::time::timeout(attempt_timeout, child.wait()).await {
                    Ok(status) => Ok(status?.success()),
                    // kill_on_drop reaps the child
                    Err(_) => {
                        tracing::trace!(program = %program, "Command outlived its attempt");
                        Ok(false)
                    }
                }
            }
        }
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Path(path) => write!(f, "path {}", path.display()),
            Probe::Tcp(address) => write!(f, "tcp {address}"),
            Probe::Exec { program, args } if args.is_empty() => write!(f, "exec {program}"),
            Probe::Exec { program, args } => write!(f, "exec {program} {}", args.join(" ")),
        }
    }
}
