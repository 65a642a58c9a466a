//! Command execution on the compute module over the system `ssh` client.
//!
//! Authentication is left to the ssh agent/keys of the station account;
//! `BatchMode=yes` makes a missing key fail fast instead of prompting.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::catalog::CommandSpec;
use crate::config::RemoteSection;
use crate::orchestrator::{CommandOutput, RemoteError, RemoteExecutor, Shutdown};

/// Exit status ssh uses for its own failures (unreachable host, auth, ...).
const SSH_ERROR_EXIT: i32 = 255;

const PROBE_COMMAND: &str = "true";
const SHUTDOWN_RETRY_DELAY: Duration = Duration::from_secs(2);

pub struct SshExecutor {
    settings: RemoteSection,
}

impl SshExecutor {
    pub fn new(settings: RemoteSection) -> Self {
        Self { settings }
    }

    pub fn target(&self) -> String {
        self.settings.target()
    }

    /// Arguments passed to the ssh binary for `command`.
    pub fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.settings.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.settings.connect_timeout_secs),
        ];
        for option in &self.settings.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args.push(self.settings.target());
        args.push(command.to_string());
        args
    }

    async fn execute(
        &self,
        command: &str,
        stdin: Option<&str>,
        limit: Duration,
    ) -> Result<CommandOutput, RemoteError> {
        tracing::debug!(target_host = %self.settings.host, command, "ssh exec");

        let mut child = Command::new(&self.settings.ssh_cmd)
            .args(self.ssh_args(command))
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                RemoteError::Connection(format!(
                    "failed to spawn {}: {}",
                    self.settings.ssh_cmd, e
                ))
            })?;

        let pipe = child.stdin.take();
        // Feeding stdin counts against the same bound as the command itself.
        let exchange = async move {
            if let (Some(input), Some(mut pipe)) = (stdin, pipe) {
                // The remote side may exit before reading everything.
                if let Err(e) = pipe.write_all(input.as_bytes()).await {
                    tracing::debug!(error = %e, "remote command closed stdin early");
                }
                drop(pipe);
            }
            child.wait_with_output().await
        };

        let output = match timeout(limit, exchange).await {
            Ok(result) => result
                .map_err(|e| RemoteError::Connection(format!("failed to wait for ssh: {}", e)))?,
            Err(_) => return Err(RemoteError::Timeout(limit)),
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if exit_code == SSH_ERROR_EXIT {
            let reason = stderr.trim();
            return Err(RemoteError::Connection(if reason.is_empty() {
                format!("ssh to {} failed", self.settings.target())
            } else {
                reason.to_string()
            }));
        }

        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
        })
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandOutput, RemoteError> {
        self.execute(&spec.command, spec.stdin.as_deref(), timeout)
            .await
    }
}

#[async_trait]
impl Shutdown for SshExecutor {
    /// Reconnect (bounded) and issue the shutdown command.
    async fn shutdown_remote(&self) -> bool {
        let limit = self.settings.command_timeout();
        let attempts = self.settings.shutdown_attempts.max(1);

        for attempt in 1..=attempts {
            match self.execute(PROBE_COMMAND, None, limit).await {
                Ok(_) => {
                    tracing::info!(target_host = %self.settings.host, "issuing remote shutdown");
                    return match self
                        .execute(&self.settings.shutdown_command, None, limit)
                        .await
                    {
                        Ok(output) => output.exit_code == 0,
                        // The connection drops while the device powers off.
                        Err(RemoteError::Connection(_)) => true,
                        Err(RemoteError::Timeout(_)) => false,
                    };
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "shutdown reconnect failed");
                    if attempt < attempts {
                        tokio::time::sleep(SHUTDOWN_RETRY_DELAY).await;
                    }
                }
            }
        }
        false
    }
}
