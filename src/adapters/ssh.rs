//! Remote shell adapter using the OpenSSH client tools.
//!
//! Host keys are trusted on first use (`StrictHostKeyChecking=accept-new`):
//! an unknown host is accepted and recorded, a changed key is still refused.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{ProviderError, ProviderResult, RemoteShell, RemoteTarget};

/// `scp`/`ssh` subprocess adapter
pub struct OpenSsh {
    scp_binary: String,
    ssh_binary: String,
    command_timeout: Duration,
}

impl Default for OpenSsh {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl OpenSsh {
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            scp_binary: "scp".to_string(),
            ssh_binary: "ssh".to_string(),
            command_timeout,
        }
    }

    /// Use custom `scp` and `ssh` binaries
    pub fn with_binaries(mut self, scp: impl Into<String>, ssh: impl Into<String>) -> Self {
        self.scp_binary = scp.into();
        self.ssh_binary = ssh.into();
        self
    }

    async fn exec(&self, binary: &str, args: Vec<String>) -> ProviderResult<String> {
        debug!(%binary, ?args, "remote shell call");

        let child = Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::Other(format!("failed to spawn {}: {}", binary, e)))?;

        let output = timeout(self.command_timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "{} did not finish within {:?}",
                    binary, self.command_timeout
                ))
            })?
            .map_err(|e| ProviderError::Other(format!("{} failed: {}", binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            return Err(classify_exit(binary, exit_code, stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Options shared by `scp` and `ssh`
fn common_options(key_file: &Path) -> Vec<String> {
    vec![
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-i".to_string(),
        key_file.to_string_lossy().to_string(),
    ]
}

/// Arguments for copying a file into the remote home directory
pub fn scp_args(target: &RemoteTarget, local: &Path) -> Vec<String> {
    let mut args = common_options(&target.key_file);
    args.push(local.to_string_lossy().to_string());
    args.push(format!("{}:~/", target.destination()));
    args
}

/// Arguments for running a command remotely
pub fn ssh_args(target: &RemoteTarget, command: &str) -> Vec<String> {
    let mut args = common_options(&target.key_file);
    args.push(target.destination());
    args.push(command.to_string());
    args
}

/// ssh and scp exit with 255 on connection-level failures
fn classify_exit(binary: &str, exit_code: i32, stderr: &str) -> ProviderError {
    let message = format!("{} exited with {}: {}", binary, exit_code, stderr);
    if stderr.contains("Permission denied") || stderr.contains("HOST IDENTIFICATION HAS CHANGED") {
        ProviderError::PermissionDenied(message)
    } else if stderr.contains("No such file or directory") {
        ProviderError::NotFound(message)
    } else if exit_code == 255 {
        ProviderError::Transient(message)
    } else {
        ProviderError::Other(message)
    }
}

#[async_trait]
impl RemoteShell for OpenSsh {
    async fn copy_to(&self, target: &RemoteTarget, local: &Path) -> ProviderResult<()> {
        self.exec(&self.scp_binary, scp_args(target, local))
            .await
            .map(|_| ())
    }

    async fn run(&self, target: &RemoteTarget, command: &str) -> ProviderResult<String> {
        self.exec(&self.ssh_binary, ssh_args(target, command)).await
    }
}
