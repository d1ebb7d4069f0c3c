//! Local browser launcher.

use std::process::{Command, Stdio};

use super::{Browser, ProviderError, ProviderResult};

/// Opens URLs with the platform's default handler
#[derive(Debug, Default)]
pub struct SystemBrowser;

impl SystemBrowser {
    fn command(url: &str) -> Command {
        if cfg!(target_os = "macos") {
            let mut cmd = Command::new("open");
            cmd.arg(url);
            cmd
        } else if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", "start", "", url]);
            cmd
        } else {
            let mut cmd = Command::new("xdg-open");
            cmd.arg(url);
            cmd
        }
    }
}

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> ProviderResult<()> {
        // The handler outlives us; only the launch itself is checked
        Self::command(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
            .map_err(|e| ProviderError::Other(format!("failed to open {}: {}", url, e)))
    }
}
