//! Spawns the host process and binds a [`BridgeCompanion`] to its stdio.

use async_trait::async_trait;
use fijiconf::HostConfig;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use super::client::BridgeCompanion;
use crate::companion::{Companion, HostLauncher};
use crate::error::HostError;

/// Launches the host as a child process speaking the bridge protocol.
pub struct BridgeLauncher {
    config: HostConfig,
}

impl BridgeLauncher {
    pub fn new(config: HostConfig) -> Self {
        Self { config }
    }

    /// The command that will be spawned, with the host environment applied.
    pub fn command(&self) -> Result<Command, HostError> {
        let bridge = &self.config.bridge;
        let mut cmd = Command::new(&bridge.command);
        cmd.args(&bridge.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(java_home) = &self.config.java_home {
            cmd.env("JAVA_HOME", java_home);
            cmd.env("PATH", path_with_java(java_home, std::env::var_os("PATH"))?);
        }

        Ok(cmd)
    }
}

#[async_trait]
impl HostLauncher for BridgeLauncher {
    async fn launch(&self) -> Result<Arc<dyn Companion>, HostError> {
        let command_name = self.config.bridge.command.clone();
        info!(command = %command_name, args = ?self.config.bridge.args, "Spawning host process");

        let mut child = self.command()?.spawn().map_err(|source| HostError::Spawn {
            command: command_name.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HostError::Protocol("host stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HostError::Protocol("host stdout was not captured".to_string()))?;

        // Host stderr is diagnostics only; keep it out of our stdout
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "fijihost::host_stderr", "{}", line);
                }
            });
        }

        let companion = BridgeCompanion::from_io(stdout, stdin).with_child(child);

        let startup = Duration::from_millis(self.config.bridge.startup_timeout_ms);
        tokio::time::timeout(
            startup,
            companion.initialize(&self.config.dependencies, self.config.mode),
        )
        .await
        .map_err(|_| HostError::StartupTimeout(startup))??;

        if self.config.show_ui {
            companion.show_ui().await?;
        }

        Ok(Arc::new(companion))
    }

    fn describe(&self) -> String {
        format!("bridge:{}", self.config.bridge.command)
    }
}

/// `<java_home>/bin` followed by the inherited search path.
fn path_with_java(java_home: &Path, inherited: Option<OsString>) -> Result<OsString, HostError> {
    let inherited = inherited.unwrap_or_default();
    let paths = std::iter::once(java_home.join("bin")).chain(std::env::split_paths(&inherited));
    std::env::join_paths(paths)
        .map_err(|e| HostError::Protocol(format!("invalid PATH with {}: {}", java_home.display(), e)))
}
