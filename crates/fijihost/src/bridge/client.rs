//! Companion that forwards every call over the bridge protocol.

use async_trait::async_trait;
use fijiconf::LaunchMode;
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::wire::{self, BridgeCall, BridgeRequest};
use crate::companion::Companion;
use crate::error::HostError;
use crate::types::{ExecutionOutcome, ExecutionReport, ImageDescription};

type Reader = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

struct BridgeIo {
    reader: Reader,
    writer: Writer,
    next_id: u64,
}

/// Client side of the bridge. Requests are strictly sequential: one call
/// holds the stream until its reply arrives.
pub struct BridgeCompanion {
    io: Mutex<BridgeIo>,
    /// Host process, when we spawned it. Dropping it kills the host.
    child: Mutex<Option<Child>>,
    /// Bound on each shutdown step: the shutdown reply, then the process exit.
    shutdown_timeout: Duration,
}

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

impl BridgeCompanion {
    /// Wrap an established byte stream to a host.
    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            io: Mutex::new(BridgeIo {
                reader: BufReader::new(reader).lines(),
                writer: Box::new(writer),
                next_id: 0,
            }),
            child: Mutex::new(None),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Attach the spawned host process so it lives and dies with this companion.
    pub fn with_child(self, child: Child) -> Self {
        Self {
            child: Mutex::new(Some(child)),
            ..self
        }
    }

    pub fn with_shutdown_timeout(self, shutdown_timeout: Duration) -> Self {
        Self {
            shutdown_timeout,
            ..self
        }
    }

    /// Construct the host with its dependency coordinates and mode.
    pub async fn initialize(
        &self,
        dependencies: &[String],
        mode: LaunchMode,
    ) -> Result<(), HostError> {
        self.call(BridgeCall::Init {
            dependencies: dependencies.to_vec(),
            mode,
        })
        .await?;
        Ok(())
    }

    /// Send one call and wait for its reply.
    pub async fn call(&self, call: BridgeCall) -> Result<Value, HostError> {
        let mut io = self.io.lock().await;
        io.next_id += 1;
        let id = io.next_id;

        let method = call.method();
        let mut line = wire::encode_request(&BridgeRequest { id, call })?;
        line.push('\n');
        debug!(id, method, "bridge request");

        io.writer.write_all(line.as_bytes()).await?;
        io.writer.flush().await?;

        loop {
            let Some(line) = io.reader.next_line().await? else {
                return Err(HostError::Closed);
            };

            match wire::decode_reply(&line) {
                Some(reply) if reply.id == id => return reply.into_result(),
                Some(reply) => {
                    warn!(expected = id, got = reply.id, "Skipping stale bridge reply");
                }
                None => {
                    if !line.trim().is_empty() {
                        debug!(target: "fijihost::host_stdout", "{}", line);
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Companion for BridgeCompanion {
    async fn show_ui(&self) -> Result<(), HostError> {
        self.call(BridgeCall::ShowUi).await?;
        Ok(())
    }

    async fn current_state(&self) -> Result<Vec<ImageDescription>, HostError> {
        let result = self.call(BridgeCall::GetCurrentState).await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(result)?)
    }

    async fn execute_script(&self, code: &str) -> Result<ExecutionOutcome, HostError> {
        let result = self
            .call(BridgeCall::ExecuteGroovy {
                code: code.to_string(),
            })
            .await?;
        let report: ExecutionReport = serde_json::from_value(result)?;
        Ok(report.into())
    }

    async fn show_or_update_script(&self, code: &str, title: &str) -> Result<(), HostError> {
        self.call(BridgeCall::ShowOrUpdateScriptInEditor {
            code: code.to_string(),
            title: title.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn script_from_editor(&self, title: &str) -> Result<Option<String>, HostError> {
        let result = self
            .call(BridgeCall::GetScriptFromEditor {
                title: title.to_string(),
            })
            .await?;
        match result {
            Value::Null => Ok(None),
            Value::String(text) => Ok(Some(text)),
            other => Err(HostError::Protocol(format!(
                "getScriptFromEditor returned {} instead of a string",
                other
            ))),
        }
    }

    async fn shutdown(&self) -> Result<(), HostError> {
        let sent = match tokio::time::timeout(self.shutdown_timeout, self.call(BridgeCall::Shutdown))
            .await
        {
            Ok(sent) => sent,
            Err(_) => {
                warn!(timeout = ?self.shutdown_timeout, "Host did not answer shutdown");
                Ok(Value::Null)
            }
        };

        if let Some(mut child) = self.child.lock().await.take() {
            // Give the host a moment to exit on its own before killing it
            match tokio::time::timeout(self.shutdown_timeout, child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "Host process exited"),
                _ => {
                    warn!("Host process did not exit, killing it");
                    child.kill().await?;
                }
            }
        }

        match sent {
            Ok(_) | Err(HostError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
