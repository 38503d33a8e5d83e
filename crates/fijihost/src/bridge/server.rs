//! Host side of the bridge protocol.
//!
//! Reads request frames, drives a companion built by a launcher on `init`,
//! and writes reply frames. `fiji-mcp bridge` runs this over stdin/stdout in
//! front of the sandbox host; other hosts can use it as the reference for
//! what a conforming bridge does.

use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use super::wire::{self, BridgeCall, BridgeReply};
use crate::companion::{Companion, HostLauncher};
use crate::error::HostError;
use crate::types::ExecutionReport;

/// Serve bridge requests until EOF or a `shutdown` call.
pub async fn serve<R, W>(
    launcher: Arc<dyn HostLauncher>,
    reader: R,
    mut writer: W,
) -> Result<(), HostError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut companion: Option<Arc<dyn Companion>> = None;

    info!(host = %launcher.describe(), "Bridge serving");

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request = match wire::decode_request(&line) {
            Ok(request) => request,
            Err(e) => {
                // Without an id there is nobody to answer
                warn!("Dropping malformed bridge request: {}", e);
                continue;
            }
        };

        let id = request.id;
        let is_shutdown = matches!(request.call, BridgeCall::Shutdown);
        debug!(id, method = request.call.method(), "bridge call");

        let reply = match dispatch(&launcher, &mut companion, request.call).await {
            Ok(result) => BridgeReply::ok(id, result),
            Err(e) => BridgeReply::err(id, e.to_string()),
        };

        let mut out = wire::encode_reply(&reply)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;

        if is_shutdown {
            info!("Bridge shutdown requested");
            break;
        }
    }

    Ok(())
}

async fn dispatch(
    launcher: &Arc<dyn HostLauncher>,
    companion: &mut Option<Arc<dyn Companion>>,
    call: BridgeCall,
) -> Result<Value, HostError> {
    if let BridgeCall::Init { dependencies, mode } = &call {
        if companion.is_none() {
            info!(?mode, dependencies = ?dependencies, "Constructing host");
            *companion = Some(launcher.launch().await?);
        }
        return Ok(Value::Null);
    }

    let host = companion.as_ref().ok_or(HostError::NotInitialized);

    match call {
        BridgeCall::Init { .. } => Ok(Value::Null),
        BridgeCall::ShowUi => {
            host?.show_ui().await?;
            Ok(Value::Null)
        }
        BridgeCall::GetCurrentState => {
            let images = host?.current_state().await?;
            Ok(serde_json::to_value(images)?)
        }
        BridgeCall::ExecuteGroovy { code } => {
            let outcome = host?.execute_script(&code).await?;
            Ok(serde_json::to_value(ExecutionReport::from(outcome))?)
        }
        BridgeCall::ShowOrUpdateScriptInEditor { code, title } => {
            host?.show_or_update_script(&code, &title).await?;
            Ok(Value::Null)
        }
        BridgeCall::GetScriptFromEditor { title } => {
            Ok(host?.script_from_editor(&title).await?.map_or(Value::Null, Value::String))
        }
        BridgeCall::Shutdown => {
            if let Ok(host) = host {
                host.shutdown().await?;
            }
            Ok(Value::Null)
        }
    }
}
