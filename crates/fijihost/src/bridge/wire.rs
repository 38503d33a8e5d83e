//! Line-delimited JSON frames spoken between fiji-mcp and a host process.
//!
//! ```text
//! -> {"id":1,"method":"init","params":{"dependencies":[...],"mode":"interactive"}}
//! <- {"id":1,"result":null}
//! -> {"id":2,"method":"executeGroovy","params":{"code":"return 42"}}
//! <- {"id":2,"result":{"returnedObjectClass":"java.lang.Integer","returnedObject":42,"executionSuccess":true}}
//! -> {"id":3,"method":"getScriptFromEditor","params":{"title":"missing"}}
//! <- {"id":3,"result":null}
//! ```
//!
//! Each frame is one line. Anything a host prints to stdout that is not a
//! reply frame is chatter and gets skipped by the reader.

use fijiconf::LaunchMode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::HostError;

/// A call on the host companion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum BridgeCall {
    Init {
        dependencies: Vec<String>,
        mode: LaunchMode,
    },
    ShowUi,
    GetCurrentState,
    ExecuteGroovy {
        code: String,
    },
    ShowOrUpdateScriptInEditor {
        code: String,
        title: String,
    },
    GetScriptFromEditor {
        title: String,
    },
    Shutdown,
}

impl BridgeCall {
    /// Method name as it appears on the wire.
    pub fn method(&self) -> &'static str {
        match self {
            BridgeCall::Init { .. } => "init",
            BridgeCall::ShowUi => "showUi",
            BridgeCall::GetCurrentState => "getCurrentState",
            BridgeCall::ExecuteGroovy { .. } => "executeGroovy",
            BridgeCall::ShowOrUpdateScriptInEditor { .. } => "showOrUpdateScriptInEditor",
            BridgeCall::GetScriptFromEditor { .. } => "getScriptFromEditor",
            BridgeCall::Shutdown => "shutdown",
        }
    }
}

/// A request frame: a call plus its correlation id.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeRequest {
    pub id: u64,
    pub call: BridgeCall,
}

/// A reply frame. Exactly one of `result`/`error` is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeReply {
    pub id: u64,
    #[serde(default)]
    pub result: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeReply {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result,
            error: None,
        }
    }

    pub fn err(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Host-reported errors become [`HostError::Remote`] with the text unchanged.
    pub fn into_result(self) -> Result<Value, HostError> {
        match self.error {
            Some(message) => Err(HostError::Remote(message)),
            None => Ok(self.result),
        }
    }
}

/// Serialize a request as one line (without the trailing newline).
pub fn encode_request(request: &BridgeRequest) -> Result<String, HostError> {
    let mut frame = serde_json::to_value(&request.call)?;
    let object = frame
        .as_object_mut()
        .ok_or_else(|| HostError::Protocol("call did not serialize to an object".to_string()))?;
    object.insert("id".to_string(), Value::from(request.id));
    Ok(serde_json::to_string(&frame)?)
}

/// Parse a request line.
pub fn decode_request(line: &str) -> Result<BridgeRequest, HostError> {
    let mut frame: Value = serde_json::from_str(line)?;
    let object = frame
        .as_object_mut()
        .ok_or_else(|| HostError::Protocol("request is not a JSON object".to_string()))?;
    let id = object
        .remove("id")
        .and_then(|v| v.as_u64())
        .ok_or_else(|| HostError::Protocol("request is missing a numeric id".to_string()))?;
    let call: BridgeCall = serde_json::from_value(frame)?;
    Ok(BridgeRequest { id, call })
}

/// Serialize a reply as one line (without the trailing newline).
pub fn encode_reply(reply: &BridgeReply) -> Result<String, HostError> {
    Ok(serde_json::to_string(reply)?)
}

/// Parse a reply line. `None` means the line is host chatter, not a frame.
pub fn decode_reply(line: &str) -> Option<BridgeReply> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
