//! MCP tools over the imaging host.
//!
//! Each tool acquires the shared [`HostHandle`] (launching the host on first
//! use) and forwards to the companion. Script failures come back in-band in
//! the execution report; host failures become MCP internal errors.

use fijihost::script::strip_code_fence;
use fijihost::types::images_to_text;
use fijihost::{Companion, HostError, HostHandle};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ExecuteGroovyRequest {
    /// Script to run in the live host. A surrounding Markdown code fence is ignored.
    pub groovy_code: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ShowScriptRequest {
    /// Script text to place in the editor.
    pub groovy_code: String,
    /// Editor tab title. An existing tab with this title is replaced.
    pub script_title: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GetScriptRequest {
    /// Editor tab title. The `.groovy` extension is optional.
    pub script_title: String,
}

fn host_error(err: HostError) -> McpError {
    McpError::internal_error(err.to_string(), None)
}

#[derive(Clone)]
pub struct FijiServer {
    host: Arc<HostHandle>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl FijiServer {
    pub fn new(host: Arc<HostHandle>) -> Self {
        Self {
            host,
            tool_router: Self::tool_router(),
        }
    }

    async fn companion(&self) -> Result<Arc<dyn Companion>, McpError> {
        self.host.acquire().await.map_err(host_error)
    }

    #[tool(
        name = "get_opened_images_information",
        description = "Get information about the images currently opened in Fiji: title, \
                       which one is active, XYZ size in pixels, number of channels and \
                       timepoints, and the active channel, z-slice and timepoint."
    )]
    #[instrument(name = "tool.get_opened_images_information", skip_all)]
    async fn list_open_images(&self) -> Result<CallToolResult, McpError> {
        let images = self
            .companion()
            .await?
            .current_state()
            .await
            .map_err(host_error)?;

        info!(count = images.len(), "Listed open images");
        Ok(CallToolResult::success(vec![Content::text(images_to_text(
            &images,
        ))]))
    }

    #[tool(
        name = "execute_groovy",
        description = "Execute a script in the running Fiji instance and return a JSON \
                       report with returnedObjectClass, returnedObject, executionSuccess \
                       and errorMessage. Script errors are reported with \
                       executionSuccess=false rather than as tool errors."
    )]
    #[instrument(name = "tool.execute_groovy", skip_all)]
    async fn execute_script(
        &self,
        Parameters(request): Parameters<ExecuteGroovyRequest>,
    ) -> Result<CallToolResult, McpError> {
        let code = strip_code_fence(&request.groovy_code);
        let outcome = self
            .companion()
            .await?
            .execute_script(code)
            .await
            .map_err(host_error)?;

        info!(success = outcome.is_success(), "Script executed");
        Ok(CallToolResult::success(vec![Content::text(
            outcome.to_report_text(),
        )]))
    }

    #[tool(
        name = "show_or_update_script_in_editor",
        description = "Show a script in the Fiji script editor under the given title. \
                       If a tab with that title is already open its content is replaced."
    )]
    #[instrument(name = "tool.show_or_update_script_in_editor", skip_all, fields(title = %request.script_title))]
    async fn upsert_editor_script(
        &self,
        Parameters(request): Parameters<ShowScriptRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.companion()
            .await?
            .show_or_update_script(&request.groovy_code, &request.script_title)
            .await
            .map_err(host_error)?;

        Ok(CallToolResult::success(vec![]))
    }

    #[tool(
        name = "getScriptFromEditor",
        description = "Get the current text of a script open in the Fiji script editor. \
                       Use this to pick up edits the user made by hand."
    )]
    #[instrument(name = "tool.getScriptFromEditor", skip_all, fields(title = %request.script_title))]
    async fn get_editor_script(
        &self,
        Parameters(request): Parameters<GetScriptRequest>,
    ) -> Result<CallToolResult, McpError> {
        let script = self
            .companion()
            .await?
            .script_from_editor(&request.script_title)
            .await
            .map_err(host_error)?;

        match script {
            Some(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            None => Ok(CallToolResult::error(vec![Content::text(format!(
                "No script titled '{}' is open in the editor",
                request.script_title
            ))])),
        }
    }
}

#[tool_handler]
impl ServerHandler for FijiServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "fiji-mcp - drive a running Fiji (ImageJ) instance.\n\n\
                 Use get_opened_images_information to see what is open, execute_groovy to \
                 run scripts against the live instance, and show_or_update_script_in_editor \
                 / getScriptFromEditor to share scripts with the user through the Fiji \
                 script editor."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "fiji-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
