//! The two seams every imaging host implements.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::HostError;
use crate::types::{ExecutionOutcome, ImageDescription};

/// Host-side object the MCP tools delegate to.
///
/// One companion wraps one running host. Implementations serialize access
/// internally; callers may share it behind an `Arc`.
#[async_trait]
pub trait Companion: Send + Sync {
    /// Make the host's interactive surface visible.
    async fn show_ui(&self) -> Result<(), HostError>;

    /// Describe every open image. An empty list is a normal answer.
    async fn current_state(&self) -> Result<Vec<ImageDescription>, HostError>;

    /// Run script text against live host state.
    ///
    /// Failing scripts are an expected outcome and come back as
    /// `Ok(ExecutionOutcome::Failure { .. })`; `Err` means the host itself
    /// could not be reached.
    async fn execute_script(&self, code: &str) -> Result<ExecutionOutcome, HostError>;

    /// Create the editor buffer `title`, or replace its text if it exists.
    async fn show_or_update_script(&self, code: &str, title: &str) -> Result<(), HostError>;

    /// Text of editor buffer `title`, or `None` when no such buffer is open.
    async fn script_from_editor(&self, title: &str) -> Result<Option<String>, HostError>;

    /// Ask the host to exit. Hosts without a shutdown path ignore this.
    async fn shutdown(&self) -> Result<(), HostError> {
        Ok(())
    }
}

/// Constructs a running host and binds its companion.
#[async_trait]
pub trait HostLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Companion>, HostError>;

    /// Short name for logs.
    fn describe(&self) -> String;
}
