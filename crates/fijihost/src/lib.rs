//! fijihost - the imaging host boundary for fiji-mcp
//!
//! This library provides:
//! - `companion`: the `Companion` and `HostLauncher` traits every host implements
//! - `handle`: `HostHandle`, the lazily initialized, launch-once handle to a host
//! - `bridge`: line-delimited JSON protocol to a host child process (both sides)
//! - `sandbox`: in-process Lua host used for development and tests
//! - `types`: execution outcomes and image descriptions
//! - `script`: script text and title helpers

pub mod bridge;
pub mod companion;
pub mod error;
pub mod handle;
pub mod sandbox;
pub mod script;
pub mod types;

pub use bridge::BridgeLauncher;
pub use companion::{Companion, HostLauncher};
pub use error::HostError;
pub use handle::HostHandle;
pub use sandbox::{SandboxHost, SandboxLauncher};
pub use types::{ExecutionOutcome, ExecutionReport, ImageDescription};

use fijiconf::{HostBackend, HostConfig};
use std::sync::Arc;

/// Build the launcher selected by `config.backend`.
pub fn launcher_for(config: &HostConfig) -> Arc<dyn HostLauncher> {
    match config.backend {
        HostBackend::Bridge => Arc::new(BridgeLauncher::new(config.clone())),
        HostBackend::Sandbox => Arc::new(SandboxLauncher::from_config(config)),
    }
}
