//! Host configuration - how the imaging host gets launched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Dependency coordinates handed to the host on startup.
///
/// These must be resolvable from https://maven.scijava.org/.
pub const DEFAULT_DEPENDENCIES: &[&str] = &[
    "net.imagej:imagej:2.16.0",
    "net.imagej:imagej-legacy:2.0.0",
    "ch.epfl.biop:fiji-tools:0.1.0-SNAPSHOT",
];

/// Which host implementation backs the companion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostBackend {
    /// Child process speaking the line-delimited JSON bridge protocol.
    #[default]
    Bridge,
    /// In-process Lua sandbox.
    Sandbox,
}

impl fmt::Display for HostBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostBackend::Bridge => write!(f, "bridge"),
            HostBackend::Sandbox => write!(f, "sandbox"),
        }
    }
}

impl std::str::FromStr for HostBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bridge" => Ok(HostBackend::Bridge),
            "sandbox" => Ok(HostBackend::Sandbox),
            other => Err(format!("unknown host backend '{}'", other)),
        }
    }
}

/// Mode flag passed to the host constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchMode {
    Headless,
    Gui,
    #[default]
    Interactive,
}

impl std::str::FromStr for LaunchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headless" => Ok(LaunchMode::Headless),
            "gui" => Ok(LaunchMode::Gui),
            "interactive" => Ok(LaunchMode::Interactive),
            other => Err(format!("unknown launch mode '{}'", other)),
        }
    }
}

/// Imaging host settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host implementation.
    /// Default: bridge
    #[serde(default)]
    pub backend: HostBackend,

    /// Host launch mode.
    /// Default: interactive
    #[serde(default)]
    pub mode: LaunchMode,

    /// Make the host UI visible once it is up.
    /// Default: true
    #[serde(default = "HostConfig::default_true")]
    pub show_ui: bool,

    /// Launch the host at startup instead of on the first tool call.
    /// Default: true
    #[serde(default = "HostConfig::default_true")]
    pub eager: bool,

    /// Java runtime for the host process. Exported to the child as
    /// `JAVA_HOME`, with `<java_home>/bin` prepended to its `PATH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_home: Option<PathBuf>,

    /// Dependency coordinates for the host classpath.
    #[serde(default = "HostConfig::default_dependencies")]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl HostConfig {
    fn default_true() -> bool {
        true
    }

    fn default_dependencies() -> Vec<String> {
        DEFAULT_DEPENDENCIES.iter().map(|s| s.to_string()).collect()
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            backend: HostBackend::default(),
            mode: LaunchMode::default(),
            show_ui: true,
            eager: true,
            java_home: None,
            dependencies: Self::default_dependencies(),
            bridge: BridgeConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

/// Child process settings for the bridge backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Executable that starts the host and speaks the bridge protocol on stdio.
    /// Default: fiji-bridge
    #[serde(default = "BridgeConfig::default_command")]
    pub command: String,

    /// Extra arguments for `command`.
    #[serde(default)]
    pub args: Vec<String>,

    /// How long the host gets to answer the `init` request.
    /// Resolving dependencies on a cold cache is slow.
    /// Default: 120000 (2 minutes)
    #[serde(default = "BridgeConfig::default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

impl BridgeConfig {
    fn default_command() -> String {
        "fiji-bridge".to_string()
    }

    fn default_startup_timeout_ms() -> u64 {
        120_000
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: Self::default_command(),
            args: Vec::new(),
            startup_timeout_ms: Self::default_startup_timeout_ms(),
        }
    }
}

/// In-process sandbox settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Maximum script execution time.
    /// Default: 30000 (30s)
    #[serde(default = "SandboxConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl SandboxConfig {
    fn default_timeout_ms() -> u64 {
        30_000
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}
