//! Layered configuration loading for fiji-mcp.
//!
//! Configuration is split into two sections:
//!
//! - **Infrastructure** (`BindConfig`, `TelemetryConfig`): where the MCP
//!   server listens and where telemetry goes.
//!
//! - **Host** (`HostConfig`): how the imaging host is launched - which
//!   backend, which dependency coordinates, which launch mode, and the
//!   environment the host process gets.
//!
//! # Usage
//!
//! ```rust,no_run
//! use fijiconf::FijiConfig;
//!
//! let config = FijiConfig::load().expect("Failed to load config");
//!
//! println!("HTTP port: {}", config.bind.http_port);
//! println!("Host backend: {}", config.host.backend);
//! for coordinate in &config.host.dependencies {
//!     println!("Dependency: {}", coordinate);
//! }
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/fiji-mcp/config.toml` (system)
//! 2. `~/.config/fiji-mcp/config.toml` (user)
//! 3. `./fiji-mcp.toml` (local override, or the `--config` path)
//! 4. Environment variables (`FIJI_MCP_*`, `JAVA_HOME`)
//!
//! Files are merged table-by-table, so a local file that only sets
//! `[host.bridge] command` keeps everything else from the user file.
//!
//! # Example Config
//!
//! ```toml
//! [bind]
//! http_port = 8090
//!
//! [telemetry]
//! otlp_endpoint = "127.0.0.1:4317"
//! log_level = "info"
//!
//! [host]
//! backend = "bridge"
//! mode = "interactive"
//! java_home = "~/.jdks/corretto-11.0.24"
//!
//! [host.bridge]
//! command = "fiji-bridge"
//! ```

pub mod host;
pub mod infra;
pub mod loader;

pub use host::{
    BridgeConfig, HostBackend, HostConfig, LaunchMode, SandboxConfig, DEFAULT_DEPENDENCIES,
};
pub use infra::{BindConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Complete fiji-mcp configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FijiConfig {
    /// HTTP bind address for `fiji-mcp serve`.
    #[serde(default)]
    pub bind: BindConfig,

    /// Logging and OpenTelemetry export.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Imaging host launch settings.
    #[serde(default)]
    pub host: HostConfig,
}

impl FijiConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/fiji-mcp/config.toml`
    /// 3. `~/.config/fiji-mcp/config.toml`
    /// 4. `./fiji-mcp.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    ///
    /// If `config_path` is provided, it takes precedence over the local
    /// `./fiji-mcp.toml` override. System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::read_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::from_table(merged, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let mut output = String::from("# fiji-mcp configuration\n\n");
        output.push_str(&toml::to_string_pretty(self)?);
        Ok(output)
    }
}
