//! fiji-mcp - MCP server for a Fiji imaging host
//!
//! Subcommands:
//! - `fiji-mcp mcp` - MCP over stdio (default)
//! - `fiji-mcp serve` - MCP over streamable HTTP, plus `/health`
//! - `fiji-mcp bridge` - sandbox host behind the bridge protocol on stdio
//! - `fiji-mcp exec <code>` - run one script and print its report
//! - `fiji-mcp config` - print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fiji_mcp::{serve, stdio, telemetry};
use fijiconf::{FijiConfig, HostBackend};
use fijihost::script::strip_code_fence;
use fijihost::{bridge, launcher_for, HostHandle, SandboxLauncher};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fiji-mcp")]
#[command(about = "MCP server that drives a Fiji imaging host")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./fiji-mcp.toml in the load order)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Host backend: bridge or sandbox
    #[arg(long, global = true)]
    host: Option<HostBackend>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server over stdio (for Claude Code and other stdio clients)
    Mcp,

    /// Run the MCP server over streamable HTTP
    Serve {
        /// HTTP port to bind (overrides bind.http_port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Serve the sandbox host over the bridge protocol on stdin/stdout
    Bridge,

    /// Run one script against the host and print the execution report
    Exec {
        /// Script text
        code: String,
    },

    /// Print the effective configuration and where it came from
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = FijiConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(backend) = cli.host {
        config.host.backend = backend;
    }

    let command = cli.command.unwrap_or(Commands::Mcp);

    if let Commands::Config = command {
        for file in &sources.files {
            println!("# loaded: {}", file.display());
        }
        for var in &sources.env_overrides {
            println!("# env: {}", var);
        }
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let telemetry = telemetry::init(&config.telemetry)?;

    let is_bridge = matches!(command, Commands::Bridge);
    let result = run(command, config).await;

    telemetry.shutdown();
    if is_bridge && result.is_ok() {
        // The blocking stdin reader cannot be cancelled; exit without waiting on it
        std::process::exit(0);
    }
    result
}

async fn run(command: Commands, config: FijiConfig) -> Result<()> {
    match command {
        Commands::Mcp => {
            let host = start_host(&config);
            stdio::run(host).await
        }
        Commands::Serve { port } => {
            let mut bind = config.bind.clone();
            if let Some(port) = port {
                bind.http_port = port;
            }
            let host = start_host(&config);
            serve::run(
                serve::ServeConfig {
                    addr: bind.socket_addr(),
                },
                host,
            )
            .await
        }
        Commands::Bridge => {
            let launcher = Arc::new(SandboxLauncher::from_config(&config.host));
            bridge::serve(launcher, tokio::io::stdin(), tokio::io::stdout())
                .await
                .context("Bridge failed")
        }
        Commands::Exec { code } => {
            let host = HostHandle::new(launcher_for(&config.host));
            let outcome = host
                .acquire()
                .await?
                .execute_script(strip_code_fence(&code))
                .await?;
            println!("{}", outcome.to_report_text());
            host.shutdown().await;
            Ok(())
        }
        Commands::Config => Ok(()),
    }
}

/// Build the host handle and, when configured, start launching it in the
/// background so the first tool call finds it ready.
fn start_host(config: &FijiConfig) -> Arc<HostHandle> {
    let host = Arc::new(HostHandle::new(launcher_for(&config.host)));
    info!(host = %host.describe(), eager = config.host.eager, "Host configured");

    if config.host.eager {
        let eager = Arc::clone(&host);
        tokio::spawn(async move {
            if let Err(e) = eager.acquire().await {
                warn!("Eager host start failed, will retry on first tool call: {}", e);
            }
        });
    }

    host
}
