//! fiji-mcp - MCP server for a Fiji imaging host
//!
//! This library provides:
//! - `tools`: the MCP tool surface (`FijiServer`)
//! - `serve`: streamable HTTP transport with a health endpoint
//! - `stdio`: MCP stdio transport for Claude Code and other stdio clients
//! - `telemetry`: stderr logging with optional OTLP export

pub mod serve;
pub mod stdio;
pub mod telemetry;
pub mod tools;

pub use tools::FijiServer;
