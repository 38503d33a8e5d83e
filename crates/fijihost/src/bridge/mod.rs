//! Line-delimited JSON bridge to an imaging host process.

mod client;
mod launcher;
pub mod server;
pub mod wire;

pub use client::BridgeCompanion;
pub use launcher::BridgeLauncher;
pub use server::serve;
