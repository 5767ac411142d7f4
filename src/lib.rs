//! RelayQ – a lightweight work-queue message broker written in Rust.
//!
//! This crate exports
//!  * `core`        – message, queue, agent-chain and broker logic
//!  * `persistence` – durable queue snapshots on disk
//!  * `server`      – TCP wire protocol and serve loop
//!  * `config`      – TOML-driven runtime configuration
//!
//! Downstream applications can embed the broker (`Broker::bootstrap`) or
//! build their own binaries on top of the library.

// ───────────────────────────────────────────────────────────
// Public modules
// ───────────────────────────────────────────────────────────
pub mod config;
pub mod core;
pub mod logging;
pub mod persistence;
pub mod server;

// ───────────────────────────────────────────────────────────
// Re-exports
// ───────────────────────────────────────────────────────────
pub use config::{load_config, Config};
pub use core::broker::Broker;
pub use server::engine::serve as start_broker;
