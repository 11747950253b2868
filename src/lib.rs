//! tokenburn - live token burn rate, projections and limit alerts
//!
//! This library wires the workspace crates into a running tool:
//! - Read normalized usage records from a JSONL file
//! - Rebuild session blocks and refresh their burn rate every tick
//! - Track session transitions and fire limit alerts with cooldowns
//! - Render a live panel, a block report or JSON
//!
//! # Examples
//!
//! ```no_run
//! use tokenburn::{
//!     config::TickSettings,
//!     orchestrator::{Orchestrator, TickReport},
//!     reader::JsonlSource,
//! };
//! use tokenburn_monitor::NotificationManager;
//!
//! #[tokio::main]
//! async fn main() -> tokenburn::Result<()> {
//!     let source = JsonlSource::new("usage.jsonl");
//!     let mut orchestrator = Orchestrator::new(
//!         source,
//!         TickSettings::default(),
//!         NotificationManager::in_memory(),
//!     );
//!
//!     let report = orchestrator.tick().await?;
//!     println!("{} blocks, limit {}", report.blocks.len(), report.token_limit);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod display;
pub mod orchestrator;
pub mod reader;

// Re-export commonly used types
pub use tokenburn_core::{Result, TokenburnError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
