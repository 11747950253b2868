//! tokenburn-core - usage aggregation and projection engine
//!
//! This crate turns an ordered stream of token-usage records into session
//! blocks and derives live consumption metrics from them.
//!
//! - [`types`]: usage records and token counters
//! - [`blocks`]: fixed-window session blocks with idle gap markers
//! - [`calculator`]: burn rate, projection and hourly rate
//! - [`plans`]: plan limits and the P90 custom limit
//! - [`snapshot`]: the block snapshot format and its validation
//! - [`source`]: the seam to an external usage reader

pub mod blocks;
pub mod calculator;
pub mod error;
pub mod plans;
pub mod pricing;
pub mod snapshot;
pub mod source;
pub mod timezone;
pub mod types;

pub use blocks::{BlockAnchor, BlockConfig, SessionBlock, SessionBlockBuilder};
pub use calculator::{BurnRate, UsageProjection};
pub use error::{Result, TokenburnError};
pub use plans::PlanType;
pub use snapshot::{SnapshotValidation, UsageSnapshot, validate_snapshot};
pub use source::{UsageSource, VecSource};
pub use types::{CostMode, ModelName, SessionId, TokenCounts, UsageEntry};
