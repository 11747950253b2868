//! Terminal output for tokenburn
//!
//! This crate renders the live session panel, the block report table and
//! JSON output.

pub mod live_panel;
pub mod output;

pub use live_panel::{LivePanel, PanelInput};
pub use output::{JsonFormatter, OutputFormatter, TableFormatter, get_formatter};
