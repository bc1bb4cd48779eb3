//! Live query support.
//!
//! - [`scanner`]: finds which statements of a batch are LIVE statements
//! - [`registry`]: per-tab subscription generations and message buffers

pub mod registry;
pub mod scanner;

pub use registry::{LiveQueryRegistry, DEFAULT_MESSAGE_CAPACITY};
pub use scanner::{live_statement_indices, split_statements};
