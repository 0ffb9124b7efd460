//! CLI command handling

pub mod daemon;
pub mod output;
pub mod send;
pub mod stats;

pub use daemon::*;
pub use output::*;
pub use send::*;
pub use stats::*;
