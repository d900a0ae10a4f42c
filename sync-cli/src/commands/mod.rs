//! CLI command implementations.

pub mod get;
pub mod list;
pub mod set;
pub mod status;
pub mod watch;
