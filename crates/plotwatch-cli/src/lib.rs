//! plotwatch command line: run sessions, snapshot files, and an interactive REPL.

pub mod commands;
pub mod config;
pub mod error;
pub mod repl;
pub mod session;

pub use config::resolve_snapshot_path;
pub use error::{CliError, CliResult};
pub use session::{RunInputs, RunSession};
