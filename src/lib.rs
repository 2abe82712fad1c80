//! File-backed task coordination for independent agent processes.
//!
//! Tasks are markdown records with YAML front matter under `<root>/tasks`;
//! advisory locks are JSON records under `<root>/locks`. There is no
//! server: every call re-reads the shared directory, and [`Coordinator`]
//! composes the store, the lock manager, the state machine and the
//! dependency resolver into claim / complete style operations.

pub mod adapters;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod graph;
pub mod lock;
pub mod ports;
pub mod state;
pub mod store;
pub mod task;

pub use config::Config;
pub use context::ServiceContext;
pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use lock::{LockInfo, LockManager, LockRecord, LockStatus};
pub use store::TaskStore;
pub use task::{NewTask, Priority, Task, TaskState};

use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> std::result::Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = cli::Cli::try_parse_from(args).map_err(|err| err.to_string())?;
    commands::dispatch(&cli)
}
