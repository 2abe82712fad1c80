//! Command dispatch and handlers.

pub mod edit;
pub mod lock;
pub mod new;
pub mod show;
pub mod status;
pub mod work;

use std::path::Path;

use crate::cli::{Cli, Command};
use crate::config;
use crate::context::ServiceContext;
use crate::coordinator::Coordinator;
use crate::error::Result;

/// Dispatch a parsed command against the live filesystem.
///
/// The store root and owner come from the flags, then `TASKLOCK_DIR` /
/// `TASKLOCK_OWNER`, then defaults.
///
/// # Errors
///
/// Returns an error string if the selected command handler fails.
pub fn dispatch(cli: &Cli) -> std::result::Result<(), String> {
    let ctx = ServiceContext::live();
    let root = config::resolve_root(cli.dir.as_deref());
    let owner = config::resolve_owner(cli.owner.as_deref());
    log::debug!("store {} as {owner}", root.display());
    dispatch_with_context(&cli.command, &ctx, &root, &owner).map_err(|e| e.to_string())
}

/// Dispatch a command with the given service context.
///
/// # Errors
///
/// Returns the first engine error the handler hits.
pub fn dispatch_with_context(
    command: &Command,
    ctx: &ServiceContext,
    root: &Path,
    owner: &str,
) -> Result<()> {
    let coord = Coordinator::open(ctx, root)?;
    match command {
        Command::New { title, id, priority, state, requires, body, parent } => {
            let args = new::NewArgs {
                title,
                id: id.as_deref(),
                priority: *priority,
                state: *state,
                requires,
                body,
                parent: parent.as_deref(),
            };
            new::run(&coord, &args)
        }
        Command::Show { id } => show::run(&coord, id),
        Command::Status => status::run(&coord),
        Command::Ready => status::ready(&coord),
        Command::Cycles => status::cycles(&coord),
        Command::Claim { id, next } => work::claim(&coord, id.as_deref(), *next, owner),
        Command::Heartbeat { id } => work::heartbeat(&coord, id, owner),
        Command::Release { id } => work::release(&coord, id, owner),
        Command::Block { id, waiting_for } => work::block(&coord, id, waiting_for, owner),
        Command::Complete { id } => work::complete(&coord, id, owner),
        Command::Cancel { id } => work::cancel(&coord, id),
        Command::Promote { id } => work::promote(&coord, id),
        Command::Defer { id, to } => work::defer(&coord, id, *to),
        Command::Reconcile => work::reconcile(&coord),
        Command::Edit { id, set } => edit::run(&coord, id, set),
        Command::Lock { action } => lock::run(&coord, action, owner),
    }
}
