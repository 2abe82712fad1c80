//! Work-cycle commands: claim, heartbeat, release, block, complete, cancel,
//! promote, defer and reconcile.

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::task::TaskState;

/// Execute the `claim` command for `id`, or the next ready task.
///
/// With `--next`, an empty queue is not an error.
///
/// # Errors
///
/// `AlreadyLocked` / `PreconditionFailed` for an explicit id, plus store
/// and lock errors.
pub fn claim(coord: &Coordinator<'_>, id: Option<&str>, next: bool, owner: &str) -> Result<()> {
    let claimed = match id {
        Some(id) if !next => Some(coord.claim(id, owner)?),
        _ => coord.claim_next(owner)?,
    };
    match claimed {
        Some(task) => println!("{} claimed by {owner}: {}", task.id, task.title),
        None => println!("Nothing to claim."),
    }
    Ok(())
}

/// Execute the `heartbeat` command.
///
/// # Errors
///
/// `LostOwnership` if the owner no longer holds the lock.
pub fn heartbeat(coord: &Coordinator<'_>, id: &str, owner: &str) -> Result<()> {
    coord.heartbeat(id, owner)?;
    println!("{id}: lock renewed");
    Ok(())
}

/// Execute the `release` command. Releasing a task you do not hold is
/// reported but succeeds.
///
/// # Errors
///
/// Store and lock I/O errors.
pub fn release(coord: &Coordinator<'_>, id: &str, owner: &str) -> Result<()> {
    if coord.release(id, owner)? {
        println!("{id}: released");
    } else {
        println!("{id}: not held by {owner}, nothing to release");
    }
    Ok(())
}

/// Execute the `block` command.
///
/// # Errors
///
/// `LostOwnership` or `PreconditionFailed` from the coordinator.
pub fn block(coord: &Coordinator<'_>, id: &str, waiting_for: &str, owner: &str) -> Result<()> {
    let task = coord.block(id, owner, waiting_for)?;
    println!("{}: waiting for {}", task.id, task.waiting_for.unwrap_or_default());
    Ok(())
}

/// Execute the `complete` command and list the unblocked dependents.
///
/// # Errors
///
/// `LostOwnership` or `PreconditionFailed` from the coordinator.
pub fn complete(coord: &Coordinator<'_>, id: &str, owner: &str) -> Result<()> {
    let unblocked = coord.complete(id, owner)?;
    println!("{id}: done");
    for task in &unblocked {
        println!("  unblocked {} ({})", task.id, task.state);
    }
    Ok(())
}

/// Execute the `cancel` command.
///
/// # Errors
///
/// `PreconditionFailed` for terminal tasks.
pub fn cancel(coord: &Coordinator<'_>, id: &str) -> Result<()> {
    coord.cancel(id)?;
    println!("{id}: cancelled");
    Ok(())
}

/// Execute the `promote` command.
///
/// # Errors
///
/// `PreconditionFailed` unless the task is in backlog or someday.
pub fn promote(coord: &Coordinator<'_>, id: &str) -> Result<()> {
    coord.promote(id)?;
    println!("{id}: todo");
    Ok(())
}

/// Execute the `defer` command.
///
/// # Errors
///
/// `PreconditionFailed` for illegal targets or transitions.
pub fn defer(coord: &Coordinator<'_>, id: &str, to: TaskState) -> Result<()> {
    let task = coord.defer(id, to)?;
    println!("{id}: {}", task.state);
    Ok(())
}

/// Execute the `reconcile` command.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn reconcile(coord: &Coordinator<'_>) -> Result<()> {
    let saved = coord.reconcile()?;
    if saved.is_empty() {
        println!("Store is consistent.");
    }
    for task in &saved {
        println!("repaired {} ({})", task.id, task.state);
    }
    Ok(())
}
