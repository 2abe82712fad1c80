//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::task::{Priority, TaskState};

/// Top-level CLI parser for `tasklock`.
#[derive(Debug, Parser)]
#[command(name = "tasklock", version, about = "Coordinate agents over a shared task directory")]
pub struct Cli {
    /// Task store root (defaults to `$TASKLOCK_DIR`, then `.tasks`).
    #[arg(long, global = true, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Owner identity for locks (defaults to `$TASKLOCK_OWNER`, then `pid-<pid>`).
    #[arg(long, global = true, value_name = "ID")]
    pub owner: Option<String>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a task.
    New {
        /// Task title.
        title: String,
        /// Explicit id instead of a generated one.
        #[arg(long)]
        id: Option<String>,
        /// Priority: low, medium, high or urgent.
        #[arg(long)]
        priority: Option<Priority>,
        /// Initial state: backlog, todo or someday.
        #[arg(long)]
        state: Option<TaskState>,
        /// Prerequisite task ids (comma separated or repeated).
        #[arg(long = "requires", value_delimiter = ',')]
        requires: Vec<String>,
        /// Markdown body.
        #[arg(long, default_value = "")]
        body: String,
        /// Spawn the task as a child of this one.
        #[arg(long, value_name = "ID")]
        parent: Option<String>,
    },
    /// Print one task.
    Show {
        /// Task id.
        id: String,
    },
    /// List every task with its lock.
    Status,
    /// List ready tasks in claim order.
    Ready,
    /// Claim a task (or the next ready one) for the owner.
    Claim {
        /// Task id.
        #[arg(required_unless_present = "next", conflicts_with = "next")]
        id: Option<String>,
        /// Claim the highest-priority ready task instead.
        #[arg(long)]
        next: bool,
    },
    /// Renew the owner's lock on a task.
    Heartbeat {
        /// Task id.
        id: String,
    },
    /// Give a claimed task back.
    Release {
        /// Task id.
        id: String,
    },
    /// Park an active task until a condition is met.
    Block {
        /// Task id.
        id: String,
        /// Task id or free-text condition.
        waiting_for: String,
    },
    /// Mark a claimed task done and unblock its dependents.
    Complete {
        /// Task id.
        id: String,
    },
    /// Cancel a task.
    Cancel {
        /// Task id.
        id: String,
    },
    /// Move a backlog or someday task to todo.
    Promote {
        /// Task id.
        id: String,
    },
    /// Shelve a task.
    Defer {
        /// Task id.
        id: String,
        /// Target state: backlog or someday.
        #[arg(long, default_value = "backlog")]
        to: TaskState,
    },
    /// Set fields on a task.
    Edit {
        /// Task id.
        id: String,
        /// Field and value; may be repeated.
        #[arg(long = "set", num_args = 2, value_names = ["FIELD", "VALUE"], required = true)]
        set: Vec<String>,
    },
    /// Report dependency cycles.
    Cycles,
    /// Re-run unblock cascades and repair `blocks` lists.
    Reconcile,
    /// Low-level lock operations.
    Lock {
        /// The lock action.
        #[command(subcommand)]
        action: LockCommand,
    },
}

/// `tasklock lock` subcommands.
#[derive(Debug, Subcommand)]
pub enum LockCommand {
    /// Take the lock without changing the task.
    Acquire {
        /// Task id.
        id: String,
        /// Override the configured timeout.
        #[arg(long, value_name = "HOURS")]
        timeout_hours: Option<f64>,
    },
    /// Refresh the heartbeat.
    Renew {
        /// Task id.
        id: String,
    },
    /// Drop the lock if the owner holds it.
    Release {
        /// Task id.
        id: String,
    },
    /// Show who holds the lock.
    Status {
        /// Task id.
        id: String,
    },
    /// Remove the lock whoever holds it.
    ForceRelease {
        /// Task id.
        id: String,
    },
    /// List all locks.
    List,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, LockCommand};
    use clap::Parser;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli =
            Cli::parse_from(["tasklock", "claim", "t-1", "--owner", "agent-1", "--dir", "/s"]);
        assert_eq!(cli.owner.as_deref(), Some("agent-1"));
        assert_eq!(cli.dir.as_deref(), Some(std::path::Path::new("/s")));
        assert!(matches!(cli.command, Command::Claim { id: Some(_), next: false }));
    }

    #[test]
    fn claim_needs_id_or_next() {
        assert!(Cli::try_parse_from(["tasklock", "claim"]).is_err());
        assert!(Cli::try_parse_from(["tasklock", "claim", "t-1", "--next"]).is_err());
        let cli = Cli::parse_from(["tasklock", "claim", "--next"]);
        assert!(matches!(cli.command, Command::Claim { id: None, next: true }));
    }

    #[test]
    fn parses_new_with_requirements() {
        let cli = Cli::parse_from([
            "tasklock", "new", "Ship it", "--priority", "high", "--requires", "a,b",
        ]);
        match cli.command {
            Command::New { title, priority, requires, .. } => {
                assert_eq!(title, "Ship it");
                assert_eq!(priority, Some(crate::task::Priority::High));
                assert_eq!(requires, vec!["a", "b"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_repeated_edit_pairs() {
        let cli = Cli::parse_from([
            "tasklock", "edit", "t-1", "--set", "title", "New", "--set", "priority", "low",
        ]);
        match cli.command {
            Command::Edit { id, set } => {
                assert_eq!(id, "t-1");
                assert_eq!(set, vec!["title", "New", "priority", "low"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_lock_subcommands() {
        let cli = Cli::parse_from(["tasklock", "lock", "acquire", "t-1", "--timeout-hours", "0.5"]);
        assert!(matches!(
            cli.command,
            Command::Lock { action: LockCommand::Acquire { timeout_hours: Some(_), .. } }
        ));
        let cli = Cli::parse_from(["tasklock", "lock", "force-release", "t-1"]);
        assert!(matches!(cli.command, Command::Lock { action: LockCommand::ForceRelease { .. } }));
    }

    #[test]
    fn rejects_unknown_state() {
        assert!(Cli::try_parse_from(["tasklock", "defer", "t-1", "--to", "later"]).is_err());
    }
}
