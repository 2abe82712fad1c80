//! Error types for the coordination engine.

use thiserror::Error;

use crate::task::TaskState;

/// Errors raised by the task store, lock manager, state machine and facade.
#[derive(Error, Debug)]
pub enum Error {
    /// No record exists for the referenced task id.
    #[error("task not found: {id}")]
    NotFound {
        /// The id that did not resolve.
        id: String,
    },

    /// A record exists but its metadata cannot be parsed.
    #[error("corrupt task record {id}: {reason}")]
    Corrupt {
        /// The id (file stem) of the broken record.
        id: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// Another owner holds an active lock on the task.
    #[error("task {task_id} is locked by {owner}")]
    AlreadyLocked {
        /// The contended task.
        task_id: String,
        /// Current lock owner.
        owner: String,
    },

    /// The requested state transition or edit is not legal right now.
    #[error("precondition failed for {task_id}: {reason}")]
    PreconditionFailed {
        /// The task the operation targeted.
        task_id: String,
        /// Why the operation was refused.
        reason: String,
    },

    /// The caller is no longer the recorded lock owner.
    #[error("{owner} no longer holds the lock on {task_id}")]
    LostOwnership {
        /// The task whose lock was lost.
        task_id: String,
        /// The caller that believed it was the owner.
        owner: String,
    },

    /// The id cannot be used as a record name.
    #[error("invalid task id {0:?}")]
    InvalidId(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Builds a `PreconditionFailed` for an illegal state transition.
    pub(crate) fn illegal_transition(
        task_id: &str,
        from: TaskState,
        to: TaskState,
        why: &str,
    ) -> Self {
        Self::PreconditionFailed {
            task_id: task_id.to_string(),
            reason: format!("{from} -> {to} is not allowed: {why}"),
        }
    }

    /// Returns `true` for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
