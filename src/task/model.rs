//! Core task types.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle state of a task.
///
/// `Done` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Captured but not yet scheduled.
    Backlog,
    /// Scheduled and claimable once its requirements are done.
    Todo,
    /// Claimed by an agent holding the task lock.
    Active,
    /// Parked on an external condition named by `waiting_for`.
    Waiting,
    /// Finished.
    Done,
    /// Abandoned.
    Cancelled,
    /// Parked indefinitely.
    Someday,
}

impl TaskState {
    /// All states, in lifecycle order.
    pub const ALL: [TaskState; 7] = [
        TaskState::Backlog,
        TaskState::Todo,
        TaskState::Active,
        TaskState::Waiting,
        TaskState::Done,
        TaskState::Cancelled,
        TaskState::Someday,
    ];

    /// Is this a terminal state (no further transitions)?
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Cancelled)
    }

    /// The lowercase name used in task records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Backlog => "backlog",
            TaskState::Todo => "todo",
            TaskState::Active => "active",
            TaskState::Waiting => "waiting",
            TaskState::Done => "done",
            TaskState::Cancelled => "cancelled",
            TaskState::Someday => "someday",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TaskState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown task state: {s}"))
    }
}

/// Advisory priority. Ordering is `Low < Medium < High < Urgent`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Nice to have.
    Low,
    /// The default.
    #[default]
    Medium,
    /// Pick before medium work.
    High,
    /// Pick first.
    Urgent,
}

impl Priority {
    /// The lowercase name used in task records.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [Priority::Low, Priority::Medium, Priority::High, Priority::Urgent]
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown priority: {s}"))
    }
}

/// A unit of work shared between agent processes.
///
/// Serialized as the YAML front matter of a task record; `body` is the
/// markdown that follows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier, also the record's file stem.
    pub id: String,
    /// Short human-readable title.
    #[serde(default)]
    pub title: String,
    /// Lifecycle state.
    pub state: TaskState,
    /// Advisory priority.
    #[serde(default)]
    pub priority: Priority,
    /// Tasks that must be done before this one is ready.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub requires: BTreeSet<String>,
    /// Tasks that require this one (denormalized inverse of `requires`).
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub blocks: BTreeSet<String>,
    /// The condition a waiting task is parked on (free text or task id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_for: Option<String>,
    /// Agent cooperatively working on the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time, never earlier than `created_at`.
    pub updated_at: DateTime<Utc>,
    /// Parent task in a fan-out tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawned_from: Option<String>,
    /// Child tasks fanned out from this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spawned_tasks: Vec<String>,
    /// Front-matter fields this engine does not understand.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
    /// Markdown body following the front matter.
    #[serde(skip)]
    pub body: String,
}

impl Task {
    /// Creates a task with empty relations.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        state: TaskState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            state,
            priority: Priority::default(),
            requires: BTreeSet::new(),
            blocks: BTreeSet::new(),
            waiting_for: None,
            assigned_to: None,
            created_at: now,
            updated_at: now,
            spawned_from: None,
            spawned_tasks: Vec::new(),
            extra: BTreeMap::new(),
            body: String::new(),
        }
    }

    /// Bumps `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.updated_at).max(self.created_at);
    }
}

/// Input for creating a task through the coordinator.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Explicit id; generated when absent.
    pub id: Option<String>,
    /// Title.
    pub title: String,
    /// Initial state; the configured default when absent.
    pub state: Option<TaskState>,
    /// Priority; the configured default when absent.
    pub priority: Option<Priority>,
    /// Ids of prerequisite tasks.
    pub requires: Vec<String>,
    /// Markdown body.
    pub body: String,
}

impl NewTask {
    /// Starts a new task description with the given title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Self::default() }
    }

    /// Sets an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the initial state.
    #[must_use]
    pub fn with_state(mut self, state: TaskState) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Adds a prerequisite.
    #[must_use]
    pub fn requiring(mut self, id: impl Into<String>) -> Self {
        self.requires.push(id.into());
        self
    }
}

/// Checks that `id` can name a record file.
///
/// Accepts ASCII letters, digits, `-`, `_` and `.`, not starting with `.`.
///
/// # Errors
///
/// Returns `Error::InvalidId` otherwise.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidId(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn terminal_states() {
        let terminal: Vec<_> = TaskState::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal, vec![TaskState::Done, TaskState::Cancelled]);
    }

    #[test]
    fn state_parses_case_insensitively() {
        assert_eq!("Waiting".parse::<TaskState>().unwrap(), TaskState::Waiting);
        assert!("finished".parse::<TaskState>().is_err());
    }

    #[test]
    fn priority_orders_urgent_highest() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let mut task = Task::new("t-1", "x", TaskState::Todo, t0);

        task.touch(t0 - Duration::hours(1));
        assert_eq!(task.updated_at, t0);

        task.touch(t0 + Duration::minutes(5));
        assert_eq!(task.updated_at, t0 + Duration::minutes(5));
    }

    #[test]
    fn validate_id_rejects_path_like_ids() {
        assert!(validate_id("t-0001").is_ok());
        assert!(validate_id("lesson_3.2").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../etc").is_err());
        assert!(validate_id(".hidden").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("with space").is_err());
    }
}
