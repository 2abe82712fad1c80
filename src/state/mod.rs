//! Task state machine.
//!
//! Transitions:
//! - backlog/someday -> todo (promote), todo -> backlog/someday, backlog <-> someday
//! - todo -> active (only with the task lock held)
//! - active -> waiting (must name what it waits for)
//! - waiting -> todo (unblock, clears `waiting_for`)
//! - active -> todo (release, clears `assigned_to`)
//! - active -> done
//! - any non-terminal -> cancelled
//!
//! `done` and `cancelled` are terminal. A refused transition leaves the
//! task untouched.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::task::{Task, TaskState};

/// Facts the caller vouches for when requesting a transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Guard {
    /// The caller holds the task's lock.
    pub lock_held: bool,
    /// Condition to record when moving to `waiting`.
    pub waiting_for: Option<String>,
}

impl Guard {
    /// No lock, no waiting condition.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// The caller holds the task lock.
    #[must_use]
    pub fn with_lock() -> Self {
        Self { lock_held: true, waiting_for: None }
    }

    /// Moving to `waiting` on `condition`.
    #[must_use]
    pub fn waiting_on(condition: impl Into<String>) -> Self {
        Self { lock_held: false, waiting_for: Some(condition.into()) }
    }
}

enum Rule {
    Always,
    NeedsLock,
    NeedsWaitingFor,
    Never(&'static str),
}

fn rule(from: TaskState, to: TaskState) -> Rule {
    use TaskState::{Active, Backlog, Cancelled, Done, Someday, Todo, Waiting};

    if from.is_terminal() {
        return Rule::Never("terminal tasks cannot be reopened");
    }
    if from == to {
        return Rule::Never("task is already in that state");
    }
    match (from, to) {
        (_, Cancelled)
        | (Backlog | Someday, Todo)
        | (Todo, Backlog | Someday)
        | (Backlog, Someday)
        | (Someday, Backlog)
        | (Waiting | Active, Todo)
        | (Active, Done) => Rule::Always,
        (Todo, Active) => Rule::NeedsLock,
        (Active, Waiting) => Rule::NeedsWaitingFor,
        (_, Active) => Rule::Never("only todo tasks can be started"),
        (_, Done) => Rule::Never("only active tasks can be completed"),
        (_, Waiting) => Rule::Never("only active tasks can start waiting"),
        _ => Rule::Never("no such transition"),
    }
}

/// Checks whether `task` may move to `to` under `guard`.
///
/// # Errors
///
/// Returns `PreconditionFailed` describing why the transition is illegal.
pub fn check(task: &Task, to: TaskState, guard: &Guard) -> Result<()> {
    let refuse = |why: &str| Err(Error::illegal_transition(&task.id, task.state, to, why));
    match rule(task.state, to) {
        Rule::Always => Ok(()),
        Rule::NeedsLock if guard.lock_held => Ok(()),
        Rule::NeedsLock => refuse("the task lock is not held"),
        Rule::NeedsWaitingFor
            if guard.waiting_for.as_deref().is_some_and(|w| !w.trim().is_empty()) =>
        {
            Ok(())
        }
        Rule::NeedsWaitingFor => refuse("waiting_for must be set"),
        Rule::Never(why) => refuse(why),
    }
}

/// Moves `task` to `to`, applying the transition's side effects and
/// bumping `updated_at`. All-or-nothing.
///
/// # Errors
///
/// Returns `PreconditionFailed` if the transition is illegal; `task` is
/// unchanged in that case.
pub fn transition(
    task: &mut Task,
    to: TaskState,
    guard: &Guard,
    now: DateTime<Utc>,
) -> Result<()> {
    check(task, to, guard)?;
    let from = task.state;
    match (from, to) {
        (_, TaskState::Waiting) => task.waiting_for.clone_from(&guard.waiting_for),
        (TaskState::Waiting, TaskState::Todo) | (_, TaskState::Done) => task.waiting_for = None,
        (TaskState::Active, TaskState::Todo) => task.assigned_to = None,
        _ => {}
    }
    task.state = to;
    task.touch(now);
    log::info!("task {} {from} -> {to}", task.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rstest::rstest;
    use TaskState::{Active, Backlog, Cancelled, Done, Someday, Todo, Waiting};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap()
    }

    fn task_in(state: TaskState) -> Task {
        Task::new("t-1", "x", state, at())
    }

    #[rstest]
    #[case::promote_backlog(Backlog, Todo)]
    #[case::promote_someday(Someday, Todo)]
    #[case::defer_todo(Todo, Someday)]
    #[case::shelve_todo(Todo, Backlog)]
    #[case::backlog_to_someday(Backlog, Someday)]
    #[case::unblock(Waiting, Todo)]
    #[case::release(Active, Todo)]
    #[case::complete(Active, Done)]
    #[case::cancel_backlog(Backlog, Cancelled)]
    #[case::cancel_active(Active, Cancelled)]
    #[case::cancel_waiting(Waiting, Cancelled)]
    fn always_legal(#[case] from: TaskState, #[case] to: TaskState) {
        let mut task = task_in(from);
        transition(&mut task, to, &Guard::none(), at() + Duration::minutes(1)).unwrap();
        assert_eq!(task.state, to);
        assert_eq!(task.updated_at, at() + Duration::minutes(1));
    }

    #[rstest]
    #[case::reopen_done(Done, Todo)]
    #[case::reopen_cancelled(Cancelled, Todo)]
    #[case::cancel_done(Done, Cancelled)]
    #[case::skip_to_done(Todo, Done)]
    #[case::waiting_to_active(Waiting, Active)]
    #[case::backlog_to_active(Backlog, Active)]
    #[case::todo_to_waiting(Todo, Waiting)]
    #[case::same_state(Todo, Todo)]
    fn never_legal(#[case] from: TaskState, #[case] to: TaskState) {
        let mut task = task_in(from);
        let guard = Guard { lock_held: true, waiting_for: Some("t-9".into()) };
        let before = task.clone();

        let err = transition(&mut task, to, &guard, at() + Duration::hours(1)).unwrap_err();

        assert!(matches!(err, Error::PreconditionFailed { .. }));
        assert_eq!(task, before);
    }

    #[test]
    fn start_requires_lock() {
        let mut task = task_in(Todo);
        assert!(transition(&mut task, Active, &Guard::none(), at()).is_err());
        assert_eq!(task.state, Todo);

        transition(&mut task, Active, &Guard::with_lock(), at()).unwrap();
        assert_eq!(task.state, Active);
    }

    #[test]
    fn waiting_requires_condition() {
        let mut task = task_in(Active);
        assert!(transition(&mut task, Waiting, &Guard::waiting_on("  "), at()).is_err());

        transition(&mut task, Waiting, &Guard::waiting_on("t-0007"), at()).unwrap();
        assert_eq!(task.waiting_for.as_deref(), Some("t-0007"));
    }

    #[test]
    fn unblock_clears_waiting_for() {
        let mut task = task_in(Waiting);
        task.waiting_for = Some("t-0007".into());
        transition(&mut task, Todo, &Guard::none(), at()).unwrap();
        assert!(task.waiting_for.is_none());
    }

    #[test]
    fn release_clears_assignment() {
        let mut task = task_in(Active);
        task.assigned_to = Some("agent-1".into());
        transition(&mut task, Todo, &Guard::none(), at()).unwrap();
        assert!(task.assigned_to.is_none());
    }

    #[test]
    fn clock_skew_never_moves_updated_at_backwards() {
        let mut task = task_in(Backlog);
        transition(&mut task, Todo, &Guard::none(), at() - Duration::hours(2)).unwrap();
        assert_eq!(task.updated_at, at());
        assert!(task.updated_at >= task.created_at);
    }
}
