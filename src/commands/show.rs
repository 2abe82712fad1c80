//! `tasklock show` command.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::commands::status::format_duration;
use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::lock::LockInfo;
use crate::task::Task;

/// Execute the `show` command.
///
/// # Errors
///
/// Returns `NotFound` / `Corrupt` from the store.
pub fn run(coord: &Coordinator<'_>, id: &str) -> Result<()> {
    let task = coord.store().load(id)?;
    let lock = match coord.locks().status(id) {
        Ok(lock) => lock,
        Err(Error::Corrupt { reason, .. }) => {
            log::warn!("lock on {id} is unreadable: {reason}");
            None
        }
        Err(e) => return Err(e),
    };
    print!("{}", describe(&task, lock.as_ref()));
    Ok(())
}

/// Multi-line description of a task and its lock.
pub(crate) fn describe(task: &Task, lock: Option<&LockInfo>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Task: {}", task.id);
    let _ = writeln!(out, "Title: {}", task.title);
    let _ = writeln!(out, "State: {}", task.state);
    let _ = writeln!(out, "Priority: {}", task.priority);

    if !task.requires.is_empty() {
        let _ = writeln!(out, "Requires: {}", join(&task.requires));
    }
    if !task.blocks.is_empty() {
        let _ = writeln!(out, "Blocks: {}", join(&task.blocks));
    }
    if let Some(waiting_for) = &task.waiting_for {
        let _ = writeln!(out, "Waiting for: {waiting_for}");
    }
    if let Some(assignee) = &task.assigned_to {
        let _ = writeln!(out, "Assigned to: {assignee}");
    }
    if let Some(parent) = &task.spawned_from {
        let _ = writeln!(out, "Spawned from: {parent}");
    }
    if !task.spawned_tasks.is_empty() {
        let _ = writeln!(out, "Spawned: {}", task.spawned_tasks.join(", "));
    }
    let _ = writeln!(out, "Created: {}", task.created_at.to_rfc3339());
    let _ = writeln!(out, "Updated: {}", task.updated_at.to_rfc3339());

    if let Some(info) = lock {
        let _ = writeln!(
            out,
            "Lock: {} ({}, held {}, last heartbeat {} ago)",
            info.record.owner,
            info.status,
            format_duration(info.held_for),
            format_duration(info.idle_for),
        );
    }

    for (key, value) in &task.extra {
        let rendered = serde_yaml::to_string(value).unwrap_or_default();
        let _ = writeln!(out, "{key}: {}", rendered.trim_end());
    }

    if !task.body.trim().is_empty() {
        let _ = write!(out, "\n{}", task.body);
        if !task.body.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

fn join(ids: &BTreeSet<String>) -> String {
    ids.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskState;
    use chrono::{TimeZone, Utc};

    #[test]
    fn describe_lists_relations_and_extras() {
        let at = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut task = Task::new("t-2", "Wire it up", TaskState::Waiting, at);
        task.requires.insert("t-1".into());
        task.waiting_for = Some("t-1".into());
        task.extra.insert("estimate".into(), serde_yaml::Value::Number(3_u64.into()));
        task.body = "Details here.".into();

        let text = describe(&task, None);

        assert!(text.starts_with("Task: t-2\nTitle: Wire it up\nState: waiting\n"));
        assert!(text.contains("Requires: t-1\n"));
        assert!(text.contains("Waiting for: t-1\n"));
        assert!(text.contains("estimate: 3\n"));
        assert!(text.ends_with("\nDetails here.\n"));
        assert!(!text.contains("Lock:"));
    }
}
