//! `tasklock new` command.

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::task::{NewTask, Priority, TaskState};

/// Arguments of `tasklock new`, borrowed from the parsed CLI.
#[derive(Debug, Default)]
pub struct NewArgs<'c> {
    /// Title.
    pub title: &'c str,
    /// Explicit id.
    pub id: Option<&'c str>,
    /// Priority override.
    pub priority: Option<Priority>,
    /// Initial state override.
    pub state: Option<TaskState>,
    /// Prerequisite ids.
    pub requires: &'c [String],
    /// Markdown body.
    pub body: &'c str,
    /// Parent to spawn from.
    pub parent: Option<&'c str>,
}

/// Execute the `new` command and print the new task's id.
///
/// # Errors
///
/// Returns the coordinator's validation errors.
pub fn run(coord: &Coordinator<'_>, args: &NewArgs<'_>) -> Result<()> {
    let new = NewTask {
        id: args.id.map(String::from),
        title: args.title.to_string(),
        state: args.state,
        priority: args.priority,
        requires: args.requires.to_vec(),
        body: args.body.to_string(),
    };
    let task = match args.parent {
        Some(parent) => coord.spawn(parent, new)?,
        None => coord.create(new)?,
    };
    println!("{}", task.id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::ManualClock;
    use crate::config::Config;
    use crate::context::ServiceContext;
    use chrono::Utc;
    use std::path::Path;

    #[test]
    fn creates_and_spawns() {
        let ctx = ServiceContext::in_memory(ManualClock::new(Utc::now()));
        let coord = Coordinator::new(&ctx, Path::new("/store"), Config::default());

        let high =
            NewArgs { title: "Parent", priority: Some(Priority::High), ..NewArgs::default() };
        run(&coord, &high).unwrap();
        run(&coord, &NewArgs { title: "Child", parent: Some("t-0001"), ..NewArgs::default() })
            .unwrap();

        let child = coord.store().load("t-0002").unwrap();
        assert_eq!(child.spawned_from.as_deref(), Some("t-0001"));
        assert_eq!(coord.store().load("t-0001").unwrap().priority, Priority::High);
    }

    #[test]
    fn rejects_blank_title() {
        let ctx = ServiceContext::in_memory(ManualClock::new(Utc::now()));
        let coord = Coordinator::new(&ctx, Path::new("/store"), Config::default());
        assert!(run(&coord, &NewArgs { title: " ", ..NewArgs::default() }).is_err());
    }
}
