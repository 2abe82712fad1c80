//! `tasklock lock` subcommands: raw lock operations that leave task state
//! alone.

use chrono::Duration;

use crate::cli::LockCommand;
use crate::commands::status::{format_duration, render_table};
use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::{Error, Result};
use crate::lock::LockInfo;

/// Execute a `lock` subcommand on behalf of `owner`.
///
/// `acquire` and `renew` fail when the lock is not obtained so scripts can
/// branch on the exit code.
///
/// # Errors
///
/// `AlreadyLocked`, `LostOwnership`, `Config` for a bad timeout override,
/// and lock I/O errors.
pub fn run(coord: &Coordinator<'_>, action: &LockCommand, owner: &str) -> Result<()> {
    let locks = coord.locks();
    match action {
        LockCommand::Acquire { id, timeout_hours } => {
            let timeout = match timeout_hours {
                Some(hours) => timeout_from_hours(*hours)?,
                None => coord.config().lock_timeout(),
            };
            if !locks.acquire(id, owner, timeout)? {
                let holder = locks
                    .status(id)?
                    .map_or_else(|| "another owner".to_string(), |info| info.record.owner);
                return Err(Error::AlreadyLocked { task_id: id.clone(), owner: holder });
            }
            println!("{id}: locked by {owner}");
        }
        LockCommand::Renew { id } => {
            if !locks.renew(id, owner)? {
                return Err(Error::LostOwnership { task_id: id.clone(), owner: owner.to_string() });
            }
            println!("{id}: lock renewed");
        }
        LockCommand::Release { id } => {
            if locks.release(id, owner)? {
                println!("{id}: lock released");
            } else {
                println!("{id}: not held by {owner}, nothing to release");
            }
        }
        LockCommand::Status { id } => match locks.status(id)? {
            Some(info) => println!("{}", describe(&info)),
            None => println!("{id}: unlocked"),
        },
        LockCommand::ForceRelease { id } => match locks.force_release(id)? {
            Some(previous) => println!("{id}: lock held by {} removed", previous.owner),
            None => println!("{id}: no readable lock to remove"),
        },
        LockCommand::List => {
            let all = locks.list()?;
            if all.is_empty() {
                println!("No locks held.");
            } else {
                let rows: Vec<Vec<String>> = all
                    .iter()
                    .map(|info| {
                        vec![
                            info.record.task_id.clone(),
                            info.record.owner.clone(),
                            info.status.to_string(),
                            format_duration(info.held_for),
                            format_duration(info.idle_for),
                        ]
                    })
                    .collect();
                print!("{}", render_table(&["TASK", "OWNER", "STATUS", "HELD", "IDLE"], &rows));
            }
        }
    }
    Ok(())
}

fn timeout_from_hours(hours: f64) -> Result<Duration> {
    let config = Config { lock_timeout_hours: hours, ..Config::default() };
    config.validate()?;
    Ok(config.lock_timeout())
}

fn describe(info: &LockInfo) -> String {
    format!(
        "{}: {} by {}, held {}, idle {}, expires {}",
        info.record.task_id,
        info.status,
        info.record.owner,
        format_duration(info.held_for),
        format_duration(info.idle_for),
        info.record.expires_at().map_or_else(|| "never".to_string(), |at| at.to_rfc3339()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::ManualClock;
    use crate::context::ServiceContext;
    use chrono::{TimeZone, Utc};
    use std::path::Path;

    fn id(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn acquire_renew_release_round() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap());
        let ctx = ServiceContext::in_memory(clock.clone());
        let coord = Coordinator::new(&ctx, Path::new("/store"), Config::default());

        let first = LockCommand::Acquire { id: id("t-1"), timeout_hours: Some(1.0) };
        run(&coord, &first, "a").unwrap();
        let err = run(&coord, &LockCommand::Acquire { id: id("t-1"), timeout_hours: None }, "b")
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyLocked { ref owner, .. } if owner == "a"));

        run(&coord, &LockCommand::Renew { id: id("t-1") }, "a").unwrap();
        assert!(run(&coord, &LockCommand::Renew { id: id("t-1") }, "b").is_err());
        run(&coord, &LockCommand::List, "a").unwrap();
        run(&coord, &LockCommand::Status { id: id("t-1") }, "a").unwrap();

        clock.advance(Duration::minutes(61));
        run(&coord, &LockCommand::Acquire { id: id("t-1"), timeout_hours: None }, "b").unwrap();
        run(&coord, &LockCommand::Release { id: id("t-1") }, "a").unwrap();
        assert!(coord.locks().is_held_by("t-1", "b").unwrap());

        run(&coord, &LockCommand::ForceRelease { id: id("t-1") }, "a").unwrap();
        assert!(coord.locks().status("t-1").unwrap().is_none());
    }

    #[test]
    fn rejects_bad_timeout_override() {
        let ctx = ServiceContext::in_memory(ManualClock::new(Utc::now()));
        let coord = Coordinator::new(&ctx, Path::new("/store"), Config::default());
        for hours in [-1.0, 1e10] {
            let action = LockCommand::Acquire { id: id("t-1"), timeout_hours: Some(hours) };
            let result = run(&coord, &action, "a");
            assert!(matches!(result, Err(Error::Config(_))));
        }
        assert!(coord.locks().status("t-1").unwrap().is_none());
    }

    #[test]
    fn status_describes_longest_timeout() {
        let ctx = ServiceContext::in_memory(ManualClock::new(Utc::now()));
        let coord = Coordinator::new(&ctx, Path::new("/store"), Config::default());
        let action = LockCommand::Acquire { id: id("t-1"), timeout_hours: Some(8_760.0) };
        run(&coord, &action, "a").unwrap();

        let info = coord.locks().status("t-1").unwrap().unwrap();
        assert!(describe(&info).contains("expires "));
        run(&coord, &LockCommand::Status { id: id("t-1") }, "a").unwrap();
    }
}
