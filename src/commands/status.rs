//! `tasklock status`, `ready` and `cycles` commands.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::Duration;

use crate::coordinator::Coordinator;
use crate::error::Result;
use crate::lock::LockInfo;
use crate::task::Task;

/// Execute the `status` command.
///
/// Prints every task with its state, priority and lock holder, followed
/// by any records that could not be parsed.
///
/// # Errors
///
/// Returns an error if the store or lock directory cannot be read.
pub fn run(coord: &Coordinator<'_>) -> Result<()> {
    let report = coord.store().load_all()?;
    let locks: HashMap<String, LockInfo> = coord
        .locks()
        .list()?
        .into_iter()
        .map(|info| (info.record.task_id.clone(), info))
        .collect();

    if report.tasks.is_empty() && report.corrupt.is_empty() {
        println!("No tasks found in store.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = report
        .tasks
        .iter()
        .map(|task| {
            let lock = locks.get(&task.id).map_or_else(
                || "-".to_string(),
                |info| format!("{} ({})", info.record.owner, info.status),
            );
            vec![
                task.id.clone(),
                task.state.to_string(),
                task.priority.to_string(),
                lock,
                task.title.clone(),
            ]
        })
        .collect();
    print!("{}", render_table(&["ID", "STATE", "PRIORITY", "LOCK", "TITLE"], &rows));

    for corrupt in &report.corrupt {
        println!("! {}: {}", corrupt.id, corrupt.reason);
    }
    println!("\n{} task(s) total.", report.tasks.len());
    Ok(())
}

/// Execute the `ready` command.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn ready(coord: &Coordinator<'_>) -> Result<()> {
    let ready = coord.ready()?;
    if ready.is_empty() {
        println!("Nothing is ready.");
        return Ok(());
    }
    print!("{}", task_table(&ready));
    Ok(())
}

/// Execute the `cycles` command.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn cycles(coord: &Coordinator<'_>) -> Result<()> {
    let cycles = coord.cycles()?;
    if cycles.is_empty() {
        println!("No dependency cycles.");
        return Ok(());
    }
    for cycle in &cycles {
        println!("{}", cycle.join(" <-> "));
    }
    println!("\n{} cycle(s) found.", cycles.len());
    Ok(())
}

/// Renders tasks as an `ID / STATE / PRIORITY / TITLE` table.
pub(crate) fn task_table(tasks: &[Task]) -> String {
    let rows: Vec<Vec<String>> = tasks
        .iter()
        .map(|t| vec![t.id.clone(), t.state.to_string(), t.priority.to_string(), t.title.clone()])
        .collect();
    render_table(&["ID", "STATE", "PRIORITY", "TITLE"], &rows)
}

/// Left-aligned columns sized to their widest cell, with a dashed rule
/// under the header. The last column is not padded.
pub(crate) fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            rows.iter().filter_map(|r| r.get(i)).map(String::len).max().unwrap_or(0).max(h.len())
        })
        .collect();
    let last = headers.len().saturating_sub(1);

    let mut out = String::new();
    let mut line = |cells: &mut dyn Iterator<Item = (usize, String)>| {
        let mut text = String::new();
        for (i, cell) in cells {
            if i > 0 {
                text.push_str("  ");
            }
            if i == last {
                text.push_str(&cell);
            } else {
                let _ = write!(text, "{cell:<width$}", width = widths[i]);
            }
        }
        out.push_str(text.trim_end());
        out.push('\n');
    };

    line(&mut headers.iter().map(|h| (*h).to_string()).enumerate());
    line(&mut widths.iter().map(|w| "-".repeat(*w)).enumerate());
    for row in rows {
        line(&mut row.iter().cloned().enumerate());
    }
    out
}

/// Compact human duration: `45s`, `12m`, `3h 05m`, `2d 4h`.
pub(crate) fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h {:02}m", s / 3_600, (s % 3_600) / 60),
        s => format!("{}d {}h", s / 86_400, (s % 86_400) / 3_600),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::ManualClock;
    use crate::config::Config;
    use crate::context::ServiceContext;
    use crate::task::NewTask;
    use chrono::{TimeZone, Utc};
    use std::path::Path;

    #[test]
    fn table_aligns_columns() {
        let rows = vec![
            vec!["t-1".to_string(), "todo".to_string(), "A long title".to_string()],
            vec!["t-22".to_string(), "active".to_string(), "B".to_string()],
        ];
        let table = render_table(&["ID", "STATE", "TITLE"], &rows);
        let expected = "\
ID    STATE   TITLE
----  ------  ------------
t-1   todo    A long title
t-22  active  B
";
        assert_eq!(table, expected);
    }

    #[test]
    fn durations_are_compact() {
        assert_eq!(format_duration(Duration::seconds(45)), "45s");
        assert_eq!(format_duration(Duration::minutes(12)), "12m");
        assert_eq!(format_duration(Duration::minutes(185)), "3h 05m");
        assert_eq!(format_duration(Duration::hours(52)), "2d 4h");
        assert_eq!(format_duration(Duration::seconds(-5)), "0s");
    }

    #[test]
    fn status_ready_and_cycles_run_on_populated_store() {
        let ctx = ServiceContext::in_memory(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 4, 1, 8, 0, 0).unwrap(),
        ));
        let coord = Coordinator::new(&ctx, Path::new("/store"), Config::default());

        run(&coord).unwrap();
        ready(&coord).unwrap();
        cycles(&coord).unwrap();

        let a = coord.create(NewTask::titled("A")).unwrap();
        coord.create(NewTask::titled("B").requiring(&a.id)).unwrap();
        coord.claim(&a.id, "agent-1").unwrap();
        ctx.fs.write(Path::new("/store/tasks/broken.md"), "garbage").unwrap();

        run(&coord).unwrap();
        ready(&coord).unwrap();
        cycles(&coord).unwrap();
    }
}
