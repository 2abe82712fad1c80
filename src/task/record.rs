//! Front-matter record format.
//!
//! ```text
//! ---
//! id: t-0001
//! title: Write parser
//! state: todo
//! ---
//! Body text.
//! ```

use super::Task;
use crate::error::{Error, Result};

const DELIMITER: &str = "---";

/// Parses a task record.
///
/// `id` only labels the error; the caller checks it against the parsed id.
///
/// # Errors
///
/// Returns `Error::Corrupt` if the front matter is missing, unterminated or
/// does not deserialize into a [`Task`].
pub fn parse_record(id: &str, content: &str) -> Result<Task> {
    let corrupt = |reason: String| Error::Corrupt { id: id.to_string(), reason };
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);

    let mut lines = content.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == DELIMITER => {}
        _ => return Err(corrupt("missing front matter".to_string())),
    }

    let mut front = String::new();
    let mut closed = false;
    for line in lines.by_ref() {
        if line.trim_end() == DELIMITER {
            closed = true;
            break;
        }
        front.push_str(line);
    }
    if !closed {
        return Err(corrupt("unterminated front matter".to_string()));
    }

    let mut task: Task = serde_yaml::from_str(&front).map_err(|e| corrupt(e.to_string()))?;
    task.body = lines.collect();
    Ok(task)
}

/// Renders a task as a record document.
///
/// # Errors
///
/// Returns an error if the front matter cannot be serialized.
pub fn render_record(task: &Task) -> Result<String> {
    let yaml = serde_yaml::to_string(task)?;
    let mut out = String::with_capacity(yaml.len() + task.body.len() + 8);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&task.body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskState};
    use chrono::{TimeZone, Utc};

    fn sample() -> Task {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let mut task = Task::new("t-0002", "Write the parser", TaskState::Waiting, now);
        task.priority = Priority::High;
        task.requires.insert("t-0001".to_string());
        task.blocks.insert("t-0003".to_string());
        task.waiting_for = Some("t-0001".to_string());
        task.assigned_to = Some("agent-7".to_string());
        task.spawned_from = Some("t-0000".to_string());
        task.body = "## Notes\n\nKeep it small.\n".to_string();
        task
    }

    #[test]
    fn render_then_parse_round_trips() {
        let task = sample();
        let text = render_record(&task).unwrap();
        assert!(text.starts_with("---\nid: t-0002\n"));

        let parsed = parse_record("t-0002", &text).unwrap();
        assert_eq!(parsed, task);
    }

    #[test]
    fn unknown_fields_survive_a_rewrite() {
        let text = "---\n\
id: lesson-4\n\
title: Ownership\n\
state: backlog\n\
created_at: 2025-01-01T00:00:00Z\n\
updated_at: 2025-01-02T00:00:00Z\n\
github_issue: 42\n\
labels:\n- rust\n- lesson\n\
---\n\
Body\n";
        let task = parse_record("lesson-4", text).unwrap();
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.extra.len(), 2);
        assert_eq!(task.extra["github_issue"].as_u64(), Some(42));

        let rewritten = render_record(&task).unwrap();
        let again = parse_record("lesson-4", &rewritten).unwrap();
        assert_eq!(again, task);
        assert!(rewritten.contains("github_issue: 42"));
        assert!(rewritten.contains("- lesson"));
    }

    #[test]
    fn empty_body_is_preserved() {
        let mut task = sample();
        task.body = String::new();
        let text = render_record(&task).unwrap();
        assert!(text.ends_with("---\n"));
        assert_eq!(parse_record("t-0002", &text).unwrap().body, "");
    }

    #[test]
    fn missing_front_matter_is_corrupt() {
        let err = parse_record("x", "# just markdown\n").unwrap_err();
        assert!(matches!(err, Error::Corrupt { ref id, .. } if id == "x"));
    }

    #[test]
    fn unterminated_front_matter_is_corrupt() {
        let err = parse_record("x", "---\nid: x\nstate: todo\n").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn bad_state_is_corrupt() {
        let text = "---\nid: x\nstate: finished\ncreated_at: 2025-01-01T00:00:00Z\n\
updated_at: 2025-01-01T00:00:00Z\n---\n";
        assert!(matches!(parse_record("x", text), Err(Error::Corrupt { .. })));
    }
}
