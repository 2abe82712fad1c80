//! `tasklock edit` command.

use crate::coordinator::Coordinator;
use crate::error::{Error, Result};

/// Execute the `edit` command.
///
/// `pairs` alternates field names and values, applied in order. Each pair
/// is saved on its own, so a failing pair leaves earlier ones applied.
///
/// # Errors
///
/// Returns the first edit the coordinator refuses.
pub fn run(coord: &Coordinator<'_>, id: &str, pairs: &[String]) -> Result<()> {
    if pairs.len() % 2 != 0 {
        return Err(Error::PreconditionFailed {
            task_id: id.to_string(),
            reason: "every --set needs a field and a value".to_string(),
        });
    }
    for pair in pairs.chunks_exact(2) {
        let task = coord.edit(id, &pair[0], &pair[1])?;
        println!("{}: {} updated", task.id, pair[0]);
    }
    Ok(())
}
