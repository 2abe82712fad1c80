//! Task data model and its on-disk record format.
//!
//! A task record is a markdown document with YAML front matter. The
//! front matter carries the fields below; anything the engine does not
//! recognize is kept in [`Task::extra`] and written back unchanged.

mod model;
mod record;

pub use model::{validate_id, NewTask, Priority, Task, TaskState};
pub use record::{parse_record, render_record};
