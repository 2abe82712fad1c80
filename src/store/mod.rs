//! Task record store: one markdown file per task.
//!
//! The store uses the `FileSystem` port for all I/O. Directory layout:
//!
//! ```text
//! <root>/
//!   ├── config.yaml
//!   ├── tasks/<id>.md
//!   └── locks/<id>.lock
//! ```
//!
//! Nothing is cached between calls: every read is a fresh snapshot that may
//! already be stale, and every write is independently atomic.

use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::ports::FileSystem;
use crate::task::{parse_record, render_record, validate_id, Task};

const TASK_EXT: &str = ".md";

/// A record that could not be parsed during a bulk scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorruptRecord {
    /// File stem of the record.
    pub id: String,
    /// Parser diagnostic.
    pub reason: String,
}

/// Result of an eager scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Every task that parsed.
    pub tasks: Vec<Task>,
    /// Records that were skipped because they are corrupt.
    pub corrupt: Vec<CorruptRecord>,
}

/// Persistence layer for task records.
pub struct TaskStore<'a> {
    ctx: &'a ServiceContext,
    root: PathBuf,
}

impl<'a> TaskStore<'a> {
    /// Creates a new store rooted at the given path.
    #[must_use]
    pub fn new(ctx: &'a ServiceContext, root: &Path) -> Self {
        Self { ctx, root: root.to_path_buf() }
    }

    /// The store root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads one task.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no record exists, `Corrupt` if it cannot be
    /// parsed or names a different id, `InvalidId` for unusable ids, and
    /// `Io` for other read failures.
    pub fn load(&self, id: &str) -> Result<Task> {
        validate_id(id)?;
        let path = self.task_path(id);
        let contents = self.ctx.fs.read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::NotFound { id: id.to_string() },
            _ => Error::Io(e),
        })?;
        let task = parse_record(id, &contents)?;
        if task.id != id {
            return Err(Error::Corrupt {
                id: id.to_string(),
                reason: format!("record declares id {}", task.id),
            });
        }
        Ok(task)
    }

    /// Saves a task, replacing any previous version atomically.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for unusable ids, or an error if rendering or
    /// writing fails.
    pub fn save(&self, task: &Task) -> Result<()> {
        validate_id(&task.id)?;
        let contents = render_record(task)?;
        atomic_write(self.ctx.fs.as_ref(), &self.task_path(&task.id), &contents)?;
        log::debug!("saved task {} ({})", task.id, task.state);
        Ok(())
    }

    /// Writes a new task record, refusing to replace an existing one.
    ///
    /// Returns `false` if a record for the id already exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` for unusable ids, or an error if rendering or
    /// writing fails.
    pub fn create(&self, task: &Task) -> Result<bool> {
        validate_id(&task.id)?;
        let contents = render_record(task)?;
        let created = self.ctx.fs.create_new(&self.task_path(&task.id), &contents)?;
        if created {
            log::debug!("created record for {}", task.id);
        }
        Ok(created)
    }

    /// Returns `true` if a record exists for `id`.
    #[must_use]
    pub fn exists(&self, id: &str) -> bool {
        validate_id(id).is_ok() && self.ctx.fs.exists(&self.task_path(id))
    }

    /// Lists the ids of all task records, sorted.
    ///
    /// Staging files and foreign entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the tasks directory cannot be listed.
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let dir = self.tasks_dir();
        if !self.ctx.fs.exists(&dir) {
            return Ok(Vec::new());
        }
        Ok(self
            .ctx
            .fs
            .list_dir(&dir)?
            .into_iter()
            .filter_map(|name| name.strip_suffix(TASK_EXT).map(String::from))
            .filter(|id| validate_id(id).is_ok())
            .collect())
    }

    /// Lazily iterates over every readable task.
    ///
    /// Corrupt records are logged and skipped; records removed after the
    /// directory listing are skipped silently. Call again to restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the tasks directory cannot be listed.
    pub fn scan(&self) -> Result<TaskScan<'_, 'a>> {
        Ok(TaskScan { store: self, ids: self.list_ids()?.into_iter() })
    }

    /// Reads every task, collecting corrupt records instead of logging them.
    ///
    /// # Errors
    ///
    /// Returns an error if the tasks directory cannot be listed.
    pub fn load_all(&self) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        for id in self.list_ids()? {
            match self.load(&id) {
                Ok(task) => report.tasks.push(task),
                Err(Error::NotFound { .. }) => {}
                Err(e) => report.corrupt.push(CorruptRecord { id, reason: e.to_string() }),
            }
        }
        Ok(report)
    }

    pub(crate) fn tasks_dir(&self) -> PathBuf {
        self.root.join("tasks")
    }

    fn task_path(&self, id: &str) -> PathBuf {
        self.tasks_dir().join(format!("{id}{TASK_EXT}"))
    }
}

/// Lazy iterator returned by [`TaskStore::scan`].
pub struct TaskScan<'s, 'a> {
    store: &'s TaskStore<'a>,
    ids: std::vec::IntoIter<String>,
}

impl Iterator for TaskScan<'_, '_> {
    type Item = Task;

    fn next(&mut self) -> Option<Task> {
        for id in self.ids.by_ref() {
            match self.store.load(&id) {
                Ok(task) => return Some(task),
                Err(Error::NotFound { .. }) => log::debug!("task {id} vanished during scan"),
                Err(e) => log::warn!("skipping task {id}: {e}"),
            }
        }
        None
    }
}

/// Writes `contents` to a hidden sibling of `path`, then renames it into
/// place so readers see either the old or the new file, never a mix.
pub(crate) fn atomic_write(fs: &dyn FileSystem, path: &Path, contents: &str) -> io::Result<()> {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let staged = path.with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()));
    fs.write(&staged, contents)?;
    if let Err(e) = fs.rename(&staged, path) {
        let _ = fs.remove(&staged);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::ManualClock;
    use crate::task::{Priority, TaskState};
    use chrono::{TimeZone, Utc};

    fn make_ctx() -> ServiceContext {
        ServiceContext::in_memory(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn sample(id: &str) -> Task {
        let mut task = Task::new(id, format!("Task {id}"), TaskState::Todo, Utc::now());
        task.priority = Priority::High;
        task.requires.insert("t-0000".to_string());
        task.body = "Some notes.\n".to_string();
        task
    }

    #[test]
    fn save_and_load_round_trips() {
        let ctx = make_ctx();
        let store = TaskStore::new(&ctx, Path::new("/store"));

        let task = sample("t-0001");
        store.save(&task).unwrap();
        let loaded = store.load("t-0001").unwrap();
        store.save(&loaded).unwrap();

        assert_eq!(store.load("t-0001").unwrap(), task);
    }

    #[test]
    fn create_refuses_existing_record() {
        let ctx = make_ctx();
        let store = TaskStore::new(&ctx, Path::new("/store"));
        let first = sample("t-0001");

        assert!(store.create(&first).unwrap());
        let mut second = sample("t-0001");
        second.title = "Impostor".to_string();
        assert!(!store.create(&second).unwrap());

        assert_eq!(store.load("t-0001").unwrap(), first);
    }

    #[test]
    fn save_leaves_no_staging_files() {
        let ctx = make_ctx();
        let store = TaskStore::new(&ctx, Path::new("/store"));

        store.save(&sample("t-0001")).unwrap();
        store.save(&sample("t-0001")).unwrap();

        let names = ctx.fs.list_dir(Path::new("/store/tasks")).unwrap();
        assert_eq!(names, vec!["t-0001.md"]);
    }

    #[test]
    fn load_missing_is_not_found() {
        let ctx = make_ctx();
        let store = TaskStore::new(&ctx, Path::new("/store"));
        assert!(store.load("t-0404").unwrap_err().is_not_found());
    }

    #[test]
    fn load_rejects_mismatched_id() {
        let ctx = make_ctx();
        let store = TaskStore::new(&ctx, Path::new("/store"));
        let text = render_record(&sample("t-0001")).unwrap();
        ctx.fs.write(Path::new("/store/tasks/t-0002.md"), &text).unwrap();

        assert!(matches!(store.load("t-0002"), Err(Error::Corrupt { .. })));
    }

    #[test]
    fn save_rejects_invalid_id() {
        let ctx = make_ctx();
        let store = TaskStore::new(&ctx, Path::new("/store"));
        let task = sample("../escape");
        assert!(matches!(store.save(&task), Err(Error::InvalidId(_))));
    }

    #[test]
    fn scan_skips_corrupt_records() {
        let ctx = make_ctx();
        let store = TaskStore::new(&ctx, Path::new("/store"));
        store.save(&sample("t-0001")).unwrap();
        store.save(&sample("t-0003")).unwrap();
        ctx.fs.write(Path::new("/store/tasks/t-0002.md"), "not a record").unwrap();
        ctx.fs.write(Path::new("/store/tasks/README.txt"), "ignored").unwrap();

        let ids: Vec<String> = store.scan().unwrap().map(|t| t.id).collect();
        assert_eq!(ids, vec!["t-0001", "t-0003"]);

        // Restartable.
        assert_eq!(store.scan().unwrap().count(), 2);
    }

    #[test]
    fn load_all_reports_corrupt_records() {
        let ctx = make_ctx();
        let store = TaskStore::new(&ctx, Path::new("/store"));
        store.save(&sample("t-0001")).unwrap();
        ctx.fs.write(Path::new("/store/tasks/t-0002.md"), "---\nid: [\n---\n").unwrap();

        let report = store.load_all().unwrap();
        assert_eq!(report.tasks.len(), 1);
        assert_eq!(report.corrupt.len(), 1);
        assert_eq!(report.corrupt[0].id, "t-0002");
    }

    #[test]
    fn empty_store_lists_nothing() {
        let ctx = make_ctx();
        let store = TaskStore::new(&ctx, Path::new("/store"));
        assert!(store.list_ids().unwrap().is_empty());
        assert_eq!(store.scan().unwrap().count(), 0);
    }
}
