//! Coordination facade.
//!
//! The only layer that combines I/O (task store, lock manager) with the
//! pure state machine and dependency resolver. Every operation re-reads
//! what it needs; nothing is cached between calls.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::graph::{self, DependencyGraph};
use crate::lock::LockManager;
use crate::state::{self, Guard};
use crate::store::TaskStore;
use crate::task::{validate_id, NewTask, Task, TaskState};

/// Front-matter fields `edit` refuses to touch.
const READ_ONLY_FIELDS: &[&str] =
    &["id", "blocks", "created_at", "updated_at", "spawned_from", "spawned_tasks"];

/// High-level task coordination over one store root.
pub struct Coordinator<'a> {
    ctx: &'a ServiceContext,
    store: TaskStore<'a>,
    locks: LockManager<'a>,
    config: Config,
}

impl<'a> Coordinator<'a> {
    /// Creates a coordinator with explicit settings.
    #[must_use]
    pub fn new(ctx: &'a ServiceContext, root: &Path, config: Config) -> Self {
        Self { ctx, store: TaskStore::new(ctx, root), locks: LockManager::new(ctx, root), config }
    }

    /// Creates a coordinator using the store's `config.yaml`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the config file is present but invalid.
    pub fn open(ctx: &'a ServiceContext, root: &Path) -> Result<Self> {
        let config = Config::load(ctx, root)?;
        Ok(Self::new(ctx, root, config))
    }

    /// The underlying task store.
    #[must_use]
    pub fn store(&self) -> &TaskStore<'a> {
        &self.store
    }

    /// The underlying lock manager.
    #[must_use]
    pub fn locks(&self) -> &LockManager<'a> {
        &self.locks
    }

    /// Active settings.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Claims a `todo` task whose requirements are all done.
    ///
    /// Takes the task lock, moves the task to `active` and records `owner`
    /// as its assignee. If the lock cannot be taken nothing is changed; if
    /// anything fails after the lock was taken, the lock is released again
    /// unless `owner` already held it before the call.
    ///
    /// # Errors
    ///
    /// `AlreadyLocked` when another owner holds the task, `PreconditionFailed`
    /// when the task is not claimable, plus store and lock errors.
    pub fn claim(&self, task_id: &str, owner: &str) -> Result<Task> {
        let task = self.store.load(task_id)?;
        if task.state != TaskState::Todo {
            return Err(precondition(task_id, format!("task is {}, not todo", task.state)));
        }
        let all = self.snapshot()?;
        let graph = DependencyGraph::from_tasks(&all);
        let unmet = graph.unmet_requirements(&task);
        if !unmet.is_empty() {
            return Err(precondition(
                task_id,
                format!("requirements not done: {}", unmet.join(", ")),
            ));
        }
        if graph.on_cycle(task_id) {
            return Err(precondition(task_id, "task is on a dependency cycle"));
        }

        let held_before = self.owns(task_id, owner)?;
        if !self.locks.acquire(task_id, owner, self.config.lock_timeout())? {
            let holder = match self.locks.status(task_id) {
                Ok(Some(info)) => info.record.owner,
                _ => "another owner".to_string(),
            };
            return Err(Error::AlreadyLocked { task_id: task_id.to_string(), owner: holder });
        }

        match self.start(task_id, owner) {
            Ok(task) => Ok(task),
            Err(e) if held_before => Err(e),
            Err(e) => {
                if let Err(release_err) = self.locks.release(task_id, owner) {
                    log::warn!("claim of {task_id} failed and its lock was kept: {release_err}");
                }
                Err(e)
            }
        }
    }

    fn start(&self, task_id: &str, owner: &str) -> Result<Task> {
        // Reload under the lock; the pre-lock read may already be stale.
        let mut task = self.store.load(task_id)?;
        state::transition(&mut task, TaskState::Active, &Guard::with_lock(), self.now())?;
        task.assigned_to = Some(owner.to_string());
        self.store.save(&task)?;
        Ok(task)
    }

    /// Claims the first claimable task in ready-set order.
    ///
    /// Tasks lost to other owners (or changed since the scan) are skipped.
    /// Returns `None` when nothing could be claimed.
    ///
    /// # Errors
    ///
    /// Store and lock errors other than contention.
    pub fn claim_next(&self, owner: &str) -> Result<Option<Task>> {
        for candidate in graph::claimable(&self.snapshot()?) {
            match self.claim(&candidate.id, owner) {
                Ok(task) => return Ok(Some(task)),
                Err(e @ (Error::AlreadyLocked { .. } | Error::PreconditionFailed { .. })) => {
                    log::debug!("skipping {}: {e}", candidate.id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Renews the lock held by `owner`.
    ///
    /// # Errors
    ///
    /// `LostOwnership` if `owner` no longer holds the lock.
    pub fn heartbeat(&self, task_id: &str, owner: &str) -> Result<()> {
        if self.locks.renew(task_id, owner)? {
            Ok(())
        } else {
            Err(lost(task_id, owner))
        }
    }

    /// Gives an active task back to the pool.
    ///
    /// If `owner` holds the lock, an `active` task returns to `todo` and the
    /// lock is removed. Anyone else gets `false` and nothing changes.
    ///
    /// # Errors
    ///
    /// Store and lock I/O errors.
    pub fn release(&self, task_id: &str, owner: &str) -> Result<bool> {
        if !self.owns(task_id, owner)? {
            log::debug!("{owner} does not hold {task_id}; nothing to release");
            return Ok(false);
        }
        let mut task = self.store.load(task_id)?;
        if task.state == TaskState::Active {
            state::transition(&mut task, TaskState::Todo, &Guard::none(), self.now())?;
            self.store.save(&task)?;
        }
        self.locks.release(task_id, owner)
    }

    /// Parks an active task on `waiting_for` and releases its lock.
    ///
    /// # Errors
    ///
    /// `LostOwnership` if `owner` does not hold the lock,
    /// `PreconditionFailed` if the task is not active or the condition is
    /// blank.
    pub fn block(&self, task_id: &str, owner: &str, waiting_for: &str) -> Result<Task> {
        if !self.owns(task_id, owner)? {
            return Err(lost(task_id, owner));
        }
        let mut task = self.store.load(task_id)?;
        let guard = Guard::waiting_on(waiting_for.trim());
        state::transition(&mut task, TaskState::Waiting, &guard, self.now())?;
        self.store.save(&task)?;
        self.locks.release(task_id, owner)?;
        Ok(task)
    }

    /// Completes a task and unblocks its dependents.
    ///
    /// The completion is persisted before the lock is released and the
    /// cascade runs. Returns the dependents that were updated. A dependent
    /// that cannot be saved is logged and left for [`Coordinator::reconcile`].
    ///
    /// # Errors
    ///
    /// `LostOwnership` if `owner` does not hold the lock,
    /// `PreconditionFailed` if the task is not active, plus store errors
    /// while completing the task itself.
    pub fn complete(&self, task_id: &str, owner: &str) -> Result<Vec<Task>> {
        if !self.owns(task_id, owner)? {
            return Err(lost(task_id, owner));
        }
        let mut task = self.store.load(task_id)?;
        state::transition(&mut task, TaskState::Done, &Guard::with_lock(), self.now())?;
        self.store.save(&task)?;
        if let Err(e) = self.locks.release(task_id, owner) {
            log::warn!("{task_id} is done but its lock could not be released: {e}");
        }

        let all = self.snapshot()?;
        let updates = graph::on_completed(task_id, &all, self.now());
        Ok(self.persist_all(updates))
    }

    /// Cancels a non-terminal task, forcibly clearing any lock on it.
    ///
    /// # Errors
    ///
    /// `PreconditionFailed` if the task is already terminal, plus store and
    /// lock errors.
    pub fn cancel(&self, task_id: &str) -> Result<Task> {
        let mut task = self.store.load(task_id)?;
        state::transition(&mut task, TaskState::Cancelled, &Guard::none(), self.now())?;
        self.store.save(&task)?;
        self.locks.force_release(task_id)?;
        Ok(task)
    }

    /// Moves a `backlog` or `someday` task to `todo`.
    ///
    /// # Errors
    ///
    /// `PreconditionFailed` for tasks in any other state.
    pub fn promote(&self, task_id: &str) -> Result<Task> {
        let mut task = self.store.load(task_id)?;
        if !matches!(task.state, TaskState::Backlog | TaskState::Someday) {
            return Err(precondition(
                task_id,
                format!("only backlog or someday tasks can be promoted, task is {}", task.state),
            ));
        }
        state::transition(&mut task, TaskState::Todo, &Guard::none(), self.now())?;
        self.store.save(&task)?;
        Ok(task)
    }

    /// Shelves a task into `backlog` or `someday`.
    ///
    /// # Errors
    ///
    /// `PreconditionFailed` if `to` is not a deferral state or the
    /// transition is illegal.
    pub fn defer(&self, task_id: &str, to: TaskState) -> Result<Task> {
        if !matches!(to, TaskState::Backlog | TaskState::Someday) {
            return Err(precondition(task_id, format!("cannot defer to {to}")));
        }
        let mut task = self.store.load(task_id)?;
        state::transition(&mut task, to, &Guard::none(), self.now())?;
        self.store.save(&task)?;
        Ok(task)
    }

    /// Creates a task.
    ///
    /// # Errors
    ///
    /// `InvalidId` for unusable ids, `PreconditionFailed` if the id is taken,
    /// the title is blank, the initial state is not `backlog`, `todo` or
    /// `someday`, or the requirements would form a cycle.
    pub fn create(&self, new: NewTask) -> Result<Task> {
        self.insert(new, None)
    }

    /// Creates a child of `parent_id` and records the link on both sides.
    ///
    /// # Errors
    ///
    /// `NotFound` for a missing parent, `PreconditionFailed` for a terminal
    /// parent, plus everything [`Coordinator::create`] returns.
    pub fn spawn(&self, parent_id: &str, new: NewTask) -> Result<Task> {
        let mut parent = self.store.load(parent_id)?;
        if parent.state.is_terminal() {
            return Err(precondition(
                parent_id,
                format!("cannot spawn from a {} task", parent.state),
            ));
        }
        let child = self.insert(new, Some(parent_id))?;
        parent.spawned_tasks.push(child.id.clone());
        parent.touch(self.now());
        self.store.save(&parent)?;
        Ok(child)
    }

    fn insert(&self, new: NewTask, spawned_from: Option<&str>) -> Result<Task> {
        let id = new.id.unwrap_or_else(|| self.ctx.id_gen.generate_id());
        validate_id(&id)?;
        if self.store.exists(&id) {
            return Err(taken(&id));
        }
        let title = new.title.trim();
        if title.is_empty() {
            return Err(precondition(&id, "title must not be empty"));
        }
        let state = new.state.unwrap_or(self.config.default_state);
        if !matches!(state, TaskState::Backlog | TaskState::Todo | TaskState::Someday) {
            return Err(precondition(&id, format!("new tasks cannot start in {state}")));
        }
        let requires = parse_requirements(&id, new.requires.iter().map(String::as_str))?;

        let mut all = self.snapshot()?;
        let mut task = Task::new(&id, title, state, self.now());
        task.priority = new.priority.unwrap_or(self.config.default_priority);
        task.body = new.body;
        task.spawned_from = spawned_from.map(String::from);
        task.requires.clone_from(&requires);
        // Others may already name this id before it exists.
        task.blocks = graph::derive_blocks(&all).remove(&id).unwrap_or_default();
        all.push(task.clone());
        if let Some(cycle) = graph::cycle_with_requires(&all, &id, &requires) {
            return Err(precondition(
                &id,
                format!("requirements would form a cycle: {}", cycle.join(" -> ")),
            ));
        }

        if !self.store.create(&task)? {
            return Err(taken(&id));
        }
        log::info!("created task {id} ({state})");
        self.link_blocks(&id, &requires, &BTreeSet::new());
        Ok(task)
    }

    /// Sets one field of a task.
    ///
    /// `state` goes through the state machine without a lock. `cancelled`
    /// takes the [`Coordinator::cancel`] path; a task leaving `active` has
    /// its lock force-released; a task marked done this way still unblocks
    /// its dependents. `requires` takes a comma
    /// or space separated id list. Blank values clear optional fields.
    /// Unknown fields are stored as YAML scalars.
    ///
    /// # Errors
    ///
    /// `PreconditionFailed` for read-only fields, unparsable values, illegal
    /// transitions, and requirement changes that would form a cycle.
    pub fn edit(&self, task_id: &str, field: &str, value: &str) -> Result<Task> {
        let mut task = self.store.load(task_id)?;
        let now = self.now();
        let trimmed = value.trim();
        let was_active = task.state == TaskState::Active;
        match field {
            f if READ_ONLY_FIELDS.contains(&f) => {
                return Err(precondition(task_id, format!("{f} is read-only")));
            }
            "state" => {
                let to: TaskState = trimmed.parse().map_err(|e| precondition(task_id, e))?;
                if to == TaskState::Cancelled {
                    return self.cancel(task_id);
                }
                let guard = Guard { lock_held: false, waiting_for: task.waiting_for.clone() };
                state::transition(&mut task, to, &guard, now)?;
            }
            "title" if trimmed.is_empty() => {
                return Err(precondition(task_id, "title must not be empty"));
            }
            "title" => task.title = trimmed.to_string(),
            "priority" => task.priority = trimmed.parse().map_err(|e| precondition(task_id, e))?,
            "requires" => {
                let requires =
                    parse_requirements(task_id, trimmed.split([',', ' ']).map(str::trim))?;
                if let Some(cycle) =
                    graph::cycle_with_requires(&self.snapshot()?, task_id, &requires)
                {
                    return Err(precondition(
                        task_id,
                        format!("requirements would form a cycle: {}", cycle.join(" -> ")),
                    ));
                }
                let added = requires.difference(&task.requires).cloned().collect();
                let removed = task.requires.difference(&requires).cloned().collect();
                task.requires = requires;
                task.touch(now);
                self.store.save(&task)?;
                self.link_blocks(task_id, &added, &removed);
                return Ok(task);
            }
            "assigned_to" => task.assigned_to = non_blank(trimmed),
            "waiting_for" => task.waiting_for = non_blank(trimmed),
            "body" => task.body = value.to_string(),
            other if trimmed.is_empty() => {
                task.extra.remove(other);
            }
            other => {
                let parsed = serde_yaml::from_str(trimmed)
                    .unwrap_or_else(|_| serde_yaml::Value::String(trimmed.to_string()));
                task.extra.insert(other.to_string(), parsed);
            }
        }
        task.touch(now);
        self.store.save(&task)?;
        log::debug!("edited {field} of {task_id}");
        if field == "state" && was_active {
            self.locks.force_release(task_id)?;
        }
        if field == "state" && task.state == TaskState::Done {
            let updates = graph::on_completed(task_id, &self.snapshot()?, now);
            self.persist_all(updates);
        }
        Ok(task)
    }

    /// Non-terminal tasks whose requirements are all done, in claim order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn ready(&self) -> Result<Vec<Task>> {
        Ok(graph::ready_set(&self.snapshot()?))
    }

    /// Dependency cycles currently in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn cycles(&self) -> Result<Vec<Vec<String>>> {
        Ok(graph::detect_cycles(&self.snapshot()?))
    }

    /// Re-runs the unblock cascade for every `done` task and rewrites
    /// out-of-date `blocks` lists. Returns the tasks that were saved.
    ///
    /// Running it twice in a row saves nothing the second time.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    pub fn reconcile(&self) -> Result<Vec<Task>> {
        let now = self.now();
        let mut all = self.snapshot()?;
        let done: Vec<String> =
            all.iter().filter(|t| t.state == TaskState::Done).map(|t| t.id.clone()).collect();

        let mut changed: Vec<Task> = Vec::new();
        for id in &done {
            for update in graph::on_completed(id, &all, now) {
                upsert(&mut changed, update.clone());
                upsert(&mut all, update);
            }
        }
        for fixed in graph::stale_blocks(&all, now) {
            upsert(&mut changed, fixed.clone());
            upsert(&mut all, fixed);
        }

        let saved = self.persist_all(changed);
        log::info!("reconciled {} task(s)", saved.len());
        Ok(saved)
    }

    fn snapshot(&self) -> Result<Vec<Task>> {
        Ok(self.store.scan()?.collect())
    }

    fn now(&self) -> DateTime<Utc> {
        self.ctx.clock.now()
    }

    /// Whether `owner` is the recorded lock owner; an unreadable lock
    /// belongs to nobody.
    fn owns(&self, task_id: &str, owner: &str) -> Result<bool> {
        match self.locks.is_held_by(task_id, owner) {
            Err(Error::Corrupt { .. }) => Ok(false),
            other => other,
        }
    }

    fn persist_all(&self, updates: Vec<Task>) -> Vec<Task> {
        updates
            .into_iter()
            .filter(|task| match self.store.save(task) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("could not save {}: {e}; run reconcile to retry", task.id);
                    false
                }
            })
            .collect()
    }

    /// Mirrors a `requires` change of `task_id` into the `blocks` lists of
    /// the affected tasks. Failures are logged; reconcile repairs them.
    fn link_blocks(&self, task_id: &str, added: &BTreeSet<String>, removed: &BTreeSet<String>) {
        let now = self.now();
        for dep in added.iter().chain(removed) {
            let mut other = match self.store.load(dep) {
                Ok(task) => task,
                Err(Error::NotFound { .. }) => continue,
                Err(e) => {
                    log::warn!("could not update blocks of {dep}: {e}");
                    continue;
                }
            };
            let changed = if added.contains(dep) {
                other.blocks.insert(task_id.to_string())
            } else {
                other.blocks.remove(task_id)
            };
            if changed {
                other.touch(now);
                if let Err(e) = self.store.save(&other) {
                    log::warn!("could not update blocks of {dep}: {e}");
                }
            }
        }
    }
}

fn precondition(task_id: &str, reason: impl Into<String>) -> Error {
    Error::PreconditionFailed { task_id: task_id.to_string(), reason: reason.into() }
}

fn taken(task_id: &str) -> Error {
    precondition(task_id, "a task with this id already exists")
}

fn lost(task_id: &str, owner: &str) -> Error {
    Error::LostOwnership { task_id: task_id.to_string(), owner: owner.to_string() }
}

fn non_blank(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_requirements<'v>(
    task_id: &str,
    ids: impl Iterator<Item = &'v str>,
) -> Result<BTreeSet<String>> {
    let mut requires = BTreeSet::new();
    for id in ids.filter(|id| !id.is_empty()) {
        validate_id(id)?;
        if id == task_id {
            return Err(precondition(task_id, "a task cannot require itself"));
        }
        requires.insert(id.to_string());
    }
    Ok(requires)
}

fn upsert(tasks: &mut Vec<Task>, task: Task) {
    match tasks.iter_mut().find(|t| t.id == task.id) {
        Some(slot) => *slot = task,
        None => tasks.push(task),
    }
}
