//! Advisory lock manager.
//!
//! One JSON lock record per task lives at `<root>/locks/<id>.lock`. A lock
//! whose heartbeat is older than its timeout is stale: it still exists on
//! disk but is treated as abandoned and can be taken over.
//!
//! Acquisition is optimistic check-then-create. Exclusive creation is as
//! strong as the filesystem's `create_new`; stale takeover and renewal are
//! read-then-rename and only best-effort under true concurrent races on
//! networked filesystems.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::store::atomic_write;
use crate::task::validate_id;

const LOCK_EXT: &str = ".lock";

/// Longest accepted lock timeout, in hours (one year).
pub const MAX_TIMEOUT_HOURS: f64 = 8_760.0;

/// Converts a timeout in hours to a duration.
///
/// Returns `None` unless `hours` is finite, positive and at most
/// [`MAX_TIMEOUT_HOURS`].
#[must_use]
pub fn timeout_from_hours(hours: f64) -> Option<Duration> {
    if !hours.is_finite() || hours <= 0.0 || hours > MAX_TIMEOUT_HOURS {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = (hours * 3_600_000.0).round() as i64;
    Duration::try_milliseconds(millis)
}

fn max_timeout() -> Duration {
    Duration::hours(8_760)
}

/// Persisted lock record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Locked task.
    pub task_id: String,
    /// Opaque owner identity.
    pub owner: String,
    /// When the current owner first acquired the lock.
    pub acquired_at: DateTime<Utc>,
    /// Last proof of life from the owner.
    pub heartbeat_at: DateTime<Utc>,
    /// Idle time after which the lock is stale.
    pub timeout_hours: f64,
}

impl LockRecord {
    fn new(task_id: &str, owner: &str, now: DateTime<Utc>, timeout: Duration) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let timeout_hours = timeout.num_milliseconds() as f64 / 3_600_000.0;
        Self {
            task_id: task_id.to_string(),
            owner: owner.to_string(),
            acquired_at: now,
            heartbeat_at: now,
            timeout_hours,
        }
    }

    /// The timeout as a duration; zero when `timeout_hours` is out of
    /// range.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        timeout_from_hours(self.timeout_hours).unwrap_or_else(Duration::zero)
    }

    /// The instant after which the lock counts as stale, or `None` if it
    /// is past the representable range.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.heartbeat_at.checked_add_signed(self.timeout())
    }

    fn check(&self) -> std::result::Result<(), String> {
        if timeout_from_hours(self.timeout_hours).is_none() {
            return Err(format!(
                "timeout_hours must be in (0, {MAX_TIMEOUT_HOURS}], got {}",
                self.timeout_hours
            ));
        }
        if self.expires_at().is_none() {
            return Err(format!("heartbeat_at {} is out of range", self.heartbeat_at));
        }
        Ok(())
    }

    /// `true` once `now - heartbeat_at` exceeds the timeout.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.heartbeat_at > self.timeout()
    }
}

/// Liveness classification of a lock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// Heartbeat within timeout: the owner holds the task.
    Active,
    /// Heartbeat older than timeout: abandoned, reclaimable.
    Stale,
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            LockStatus::Active => "active",
            LockStatus::Stale => "stale",
        })
    }
}

/// Read-only view of a lock at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub struct LockInfo {
    /// The stored record.
    pub record: LockRecord,
    /// Active or stale, by the same rule `acquire` uses.
    pub status: LockStatus,
    /// Time since the lock was acquired.
    pub held_for: Duration,
    /// Time since the last heartbeat.
    pub idle_for: Duration,
}

impl LockInfo {
    fn at(record: LockRecord, now: DateTime<Utc>) -> Self {
        let status = if record.is_stale(now) { LockStatus::Stale } else { LockStatus::Active };
        Self {
            held_for: now - record.acquired_at,
            idle_for: now - record.heartbeat_at,
            status,
            record,
        }
    }

    /// `true` if the lock is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == LockStatus::Active
    }
}

enum Slot {
    Missing,
    Held(LockRecord),
    Unreadable(String),
}

/// Manages lock records under a store root.
pub struct LockManager<'a> {
    ctx: &'a ServiceContext,
    root: PathBuf,
}

impl<'a> LockManager<'a> {
    /// Creates a lock manager for the store at `root`.
    #[must_use]
    pub fn new(ctx: &'a ServiceContext, root: &Path) -> Self {
        Self { ctx, root: root.to_path_buf() }
    }

    /// Tries to take the lock on `task_id` for `owner` without blocking.
    ///
    /// Returns `false` if another owner holds an active lock. A stale or
    /// unreadable record is overwritten. Re-acquiring an active lock you
    /// already own refreshes its heartbeat and timeout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidId` / `PreconditionFailed` for unusable arguments
    /// (blank owner, timeout not in `(0, MAX_TIMEOUT_HOURS]`) and I/O errors
    /// from the filesystem.
    pub fn acquire(&self, task_id: &str, owner: &str, timeout: Duration) -> Result<bool> {
        validate_id(task_id)?;
        if owner.trim().is_empty() {
            return Err(Error::PreconditionFailed {
                task_id: task_id.to_string(),
                reason: "lock owner must not be empty".to_string(),
            });
        }
        if timeout <= Duration::zero() || timeout > max_timeout() {
            return Err(Error::PreconditionFailed {
                task_id: task_id.to_string(),
                reason: format!(
                    "lock timeout must be positive and at most {MAX_TIMEOUT_HOURS} hours"
                ),
            });
        }
        let path = self.lock_path(task_id);
        let now = self.ctx.clock.now();
        let record = LockRecord::new(task_id, owner, now, timeout);
        let json = serde_json::to_string_pretty(&record)?;

        // The second pass covers a holder releasing between our create
        // attempt and our read.
        for _ in 0..2 {
            if self.ctx.fs.create_new(&path, &json)? {
                log::info!("{owner} acquired lock on {task_id}");
                return Ok(true);
            }
            match self.read_slot(&path)? {
                Slot::Missing => continue,
                Slot::Held(existing) if existing.is_stale(now) => {
                    log::info!(
                        "{owner} reclaiming stale lock on {task_id} from {} (idle since {})",
                        existing.owner,
                        existing.heartbeat_at
                    );
                    return self.take_over(&path, &record);
                }
                Slot::Held(existing) if existing.owner == owner => {
                    let refreshed =
                        LockRecord { acquired_at: existing.acquired_at, ..record.clone() };
                    atomic_write(
                        self.ctx.fs.as_ref(),
                        &path,
                        &serde_json::to_string_pretty(&refreshed)?,
                    )?;
                    return Ok(true);
                }
                Slot::Held(existing) => {
                    log::debug!("{owner} lost race for {task_id}: held by {}", existing.owner);
                    return Ok(false);
                }
                Slot::Unreadable(reason) => {
                    log::warn!("replacing unreadable lock on {task_id}: {reason}");
                    return self.take_over(&path, &record);
                }
            }
        }
        Ok(false)
    }

    /// Refreshes the heartbeat if `owner` is still the recorded owner.
    ///
    /// Returns `false` when ownership was lost (released, forced, or taken
    /// over after going stale).
    ///
    /// # Errors
    ///
    /// Returns I/O or serialization errors.
    pub fn renew(&self, task_id: &str, owner: &str) -> Result<bool> {
        validate_id(task_id)?;
        let path = self.lock_path(task_id);
        match self.read_slot(&path)? {
            Slot::Held(mut record) if record.owner == owner => {
                record.heartbeat_at = self.ctx.clock.now().max(record.heartbeat_at);
                atomic_write(self.ctx.fs.as_ref(), &path, &serde_json::to_string_pretty(&record)?)?;
                log::debug!("{owner} renewed lock on {task_id}");
                Ok(true)
            }
            _ => {
                log::debug!("{owner} cannot renew {task_id}: not the owner");
                Ok(false)
            }
        }
    }

    /// Removes the lock if `owner` holds it; otherwise does nothing.
    ///
    /// Returns whether a lock was removed.
    ///
    /// # Errors
    ///
    /// Returns I/O errors.
    pub fn release(&self, task_id: &str, owner: &str) -> Result<bool> {
        validate_id(task_id)?;
        let path = self.lock_path(task_id);
        match self.read_slot(&path)? {
            Slot::Held(record) if record.owner == owner => {
                let removed = self.ctx.fs.remove(&path)?;
                if removed {
                    log::info!("{owner} released lock on {task_id}");
                }
                Ok(removed)
            }
            _ => Ok(false),
        }
    }

    /// Removes the lock whoever holds it.
    ///
    /// Breaks mutual exclusion, so it is always logged.
    /// Returns the displaced record when it was readable.
    ///
    /// # Errors
    ///
    /// Returns I/O errors.
    pub fn force_release(&self, task_id: &str) -> Result<Option<LockRecord>> {
        validate_id(task_id)?;
        let path = self.lock_path(task_id);
        let previous = match self.read_slot(&path)? {
            Slot::Missing => return Ok(None),
            Slot::Held(record) => Some(record),
            Slot::Unreadable(_) => None,
        };
        self.ctx.fs.remove(&path)?;
        match &previous {
            Some(record) => log::warn!(
                "force-released lock on {task_id} held by {} since {}",
                record.owner,
                record.acquired_at
            ),
            None => log::warn!("force-released unreadable lock on {task_id}"),
        }
        Ok(previous)
    }

    /// Inspects the lock on `task_id` without changing it.
    ///
    /// # Errors
    ///
    /// Returns `Corrupt` if the lock record exists but cannot be parsed,
    /// and I/O errors.
    pub fn status(&self, task_id: &str) -> Result<Option<LockInfo>> {
        validate_id(task_id)?;
        match self.read_slot(&self.lock_path(task_id))? {
            Slot::Missing => Ok(None),
            Slot::Held(record) => Ok(Some(LockInfo::at(record, self.ctx.clock.now()))),
            Slot::Unreadable(reason) => Err(Error::Corrupt { id: task_id.to_string(), reason }),
        }
    }

    /// Returns `true` if `owner` is the recorded owner, stale or not.
    ///
    /// A stale lock nobody has reclaimed still belongs to its owner.
    ///
    /// # Errors
    ///
    /// Same as [`LockManager::status`].
    pub fn is_held_by(&self, task_id: &str, owner: &str) -> Result<bool> {
        Ok(self.status(task_id)?.is_some_and(|info| info.record.owner == owner))
    }

    /// Lists every readable lock record, sorted by task id.
    ///
    /// # Errors
    ///
    /// Returns an error if the locks directory cannot be listed.
    pub fn list(&self) -> Result<Vec<LockInfo>> {
        let dir = self.locks_dir();
        if !self.ctx.fs.exists(&dir) {
            return Ok(Vec::new());
        }
        let now = self.ctx.clock.now();
        let mut locks = Vec::new();
        for name in self.ctx.fs.list_dir(&dir)? {
            let Some(task_id) = name.strip_suffix(LOCK_EXT) else { continue };
            if validate_id(task_id).is_err() {
                continue;
            }
            match self.read_slot(&dir.join(&name))? {
                Slot::Held(record) => locks.push(LockInfo::at(record, now)),
                Slot::Unreadable(reason) => log::warn!("skipping lock {task_id}: {reason}"),
                Slot::Missing => {}
            }
        }
        Ok(locks)
    }

    fn take_over(&self, path: &Path, record: &LockRecord) -> Result<bool> {
        atomic_write(self.ctx.fs.as_ref(), path, &serde_json::to_string_pretty(record)?)?;
        // Another reclaimer may have renamed over us; whoever reads back
        // their own record wins.
        match self.read_slot(path)? {
            Slot::Held(current) => {
                Ok(current.owner == record.owner && current.acquired_at == record.acquired_at)
            }
            _ => Ok(false),
        }
    }

    fn read_slot(&self, path: &Path) -> Result<Slot> {
        let contents = match self.ctx.fs.read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Slot::Missing),
            Err(e) => return Err(e.into()),
        };
        Ok(match serde_json::from_str::<LockRecord>(&contents) {
            Ok(record) => match record.check() {
                Ok(()) => Slot::Held(record),
                Err(reason) => Slot::Unreadable(reason),
            },
            Err(e) => Slot::Unreadable(e.to_string()),
        })
    }

    fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    fn lock_path(&self, task_id: &str) -> PathBuf {
        self.locks_dir().join(format!("{task_id}{LOCK_EXT}"))
    }
}
