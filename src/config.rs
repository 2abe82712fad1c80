//! Store configuration and process identity.
//!
//! Settings live in `<root>/config.yaml`; every field is optional. The
//! store root and the owner identity come from CLI flags, then the
//! environment (`TASKLOCK_DIR`, `TASKLOCK_OWNER`), then defaults.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::context::ServiceContext;
use crate::error::{Error, Result};
use crate::lock::{timeout_from_hours, MAX_TIMEOUT_HOURS};
use crate::task::{Priority, TaskState};

/// Environment variable naming the store root.
pub const DIR_ENV: &str = "TASKLOCK_DIR";
/// Environment variable naming this process's owner identity.
pub const OWNER_ENV: &str = "TASKLOCK_OWNER";
/// Store root used when nothing else is configured.
pub const DEFAULT_DIR: &str = ".tasks";

/// Per-store settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Heartbeat idle time after which a lock is stale.
    pub lock_timeout_hours: f64,
    /// Priority for new tasks that do not specify one.
    pub default_priority: Priority,
    /// State for new tasks that do not specify one.
    pub default_state: TaskState,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout_hours: 4.0,
            default_priority: Priority::Medium,
            default_state: TaskState::Todo,
        }
    }
}

impl Config {
    /// Loads `<root>/config.yaml`, falling back to defaults when absent.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file exists but is unreadable, unparsable or
    /// invalid.
    pub fn load(ctx: &ServiceContext, root: &Path) -> Result<Self> {
        let path = Self::path(root);
        if !ctx.fs.exists(&path) {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = ctx
            .fs
            .read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Checks the settings for values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `Config` describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if timeout_from_hours(self.lock_timeout_hours).is_none() {
            return Err(Error::Config(format!(
                "lock_timeout_hours must be positive and at most {MAX_TIMEOUT_HOURS}, got {}",
                self.lock_timeout_hours
            )));
        }
        if !matches!(self.default_state, TaskState::Backlog | TaskState::Todo | TaskState::Someday)
        {
            return Err(Error::Config(format!(
                "default_state must be backlog, todo or someday, got {}",
                self.default_state
            )));
        }
        Ok(())
    }

    /// The lock timeout as a duration; zero if the setting fails
    /// [`Config::validate`].
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        timeout_from_hours(self.lock_timeout_hours).unwrap_or_else(Duration::zero)
    }

    /// Location of the config file for a store.
    #[must_use]
    pub fn path(root: &Path) -> PathBuf {
        root.join("config.yaml")
    }
}

/// Resolves the store root: explicit flag, `TASKLOCK_DIR`, then `.tasks`.
#[must_use]
pub fn resolve_root(flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf).unwrap_or_else(|| {
        std::env::var(DIR_ENV).map_or_else(|_| PathBuf::from(DEFAULT_DIR), PathBuf::from)
    })
}

/// Resolves the owner identity: explicit flag, `TASKLOCK_OWNER`, then
/// `pid-<pid>`.
#[must_use]
pub fn resolve_owner(flag: Option<&str>) -> String {
    flag.map(String::from)
        .or_else(|| std::env::var(OWNER_ENV).ok().filter(|o| !o.trim().is_empty()))
        .unwrap_or_else(|| format!("pid-{}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::ManualClock;
    use chrono::Utc;

    fn ctx() -> ServiceContext {
        ServiceContext::in_memory(ManualClock::new(Utc::now()))
    }

    #[test]
    fn missing_file_gives_defaults() {
        let ctx = ctx();
        let config = Config::load(&ctx, Path::new("/store")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.lock_timeout(), Duration::hours(4));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let ctx = ctx();
        ctx.fs.write(Path::new("/store/config.yaml"), "lock_timeout_hours: 0.5\n").unwrap();

        let config = Config::load(&ctx, Path::new("/store")).unwrap();
        assert_eq!(config.lock_timeout(), Duration::minutes(30));
        assert_eq!(config.default_priority, Priority::Medium);
    }

    #[test]
    fn rejects_non_positive_timeout() {
        let ctx = ctx();
        ctx.fs.write(Path::new("/store/config.yaml"), "lock_timeout_hours: 0\n").unwrap();
        assert!(matches!(Config::load(&ctx, Path::new("/store")), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_timeout_beyond_a_year() {
        let ctx = ctx();
        ctx.fs.write(Path::new("/store/config.yaml"), "lock_timeout_hours: 1e10\n").unwrap();
        assert!(matches!(Config::load(&ctx, Path::new("/store")), Err(Error::Config(_))));

        let year = Config { lock_timeout_hours: MAX_TIMEOUT_HOURS, ..Config::default() };
        assert!(year.validate().is_ok());
        assert_eq!(year.lock_timeout(), Duration::hours(8_760));
    }

    #[test]
    fn rejects_active_default_state() {
        let config = Config { default_state: TaskState::Active, ..Config::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_garbage() {
        let ctx = ctx();
        ctx.fs.write(Path::new("/store/config.yaml"), "lock_timeout_hours: [").unwrap();
        assert!(matches!(Config::load(&ctx, Path::new("/store")), Err(Error::Config(_))));
    }

    #[test]
    fn explicit_flags_win() {
        assert_eq!(resolve_root(Some(Path::new("/work/tasks"))), PathBuf::from("/work/tasks"));
        assert_eq!(resolve_owner(Some("agent-3")), "agent-3");
    }
}
