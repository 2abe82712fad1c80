//! Service context bundling all port trait objects.

use crate::adapters::live::{LiveClock, LiveFileSystem, LiveIdGenerator};
use crate::adapters::memory::{ManualClock, MemoryFileSystem, SequentialIdGenerator};
use crate::ports::clock::Clock;
use crate::ports::filesystem::FileSystem;
use crate::ports::id_gen::IdGenerator;

/// Bundles all port trait objects into a single context.
///
/// Every store, lock and coordinator operation borrows one of these;
/// constructors wire up live or in-memory adapters.
pub struct ServiceContext {
    /// Clock for timestamps and lock staleness.
    pub clock: Box<dyn Clock>,
    /// Filesystem holding the shared store.
    pub fs: Box<dyn FileSystem>,
    /// ID generator for new tasks.
    pub id_gen: Box<dyn IdGenerator>,
}

impl ServiceContext {
    /// Creates a context from explicit adapters.
    #[must_use]
    pub fn new(
        clock: Box<dyn Clock>,
        fs: Box<dyn FileSystem>,
        id_gen: Box<dyn IdGenerator>,
    ) -> Self {
        Self { clock, fs, id_gen }
    }

    /// Creates a live context: system clock, real disk, random ids.
    #[must_use]
    pub fn live() -> Self {
        Self::new(Box::new(LiveClock), Box::new(LiveFileSystem), Box::new(LiveIdGenerator::new()))
    }

    /// Creates an in-memory context driven by `clock`, with sequential ids.
    #[must_use]
    pub fn in_memory(clock: ManualClock) -> Self {
        Self::new(
            Box::new(clock),
            Box::new(MemoryFileSystem::new()),
            Box::new(SequentialIdGenerator::new()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use std::path::Path;

    #[test]
    fn in_memory_context_follows_the_manual_clock() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let ctx = ServiceContext::in_memory(clock.clone());

        clock.advance(Duration::minutes(1));

        assert_eq!(ctx.clock.now(), start + Duration::minutes(1));
        assert_eq!(ctx.id_gen.generate_id(), "t-0001");
        assert!(!ctx.fs.exists(Path::new("/anything")));
    }
}
