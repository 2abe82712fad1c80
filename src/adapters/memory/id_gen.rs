//! Predictable id sequence.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::ports::IdGenerator;

/// Generates `t-0001`, `t-0002`, ...
#[derive(Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Creates a generator starting at `t-0001`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("t-{n:04}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_up() {
        let gen = SequentialIdGenerator::new();
        assert_eq!(gen.generate_id(), "t-0001");
        assert_eq!(gen.generate_id(), "t-0002");
    }
}
