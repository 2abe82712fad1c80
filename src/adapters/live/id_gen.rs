//! Live adapter for the `IdGenerator` port.

use uuid::Uuid;

use crate::ports::IdGenerator;

/// Live ID generator producing short random task ids like `t-1a2b3c4d5e`.
pub struct LiveIdGenerator;

impl LiveIdGenerator {
    /// Creates a new live ID generator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for LiveIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for LiveIdGenerator {
    fn generate_id(&self) -> String {
        let hex = Uuid::new_v4().simple().to_string();
        format!("t-{}", &hex[..10])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::validate_id;

    #[test]
    fn generates_unique_valid_ids() {
        let gen = LiveIdGenerator::new();
        let id1 = gen.generate_id();
        let id2 = gen.generate_id();

        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 12);
        assert!(validate_id(&id1).is_ok());
    }
}
