//! ID generator port for producing task identifiers.

/// Generates identifiers for new tasks.
///
/// Returned ids must be valid record names (see [`crate::task::validate_id`]).
pub trait IdGenerator: Send + Sync {
    /// Generates a new unique identifier string.
    fn generate_id(&self) -> String;
}
