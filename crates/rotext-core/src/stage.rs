use crate::error::Result;
use crate::state::ProcessingState;

/// A reversible pipeline transform.
///
/// `apply` and `invert` consume the state and hand it back transformed.
/// Anything `invert` needs beyond the token sequence is written to the
/// metadata under [`key`](Stage::key) during `apply`, unless the state is
/// lossy, in which case `invert` must leave the state untouched.
pub trait Stage: Send + Sync {
    /// Human-readable name, reported when the stage fails.
    fn name(&self) -> &str;

    /// Metadata key. Unique within a pipeline.
    fn key(&self) -> &str {
        self.name()
    }

    fn apply(&self, state: ProcessingState) -> Result<ProcessingState>;

    fn invert(&self, state: ProcessingState) -> Result<ProcessingState>;
}
