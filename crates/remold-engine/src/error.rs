//! Engine-level errors.

use remold_recipe::RecipeError;

/// Failures surfaced by the engine itself, as opposed to failures raised
/// by recipe code (which arrive as [`RecipeError`] and are contained).
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// A source changed between snapshots without any recipe claiming the
    /// change. Indicates a recipe mutated a tree without reporting it.
    #[error("source '{path}' changed but no recipe claimed the change")]
    MissingProvenance {
        /// Path of the unexplained change.
        path: String,
    },

    /// A contained recipe failure, re-wrapped for callers that want one
    /// error type.
    #[error(transparent)]
    Recipe(#[from] RecipeError),
}
