//! Error types for the recipe model.

use std::time::Duration;

/// Failures raised by recipes and their visitors.
///
/// These are contained by the engine at (recipe, file) granularity; they
/// never abort a run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RecipeError {
    /// Recipe options failed validation.
    #[error("invalid recipe configuration: {0}")]
    InvalidConfiguration(String),

    /// A visitor reported a failure while transforming one file.
    #[error("visit failed: {0}")]
    Visit(String),

    /// A scanning recipe's accumulator held an unexpected type.
    #[error("accumulator type mismatch for recipe '{0}'")]
    AccumulatorType(String),

    /// A visitor panicked; the payload is the panic message when printable.
    #[error("visitor panicked: {0}")]
    Panicked(String),

    /// The run exceeded its wall-clock budget.
    #[error("run exceeded timeout budget of {0:?}")]
    Timeout(Duration),
}

impl RecipeError {
    /// Convenience constructor for visitor failures.
    pub fn visit(message: impl Into<String>) -> Self {
        Self::Visit(message.into())
    }
}
