//! Scanning recipes: scan → generate → edit.

use crate::context::ExecutionContext;
use crate::error::RecipeError;
use crate::recipe::Recipe;
use crate::visitor::FileVisitor;
use remold_tree::SourceFile;
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Type-erased scanning accumulator.
///
/// Created once per run per recipe identity and shared across all files
/// and phases, so scan-phase writes happen concurrently: the underlying
/// type must use concurrency-safe collections, and writes should be
/// order-independent (set/map insertion).
#[derive(Clone)]
pub struct Accumulator(Arc<dyn Any + Send + Sync>);

impl Accumulator {
    /// Wrap an accumulator value.
    #[must_use]
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Recover the concrete accumulator type.
    ///
    /// # Errors
    /// [`RecipeError::AccumulatorType`] when the stored value is of a
    /// different type, which means two distinct recipes share an
    /// identity by mistake.
    pub fn downcast<T: Any + Send + Sync>(&self, recipe: &str) -> Result<Arc<T>, RecipeError> {
        Arc::clone(&self.0)
            .downcast::<T>()
            .map_err(|_| RecipeError::AccumulatorType(recipe.to_string()))
    }
}

impl Debug for Accumulator {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("Accumulator(..)")
    }
}

/// A recipe with an explicit read/accumulate → generate/edit lifecycle.
///
/// Phase contract, enforced by the engine each cycle:
/// 1. **scan**: the scanner visits every acceptable file; its return
///    value is discarded, and its only output is mutation of the
///    accumulator.
/// 2. **generate**: consulted once (not per file) to produce brand-new
///    source files.
/// 3. **edit**: the editor transforms files like an ordinary visitor,
///    with the accumulator available read-only.
pub trait ScanningRecipe: Recipe {
    /// Fresh accumulator for a new run.
    fn initial_accumulator(&self) -> Accumulator;

    /// Visitor run during the scan phase. Must not transform the tree.
    fn scanner(&self, acc: &Accumulator) -> Box<dyn FileVisitor>;

    /// Produce brand-new source files from the scanned state.
    ///
    /// # Errors
    /// Contained by the engine like any visitor failure.
    fn generate(
        &self,
        _acc: &Accumulator,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<Arc<dyn SourceFile>>, RecipeError> {
        Ok(Vec::new())
    }

    /// Visitor run during the edit phase.
    fn editor(&self, acc: &Accumulator) -> Box<dyn FileVisitor>;
}
