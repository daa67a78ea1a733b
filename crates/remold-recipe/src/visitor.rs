//! The per-file transform contract.

use crate::context::ExecutionContext;
use crate::error::RecipeError;
use remold_tree::{Cursor, SourceFile};
use std::sync::Arc;

/// Outcome of visiting one source file.
///
/// Deletion is a first-class variant rather than a null sentinel, so the
/// deletion path is type-checked.
#[derive(Debug, Clone)]
pub enum VisitOutcome {
    /// The file was left as-is. The engine keeps the original reference.
    Unchanged,
    /// The file was transformed; the replacement should preserve the
    /// original's id.
    Changed(Arc<dyn SourceFile>),
    /// The file should be removed from the source set.
    Deleted,
}

impl VisitOutcome {
    /// Whether the visit left the file untouched.
    #[inline]
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

/// An opaque per-file transform plus a cheap pre-filter.
///
/// Visitors are fetched fresh for each (recipe, file) pair and must be
/// safe to build and run concurrently with other files' visitors.
pub trait FileVisitor: Send + Sync {
    /// Cheap filter run before [`FileVisitor::visit`]; visitors that only
    /// apply to certain files should reject the rest here.
    fn is_acceptable(&self, _file: &dyn SourceFile, _ctx: &ExecutionContext) -> bool {
        true
    }

    /// Transform one file.
    fn visit(
        &self,
        file: &Arc<dyn SourceFile>,
        ctx: &ExecutionContext,
        cursor: &Arc<Cursor>,
    ) -> Result<VisitOutcome, RecipeError>;
}

/// A visitor that never changes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopVisitor;

impl FileVisitor for NoopVisitor {
    fn visit(
        &self,
        _file: &Arc<dyn SourceFile>,
        _ctx: &ExecutionContext,
        _cursor: &Arc<Cursor>,
    ) -> Result<VisitOutcome, RecipeError> {
        Ok(VisitOutcome::Unchanged)
    }
}

/// Adapter turning a closure into a [`FileVisitor`].
pub struct FnVisitor<F> {
    f: F,
}

impl<F> FileVisitor for FnVisitor<F>
where
    F: Fn(&Arc<dyn SourceFile>, &ExecutionContext) -> Result<VisitOutcome, RecipeError>
        + Send
        + Sync,
{
    fn visit(
        &self,
        file: &Arc<dyn SourceFile>,
        ctx: &ExecutionContext,
        _cursor: &Arc<Cursor>,
    ) -> Result<VisitOutcome, RecipeError> {
        (self.f)(file, ctx)
    }
}

/// Box a closure as a [`FileVisitor`].
pub fn from_fn<F>(f: F) -> Box<dyn FileVisitor>
where
    F: Fn(&Arc<dyn SourceFile>, &ExecutionContext) -> Result<VisitOutcome, RecipeError>
        + Send
        + Sync
        + 'static,
{
    Box::new(FnVisitor { f })
}
