//! Remold recipe model
//!
//! A recipe is a named, possibly-parameterized transformation unit. It
//! produces a [`FileVisitor`] and optionally a list of child recipes that
//! are scheduled depth-first after it. Scanning recipes additionally carry
//! a per-run accumulator driven through an explicit scan → generate → edit
//! lifecycle.
//!
//! # Core Concepts
//!
//! - [`Recipe`]: the transformation unit contract
//! - [`ScanningRecipe`]: accumulator-carrying recipe variant
//! - [`FileVisitor`] / [`VisitOutcome`]: the per-file transform contract
//! - [`ExecutionContext`]: run-scoped typed message bus
//! - [`Validated`]: option-validation combinators gating execution
//! - [`DataTable`]: append-only tabular diagnostics
//! - [`RunOnce`], [`Singleton`], [`Unique`]: idempotence/uniqueness guards

mod composite;
mod context;
mod data_table;
mod error;
mod precondition;
mod recipe;
mod scanning;
mod validate;
mod visitor;

pub use composite::CompositeRecipe;
pub use context::{CycleState, ErrorHandler, ExecutionContext, TimeoutHandler, PANIC, RUN_TIMEOUT};
pub use data_table::{DataTable, DataTableDescriptor, DataTableStore};
pub use error::RecipeError;
pub use precondition::{RunOnce, Singleton, Unique};
pub use recipe::{Recipe, RecipeDescriptor, RecipeIdentity};
pub use scanning::{Accumulator, ScanningRecipe};
pub use validate::Validated;
pub use visitor::{from_fn, FileVisitor, FnVisitor, NoopVisitor, VisitOutcome};
