//! Remold engine
//!
//! The recipe scheduling and cycle-convergence core: takes a root
//! [`remold_recipe::Recipe`] plus a set of immutable source files and
//! drives scan → generate → edit cycles to a fixed point, with per-file
//! error containment, cooperative timeout enforcement, and provenance
//! tracking of who changed what.
//!
//! # Core Concepts
//!
//! - [`RecipeScheduler`]: drives cycles until convergence or `max_cycles`
//! - [`RecipeRunCycle`]: one scan/generate/edit pass over all files
//! - [`LargeSourceSet`]: reference-preserving collection of source files
//! - [`SourceResult`] / [`RecipeRun`]: the assembled change set
//! - [`TaskExecutor`]: pluggable per-file parallelism
//!
//! Convergence is reference equality of the whole collection (unchanged
//! files flow through cycles as the same allocation) combined with the
//! absence of new context messages.

mod cycle;
mod diff;
mod error;
mod executor;
mod provenance;
mod result;
mod scheduler;
mod source_set;
mod stack;
mod tables;

pub use cycle::{AccumulatorRegistry, RecipeRunCycle};
pub use error::EngineError;
pub use executor::{map_concurrently, InlineExecutor, RayonExecutor, TaskExecutor};
pub use provenance::{Provenance, ProvenanceStack};
pub use result::{ChangeKind, CycleStats, RecipeRun, RunStats, SourceResult};
pub use scheduler::{RecipeScheduler, RunOptions, RunState};
pub use source_set::{Changeset, LargeSourceSet, SourceEntry, UnexplainedChange, VisitFailure};
pub use stack::RecipeStack;
pub use tables::{
    source_file_errors, source_file_results, SourceFileErrorRow, SourceFileResultRow,
};
