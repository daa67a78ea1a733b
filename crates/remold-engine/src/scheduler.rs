//! Cycle scheduling and fixed-point convergence.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashSet;
use indexmap::IndexMap;
use remold_recipe::{ExecutionContext, Recipe, RecipeError, RecipeIdentity};
use remold_tree::SourceFile;

use crate::cycle::{AccumulatorRegistry, RecipeRunCycle};
use crate::error::EngineError;
use crate::executor::{InlineExecutor, TaskExecutor};
use crate::result::{RecipeRun, RunStats, SourceResult};
use crate::source_set::{Changeset, LargeSourceSet};
use crate::tables::{source_file_errors, SourceFileErrorRow};

/// Cycle bounds for one run.
#[derive(Clone, Copy, Debug)]
pub struct RunOptions {
    /// Hard upper bound on cycles.
    pub max_cycles: usize,
    /// Cycles to run before the convergence check may stop the run. Two
    /// cycles catch recipes that are not idempotent on their first pass.
    pub min_cycles: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_cycles: 3,
            min_cycles: 2,
        }
    }
}

/// Mutable state shared by all cycles of one run.
#[derive(Debug)]
pub struct RunState {
    deadline: Instant,
    timed_out: AtomicBool,
    validated: DashSet<RecipeIdentity>,
    invalid: DashSet<RecipeIdentity>,
    reported: DashSet<String>,
}

impl RunState {
    /// State for a run whose wall-clock budget expires at `deadline`.
    #[must_use]
    pub fn new(deadline: Instant) -> Self {
        Self {
            deadline,
            timed_out: AtomicBool::new(false),
            validated: DashSet::new(),
            invalid: DashSet::new(),
            reported: DashSet::new(),
        }
    }

    /// Cooperative timeout check, consulted before each edit-phase file
    /// task. Scans and generation still run on an exhausted budget, so
    /// accumulated state is never half-built. The first task past the
    /// deadline fires the error and timeout hooks; every later task just
    /// passes its file through unchanged.
    pub fn deadline_exceeded(&self, ctx: &ExecutionContext) -> bool {
        if Instant::now() <= self.deadline {
            return false;
        }
        if !self.timed_out.swap(true, Ordering::AcqRel) {
            let error = RecipeError::Timeout(ctx.run_timeout());
            tracing::warn!(%error, "run exceeded its wall-clock budget");
            ctx.on_error()(&error);
            ctx.on_timeout()(&error, ctx);
        }
        true
    }

    /// Whether the run's budget was exceeded at any point.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }

    /// Validate `recipe` once per identity; invalid recipes are disabled
    /// for the rest of the run.
    pub fn ensure_valid(&self, recipe: &dyn Recipe, ctx: &ExecutionContext) -> bool {
        let identity = recipe.identity();
        if self.validated.insert(identity.clone()) {
            let validated = recipe.validate(ctx);
            if !validated.is_valid() {
                tracing::warn!(
                    recipe = %recipe.name(),
                    failures = validated.failures().len(),
                    "recipe failed validation and will not run"
                );
                self.invalid.insert(identity.clone());
            }
        }
        !self.invalid.contains(&identity)
    }

    /// Report a contained failure. Fires the error hook and inserts a
    /// diagnostic row only the first time this (file, recipe, message)
    /// combination is seen; returns whether it was new.
    pub fn report_error(
        &self,
        ctx: &ExecutionContext,
        path: &str,
        recipe: &str,
        error: &RecipeError,
    ) -> bool {
        let key = format!("{path}|{recipe}|{error}");
        if !self.reported.insert(key) {
            return false;
        }
        tracing::warn!(source_path = path, recipe, %error, "recipe failure contained");
        ctx.on_error()(error);
        source_file_errors().insert_row(
            ctx,
            &SourceFileErrorRow {
                source_path: path.to_string(),
                recipe: recipe.to_string(),
                error: error.to_string(),
            },
        );
        true
    }
}

/// Drives a recipe over a source set until the fixed point.
///
/// A run converges when an entire cycle hands back the same source-set
/// storage it was given and no new context messages were stored. Recipes
/// that return [`Recipe::causes_another_cycle`] keep the run going past
/// `min_cycles` until convergence or `max_cycles`.
pub struct RecipeScheduler {
    executor: Arc<dyn TaskExecutor>,
}

impl RecipeScheduler {
    /// Scheduler running file work inline on the calling thread. Use
    /// [`RecipeScheduler::with_executor`] with a
    /// [`crate::RayonExecutor`] for parallel dispatch.
    #[must_use]
    pub fn new() -> Self {
        Self::with_executor(Arc::new(InlineExecutor))
    }

    /// Scheduler with an explicit executor.
    #[must_use]
    pub fn with_executor(executor: Arc<dyn TaskExecutor>) -> Self {
        Self { executor }
    }

    /// Run `recipe` over `before` to its fixed point.
    ///
    /// # Errors
    /// Engine-level failures only; recipe failures are contained per
    /// file and reported through the context hooks and data tables.
    pub fn schedule_run(
        &self,
        recipe: &Arc<dyn Recipe>,
        before: Vec<Arc<dyn SourceFile>>,
        ctx: &ExecutionContext,
        options: RunOptions,
    ) -> Result<RecipeRun, EngineError> {
        let started = Instant::now();
        let state = RunState::new(started + ctx.run_timeout());
        let registry = AccumulatorRegistry::new();
        let mut sources = LargeSourceSet::from_files(before);
        let mut stats = RunStats::default();

        let mut cycle = 0usize;
        while cycle < options.max_cycles {
            cycle += 1;
            ctx.begin_cycle(cycle);
            tracing::debug!(cycle, "starting cycle");

            let mut pass =
                RecipeRunCycle::new(recipe, cycle, &registry, self.executor.as_ref(), &state);
            let scanned = pass.scan_sources(&sources, ctx);
            let generated = pass.generate_sources(&scanned, ctx);
            let edited = pass.edit_sources(&generated, ctx);
            stats.cycles.push(pass.stats());

            let new_messages = ctx.take_new_messages();
            let converged = edited.same_storage(&sources) && !new_messages;
            sources = edited;

            if cycle >= options.min_cycles && (converged || !recipe.causes_another_cycle()) {
                break;
            }
        }
        stats.duration = started.elapsed();

        let (changes, unexplained) = sources.changeset();
        let skip: HashSet<String> = unexplained
            .into_iter()
            .map(|change| {
                tracing::error!(
                    path = %change.path,
                    "source changed without any recipe claiming the change"
                );
                source_file_errors().insert_row(
                    ctx,
                    &SourceFileErrorRow {
                        source_path: change.path.clone(),
                        recipe: String::new(),
                        error: EngineError::MissingProvenance {
                            path: change.path.clone(),
                        }
                        .to_string(),
                    },
                );
                change.path
            })
            .collect();

        let results = assemble_results(changes, &skip)?;

        let data_tables: IndexMap<String, Vec<serde_json::Value>> = ctx
            .data_tables()
            .snapshot()
            .into_iter()
            .map(|(descriptor, rows)| (descriptor.name, rows))
            .collect();

        Ok(RecipeRun::new(results, data_tables, stats))
    }
}

impl Default for RecipeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn changeset rows into results, dropping the paths already flagged
/// as unexplained. The filter runs before construction so a flagged edit
/// never trips the missing-provenance check and aborts the run.
fn assemble_results(
    changes: Vec<Changeset>,
    skip: &HashSet<String>,
) -> Result<Vec<SourceResult>, EngineError> {
    let mut results = Vec::with_capacity(changes.len());
    for change in changes {
        if skip.contains(&change.path()) {
            continue;
        }
        results.push(SourceResult::from_changeset(change)?);
    }
    Ok(results)
}
