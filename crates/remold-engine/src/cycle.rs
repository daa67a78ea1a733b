//! One scan → generate → edit pass over all source files.
//!
//! Phases are barriers: no edit starts before every scan of the cycle has
//! finished. Within the scan and edit phases, per-file work is dispatched
//! through the run's [`TaskExecutor`]; the generate phase is consulted
//! once per recipe, sequentially.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::DashMap;
use remold_recipe::{
    Accumulator, ExecutionContext, Recipe, RecipeError, RecipeIdentity, ScanningRecipe,
    VisitOutcome,
};
use remold_tree::{same_file, Cursor, SourceFile};

use crate::executor::{map_concurrently, TaskExecutor};
use crate::provenance::ProvenanceStack;
use crate::result::CycleStats;
use crate::scheduler::RunState;
use crate::source_set::{LargeSourceSet, SourceEntry, VisitFailure};
use crate::stack::{expand_recipe_stacks, RecipeStack};
use crate::tables::{source_file_results, SourceFileResultRow};

/// Run-scoped store of scanning accumulators, keyed by recipe identity.
///
/// Created fresh for each run; two recipe instances share an accumulator
/// only when their identities compare equal.
#[derive(Debug, Default)]
pub struct AccumulatorRegistry {
    accumulators: DashMap<RecipeIdentity, Accumulator>,
}

impl AccumulatorRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The accumulator for `recipe`, created on first use.
    #[must_use]
    pub fn accumulator_for(&self, recipe: &dyn ScanningRecipe) -> Accumulator {
        self.accumulators
            .entry(recipe.identity())
            .or_insert_with(|| recipe.initial_accumulator())
            .clone()
    }
}

/// What one file task decided during the edit phase.
enum FileEdit {
    Keep,
    Replace(Arc<dyn SourceFile>),
    Remove,
    Fail(RecipeError),
}

/// One cycle's worth of execution over a flattened recipe tree.
pub struct RecipeRunCycle<'a> {
    cycle: usize,
    registry: &'a AccumulatorRegistry,
    executor: &'a dyn TaskExecutor,
    state: &'a RunState,
    cursor_root: Arc<Cursor>,
    stacks: Vec<RecipeStack>,
    stats: CycleStats,
}

impl<'a> RecipeRunCycle<'a> {
    /// Flatten the recipe tree and prepare a cycle.
    #[must_use]
    pub fn new(
        root: &Arc<dyn Recipe>,
        cycle: usize,
        registry: &'a AccumulatorRegistry,
        executor: &'a dyn TaskExecutor,
        state: &'a RunState,
    ) -> Self {
        Self {
            cycle,
            registry,
            executor,
            state,
            cursor_root: Cursor::root(),
            stacks: expand_recipe_stacks(root),
            stats: CycleStats {
                cycle,
                ..CycleStats::default()
            },
        }
    }

    /// Counters gathered so far this cycle.
    #[must_use]
    pub fn stats(&self) -> CycleStats {
        self.stats.clone()
    }

    fn skip_stack(&self, stack: &RecipeStack, ctx: &ExecutionContext) -> bool {
        if stack.recipe().max_cycles() < self.cycle {
            return true;
        }
        // Validation walks the stack root-first, so a parent that fails
        // validation disables its whole subtree before any phase, scan
        // and generate included, touches it.
        stack
            .recipes()
            .iter()
            .any(|r| !self.state.ensure_valid(r.as_ref(), ctx))
    }

    /// Run every scanning recipe's scanner over every acceptable file.
    ///
    /// Scanner return values are discarded; the only scan output is
    /// accumulator mutation. The input set flows through untouched.
    pub fn scan_sources(&mut self, before: &LargeSourceSet, ctx: &ExecutionContext) -> LargeSourceSet {
        for stack in &self.stacks {
            let recipe = stack.recipe();
            let Some(scanning) = recipe.as_scanning() else {
                continue;
            };
            if self.skip_stack(stack, ctx) {
                continue;
            }
            ctx.cycle().set_current_position(stack.position());
            let acc = self.registry.accumulator_for(scanning);
            let name = recipe.name();

            let failures: Vec<Option<(String, RecipeError)>> = {
                let cursor_root = &self.cursor_root;
                map_concurrently(self.executor, before.entries(), |entry| {
                    let scanner = scanning.scanner(&acc);
                    if !scanner.is_acceptable(entry.file().as_ref(), ctx) {
                        return None;
                    }
                    let cursor = cursor_root.child(entry.file().id());
                    let visited = catch_unwind(AssertUnwindSafe(|| {
                        scanner.visit(entry.file(), ctx, &cursor)
                    }));
                    let path = entry.file().source_path().display().to_string();
                    match visited {
                        Ok(Ok(_)) => None,
                        Ok(Err(error)) => Some((path, error)),
                        Err(payload) => Some((path, panic_error(payload))),
                    }
                })
            };

            for (path, error) in failures.into_iter().flatten() {
                if self.state.report_error(ctx, &path, &name, &error) {
                    self.stats.failures += 1;
                }
            }
        }
        before.clone()
    }

    /// Give every scanning recipe the chance to produce brand-new files.
    pub fn generate_sources(
        &mut self,
        before: &LargeSourceSet,
        ctx: &ExecutionContext,
    ) -> LargeSourceSet {
        let mut generated = Vec::new();
        for stack in &self.stacks {
            let recipe = stack.recipe();
            let Some(scanning) = recipe.as_scanning() else {
                continue;
            };
            if self.skip_stack(stack, ctx) {
                continue;
            }
            ctx.cycle().set_current_position(stack.position());
            let acc = self.registry.accumulator_for(scanning);
            let name = recipe.name();
            let by = ProvenanceStack::of(stack);

            let outcome = catch_unwind(AssertUnwindSafe(|| scanning.generate(&acc, ctx)));
            match outcome {
                Ok(Ok(files)) => {
                    for file in files {
                        ctx.cycle().record_change(recipe.identity(), &name);
                        self.stats.generated += 1;
                        generated.push(SourceEntry::generated(file, by.clone()));
                    }
                }
                Ok(Err(error)) => {
                    if self.state.report_error(ctx, "", &name, &error) {
                        self.stats.failures += 1;
                    }
                }
                Err(payload) => {
                    let error = panic_error(payload);
                    if self.state.report_error(ctx, "", &name, &error) {
                        self.stats.failures += 1;
                    }
                }
            }
        }
        before.generate(generated)
    }

    /// Run every recipe's editor over every acceptable file, stack by
    /// stack in pre-order, files in parallel within a stack.
    pub fn edit_sources(&mut self, before: &LargeSourceSet, ctx: &ExecutionContext) -> LargeSourceSet {
        let mut current: Vec<SourceEntry> = before.entries().to_vec();
        let mut newly_deleted: Vec<SourceEntry> = Vec::new();
        let mut any_changed = false;

        for stack in &self.stacks {
            if ctx.is_panicked() {
                tracing::warn!(cycle = self.cycle, "halting edit phase on panic request");
                break;
            }
            let recipe = stack.recipe();
            if self.skip_stack(stack, ctx) {
                continue;
            }
            ctx.cycle().set_current_position(stack.position());

            let name = recipe.name();
            let identity = recipe.identity();
            let by = ProvenanceStack::of(stack);
            let acc = recipe.as_scanning().map(|s| self.registry.accumulator_for(s));

            let edits: Vec<FileEdit> = {
                let cursor_root = &self.cursor_root;
                let state = self.state;
                let acc = &acc;
                map_concurrently(self.executor, &current, |entry| {
                    if state.deadline_exceeded(ctx) {
                        return FileEdit::Keep;
                    }
                    let editor = match (recipe.as_scanning(), acc) {
                        (Some(scanning), Some(acc)) => scanning.editor(acc),
                        _ => recipe.visitor(),
                    };
                    if !editor.is_acceptable(entry.file().as_ref(), ctx) {
                        return FileEdit::Keep;
                    }
                    let cursor = cursor_root.child(entry.file().id());
                    let visited = catch_unwind(AssertUnwindSafe(|| {
                        editor.visit(entry.file(), ctx, &cursor)
                    }));
                    match visited {
                        Ok(Ok(VisitOutcome::Unchanged)) => FileEdit::Keep,
                        Ok(Ok(VisitOutcome::Changed(file))) => {
                            if same_file(&file, entry.file()) {
                                FileEdit::Keep
                            } else {
                                FileEdit::Replace(file)
                            }
                        }
                        Ok(Ok(VisitOutcome::Deleted)) => FileEdit::Remove,
                        Ok(Err(error)) => FileEdit::Fail(error),
                        Err(payload) => FileEdit::Fail(panic_error(payload)),
                    }
                })
            };

            let mut next = Vec::with_capacity(current.len());
            let mut stack_changed = false;
            for (entry, edit) in current.iter().zip(edits) {
                match edit {
                    FileEdit::Keep => next.push(entry.clone()),
                    FileEdit::Replace(file) => {
                        ctx.cycle().record_change(identity.clone(), &name);
                        source_file_results().insert_row(
                            ctx,
                            &SourceFileResultRow {
                                source_path: file.source_path().display().to_string(),
                                recipe: name.clone(),
                                cycle: self.cycle,
                            },
                        );
                        self.stats.edits += 1;
                        next.push(entry.edited(file, &by));
                        stack_changed = true;
                    }
                    FileEdit::Remove => {
                        ctx.cycle().record_change(identity.clone(), &name);
                        self.stats.deleted += 1;
                        // A file generated and deleted in the same run
                        // never existed; discard it silently.
                        if entry.generated_by().is_none() {
                            newly_deleted.push(entry.claimed(&by));
                        }
                        stack_changed = true;
                    }
                    FileEdit::Fail(error) => {
                        let path = entry.file().source_path().display().to_string();
                        if self.state.report_error(ctx, &path, &name, &error) {
                            self.stats.failures += 1;
                            next.push(entry.with_failure(VisitFailure {
                                recipe: name.clone(),
                                message: error.to_string(),
                            }));
                            stack_changed = true;
                        } else {
                            next.push(entry.clone());
                        }
                    }
                }
            }

            if stack_changed {
                current = next;
                any_changed = true;
            }
        }

        before.with_entries(current, newly_deleted, any_changed)
    }
}

fn panic_error(payload: Box<dyn std::any::Any + Send>) -> RecipeError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "opaque panic payload".to_string());
    RecipeError::Panicked(message)
}
