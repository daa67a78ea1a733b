//! Idempotence and uniqueness guards.
//!
//! Three small state machines over one question: "is this my first time
//! being asked, for my equivalence class, this run (or this cycle)?"
//!
//! - [`RunOnce`] gates a recipe on whether a named recipe already made a
//!   change in the current cycle.
//! - [`Singleton`] lets the first-claimed position among value-equal
//!   instances win for the remainder of the run.
//! - [`Unique`] is the decorator form of [`Singleton`], gating a whole
//!   recipe including its scanning lifecycle and subtree.
//!
//! Claims are keyed by [`RecipeIdentity`]. Recipes keeping the default
//! per-instance identity never compare equal, so they never deduplicate;
//! that is a documented caveat of value-equality-driven dedup, not a defect.

use crate::context::ExecutionContext;
use crate::error::RecipeError;
use crate::recipe::{Recipe, RecipeIdentity};
use crate::scanning::{Accumulator, ScanningRecipe};
use crate::validate::Validated;
use crate::visitor::{FileVisitor, NoopVisitor, VisitOutcome};
use dashmap::DashMap;
use remold_tree::{Cursor, SourceFile};
use std::any::Any;
use std::sync::Arc;

const CLAIMS: &str = "remold.unique-claims";

type ClaimMap = DashMap<RecipeIdentity, u64>;

fn claims(ctx: &ExecutionContext) -> Arc<ClaimMap> {
    if let Some(map) = ctx.compute_message_if_absent(CLAIMS, ClaimMap::new) {
        return map;
    }
    // A foreign value under our key would otherwise poison every guard
    // in the run; replace it and start a fresh registry.
    tracing::warn!(key = CLAIMS, "claim registry held a foreign value, resetting");
    ctx.put_message(CLAIMS, ClaimMap::new());
    ctx.get_message::<ClaimMap>(CLAIMS)
        .unwrap_or_else(|| Arc::new(ClaimMap::new()))
}

/// Claim the current recipe position for `identity`. The first claimant
/// wins for the remainder of the run; later positions lose.
fn claim_current(ctx: &ExecutionContext, identity: &RecipeIdentity) -> bool {
    let position = ctx.cycle().current_position();
    let winner = *claims(ctx)
        .entry(identity.clone())
        .or_insert(position)
        .value();
    winner == position
}

/// Visitor wrapper that only lets the run's winning claimant through.
struct ClaimGatedVisitor {
    identity: RecipeIdentity,
    inner: Box<dyn FileVisitor>,
}

impl FileVisitor for ClaimGatedVisitor {
    fn is_acceptable(&self, file: &dyn SourceFile, ctx: &ExecutionContext) -> bool {
        claim_current(ctx, &self.identity) && self.inner.is_acceptable(file, ctx)
    }

    fn visit(
        &self,
        file: &Arc<dyn SourceFile>,
        ctx: &ExecutionContext,
        cursor: &Arc<Cursor>,
    ) -> Result<VisitOutcome, RecipeError> {
        if !claim_current(ctx, &self.identity) {
            return Ok(VisitOutcome::Unchanged);
        }
        self.inner.visit(file, ctx, cursor)
    }
}

/// Precondition: skip the wrapped recipe in cycles where a recipe with
/// the given name already made a change.
///
/// Wiring a recipe as its own gate (`RunOnce::guard`) keeps it from
/// firing more than once per cycle.
#[derive(Debug)]
pub struct RunOnce {
    gate_name: String,
    inner: Arc<dyn Recipe>,
}

impl RunOnce {
    /// Gate `inner` on changes made by the recipe named `gate_name`.
    #[must_use]
    pub fn new(gate_name: impl Into<String>, inner: Arc<dyn Recipe>) -> Self {
        Self {
            gate_name: gate_name.into(),
            inner,
        }
    }

    /// Gate `inner` on its own name.
    #[must_use]
    pub fn guard(inner: Arc<dyn Recipe>) -> Self {
        Self {
            gate_name: inner.name(),
            inner,
        }
    }
}

impl Recipe for RunOnce {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn display_name(&self) -> String {
        self.inner.display_name()
    }

    fn description(&self) -> String {
        self.inner.description()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn validate(&self, ctx: &ExecutionContext) -> Validated {
        self.inner.validate(ctx)
    }

    fn max_cycles(&self) -> usize {
        self.inner.max_cycles()
    }

    fn causes_another_cycle(&self) -> bool {
        self.inner.causes_another_cycle()
    }

    fn recipe_list(&self) -> Vec<Arc<dyn Recipe>> {
        self.inner.recipe_list()
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        struct Gated {
            gate_name: String,
            inner: Box<dyn FileVisitor>,
        }

        impl FileVisitor for Gated {
            fn is_acceptable(&self, file: &dyn SourceFile, ctx: &ExecutionContext) -> bool {
                !ctx.cycle().has_changed_name(&self.gate_name)
                    && self.inner.is_acceptable(file, ctx)
            }

            fn visit(
                &self,
                file: &Arc<dyn SourceFile>,
                ctx: &ExecutionContext,
                cursor: &Arc<Cursor>,
            ) -> Result<VisitOutcome, RecipeError> {
                if ctx.cycle().has_changed_name(&self.gate_name) {
                    return Ok(VisitOutcome::Unchanged);
                }
                self.inner.visit(file, ctx, cursor)
            }
        }

        Box::new(Gated {
            gate_name: self.gate_name.clone(),
            inner: self.inner.visitor(),
        })
    }

    fn identity(&self) -> RecipeIdentity {
        self.inner.identity()
    }
}

/// Precondition: among all value-equal instances of the wrapped recipe,
/// the first recipe-position encountered wins; every other instance is a
/// no-op for the remainder of the run.
#[derive(Debug)]
pub struct Singleton {
    inner: Arc<dyn Recipe>,
}

impl Singleton {
    /// Wrap a recipe.
    #[must_use]
    pub fn new(inner: Arc<dyn Recipe>) -> Self {
        Self { inner }
    }
}

impl Recipe for Singleton {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn display_name(&self) -> String {
        self.inner.display_name()
    }

    fn description(&self) -> String {
        self.inner.description()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn validate(&self, ctx: &ExecutionContext) -> Validated {
        self.inner.validate(ctx)
    }

    fn max_cycles(&self) -> usize {
        self.inner.max_cycles()
    }

    fn causes_another_cycle(&self) -> bool {
        self.inner.causes_another_cycle()
    }

    fn recipe_list(&self) -> Vec<Arc<dyn Recipe>> {
        self.inner.recipe_list()
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        Box::new(ClaimGatedVisitor {
            identity: self.inner.identity(),
            inner: self.inner.visitor(),
        })
    }

    fn identity(&self) -> RecipeIdentity {
        self.inner.identity()
    }
}

/// Decorator guaranteeing only the first of N duplicate recipe instances
/// in a composite executes its payload.
///
/// Losing duplicates still evaluate their gate cheaply each time they are
/// asked. The gate extends through the scanning lifecycle (scan visits,
/// generation, edits) and, recursively, through the subtree.
#[derive(Debug)]
pub struct Unique {
    inner: Arc<dyn Recipe>,
}

impl Unique {
    /// Wrap a recipe so only the first value-equal instance acts.
    #[must_use]
    pub fn decorate(inner: Arc<dyn Recipe>) -> Arc<dyn Recipe> {
        Arc::new(Self { inner })
    }
}

impl Recipe for Unique {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn display_name(&self) -> String {
        self.inner.display_name()
    }

    fn description(&self) -> String {
        self.inner.description()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn validate(&self, ctx: &ExecutionContext) -> Validated {
        self.inner.validate(ctx)
    }

    fn max_cycles(&self) -> usize {
        self.inner.max_cycles()
    }

    fn causes_another_cycle(&self) -> bool {
        self.inner.causes_another_cycle()
    }

    fn recipe_list(&self) -> Vec<Arc<dyn Recipe>> {
        self.inner
            .recipe_list()
            .into_iter()
            .map(Unique::decorate)
            .collect()
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        Box::new(ClaimGatedVisitor {
            identity: self.inner.identity(),
            inner: self.inner.visitor(),
        })
    }

    fn identity(&self) -> RecipeIdentity {
        self.inner.identity()
    }

    fn as_scanning(&self) -> Option<&dyn ScanningRecipe> {
        if self.inner.as_scanning().is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl ScanningRecipe for Unique {
    fn initial_accumulator(&self) -> Accumulator {
        match self.inner.as_scanning() {
            Some(scanning) => scanning.initial_accumulator(),
            None => Accumulator::new(()),
        }
    }

    fn scanner(&self, acc: &Accumulator) -> Box<dyn FileVisitor> {
        match self.inner.as_scanning() {
            Some(scanning) => Box::new(ClaimGatedVisitor {
                identity: self.inner.identity(),
                inner: scanning.scanner(acc),
            }),
            None => Box::new(NoopVisitor),
        }
    }

    fn generate(
        &self,
        acc: &Accumulator,
        ctx: &ExecutionContext,
    ) -> Result<Vec<Arc<dyn SourceFile>>, RecipeError> {
        let Some(scanning) = self.inner.as_scanning() else {
            return Ok(Vec::new());
        };
        if !claim_current(ctx, &self.inner.identity()) {
            return Ok(Vec::new());
        }
        scanning.generate(acc, ctx)
    }

    fn editor(&self, acc: &Accumulator) -> Box<dyn FileVisitor> {
        match self.inner.as_scanning() {
            Some(scanning) => Box::new(ClaimGatedVisitor {
                identity: self.inner.identity(),
                inner: scanning.editor(acc),
            }),
            None => Box::new(NoopVisitor),
        }
    }
}
