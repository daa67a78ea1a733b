//! Per-file failure containment, panic handling, and the run budget.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use remold_engine::{ChangeKind, InlineExecutor, RecipeScheduler, RunOptions};
use remold_recipe::{
    from_fn, CompositeRecipe, ExecutionContext, FileVisitor, Recipe, RecipeError, Validated,
    VisitOutcome,
};
use remold_test_utils::{
    init_tracing, text_file, text_of, AppendLineIfAbsent, FailOn, GenerateFile, PanicOn,
    SummarizeSources,
};

fn scheduler() -> RecipeScheduler {
    RecipeScheduler::with_executor(Arc::new(InlineExecutor))
}

#[test]
fn one_failing_file_does_not_block_the_others() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(
        CompositeRecipe::new("test.Suite")
            .with(Arc::new(FailOn::new("b.txt")))
            .with(Arc::new(AppendLineIfAbsent::new("marker"))),
    );

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![
                text_file("a.txt", "a\n"),
                text_file("b.txt", "b\n"),
                text_file("c.txt", "c\n"),
            ],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    // All three files were still edited, including the one that failed
    // under the other recipe.
    assert_eq!(run.results().len(), 3);
    for result in run.results() {
        assert_eq!(result.kind(), ChangeKind::Edited);
        assert!(text_of(result.after().unwrap()).ends_with("marker\n"));
    }

    // The repeated failure across cycles collapses into one row.
    let rows = &run.data_tables()["remold.table.SourceFileErrors"];
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["source_path"], "b.txt");
    assert_eq!(rows[0]["recipe"], "remold.test.FailOn");

    let failed = run
        .results()
        .iter()
        .find(|r| r.source_path() == "b.txt")
        .unwrap();
    assert_eq!(failed.failures().len(), 1);
}

#[test]
fn visitor_panics_are_contained_like_errors() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let errors = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&errors);
    ctx.set_on_error(Arc::new(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    let recipe: Arc<dyn Recipe> = Arc::new(
        CompositeRecipe::new("test.Suite")
            .with(Arc::new(PanicOn::new("b.txt")))
            .with(Arc::new(AppendLineIfAbsent::new("marker"))),
    );

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "a\n"), text_file("b.txt", "b\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(run.results().len(), 2);
    let rows = &run.data_tables()["remold.table.SourceFileErrors"];
    assert_eq!(rows.len(), 1);
    let message = rows[0]["error"].as_str().unwrap();
    assert!(message.contains("panicked"));
    assert!(message.contains("induced panic"));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[test]
fn zero_budget_passes_edits_through_but_keeps_generated_files() {
    init_tracing();
    let ctx = ExecutionContext::new();
    ctx.set_run_timeout(Duration::ZERO);
    let timeouts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&timeouts);
    ctx.set_on_timeout(Arc::new(move |_, _| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    let recipe: Arc<dyn Recipe> = Arc::new(
        CompositeRecipe::new("test.Suite")
            .with(Arc::new(GenerateFile::new("gen.txt", "hello\n")))
            .with(Arc::new(AppendLineIfAbsent::new("marker"))),
    );

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "a\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    // The timeout hooks fire exactly once no matter how many file tasks
    // observe the exceeded deadline.
    assert_eq!(timeouts.load(Ordering::SeqCst), 1);

    // Generation is not file work and still happened; edits did not.
    assert_eq!(run.results().len(), 1);
    assert_eq!(run.results()[0].kind(), ChangeKind::Added);
    assert_eq!(text_of(run.results()[0].after().unwrap()), "hello\n");
}

#[test]
fn exhausted_budget_still_runs_the_scan_phase() {
    init_tracing();
    let ctx = ExecutionContext::new();
    ctx.set_run_timeout(Duration::ZERO);

    let recipe: Arc<dyn Recipe> = Arc::new(SummarizeSources::new("summary.txt"));
    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "a\n"), text_file("b.txt", "b\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    // Generation fed by scan-phase state: neither is budget-gated, so
    // the index still lists both files.
    assert_eq!(run.results().len(), 1);
    assert_eq!(run.results()[0].kind(), ChangeKind::Added);
    assert_eq!(text_of(run.results()[0].after().unwrap()), "a.txt\nb.txt\n");
}

/// Asks the engine to halt the cycle before any later stack runs.
#[derive(Debug)]
struct RequestsHalt;

impl Recipe for RequestsHalt {
    fn name(&self) -> String {
        "test.RequestsHalt".to_string()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        from_fn(|_, ctx| {
            ctx.request_panic();
            Ok(VisitOutcome::Unchanged)
        })
    }
}

#[test]
fn panic_request_skips_later_stacks_every_cycle() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(
        CompositeRecipe::new("test.Suite")
            .with(Arc::new(RequestsHalt))
            .with(Arc::new(AppendLineIfAbsent::new("marker"))),
    );

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "a\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    // The append recipe never got to run in any cycle, and without a
    // causes-another-cycle hint the run still stops at its cycle floor.
    assert!(run.results().is_empty());
    assert_eq!(run.stats().cycle_count(), 2);
}

/// Rejects its own configuration.
#[derive(Debug)]
struct NeverValid;

impl Recipe for NeverValid {
    fn name(&self) -> String {
        "test.NeverValid".to_string()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn validate(&self, _ctx: &ExecutionContext) -> Validated {
        Validated::invalid("line", None, "must not be empty")
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        from_fn(|_, _| Err(RecipeError::visit("must never run")))
    }
}

/// Rejects its configuration while aggregating a child recipe.
#[derive(Debug)]
struct InvalidParent {
    child: Arc<dyn Recipe>,
}

impl Recipe for InvalidParent {
    fn name(&self) -> String {
        "test.InvalidParent".to_string()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn validate(&self, _ctx: &ExecutionContext) -> Validated {
        Validated::invalid("child", None, "misconfigured")
    }

    fn recipe_list(&self) -> Vec<Arc<dyn Recipe>> {
        vec![Arc::clone(&self.child)]
    }
}

#[test]
fn invalid_parent_disables_its_scanning_subtree() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(InvalidParent {
        child: Arc::new(GenerateFile::new("gen.txt", "hello\n")),
    });

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "a\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    // The child neither scanned nor generated under its invalid parent.
    assert!(run.results().is_empty());
}

#[test]
fn invalid_recipes_are_skipped_without_failing_the_run() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(
        CompositeRecipe::new("test.Suite")
            .with(Arc::new(NeverValid))
            .with(Arc::new(AppendLineIfAbsent::new("marker"))),
    );

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "a\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    // The invalid recipe never visited anything; the valid one did.
    assert_eq!(run.results().len(), 1);
    assert!(run.data_tables().get("remold.table.SourceFileErrors").is_none());
}
