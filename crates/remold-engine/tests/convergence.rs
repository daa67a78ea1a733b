//! Fixed-point behavior over whole runs.

use std::sync::Arc;

use remold_engine::{ChangeKind, InlineExecutor, RayonExecutor, RecipeScheduler, RunOptions};
use remold_recipe::{
    from_fn, CompositeRecipe, ExecutionContext, FileVisitor, Recipe, RecipeError, VisitOutcome,
};
use remold_test_utils::{
    init_tracing, text_file, text_of, AppendLineIfAbsent, DeleteOn, GenerateFile,
    MergeGitignoreEntries, ScanningAppendLine,
};
use remold_tree::PlainText;

fn scheduler() -> RecipeScheduler {
    RecipeScheduler::with_executor(Arc::new(InlineExecutor))
}

#[test]
fn append_line_converges_on_the_second_cycle() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(AppendLineIfAbsent::new("marker"));

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "one\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(run.stats().cycle_count(), 2);
    assert_eq!(run.results().len(), 1);
    let result = &run.results()[0];
    assert_eq!(result.kind(), ChangeKind::Edited);
    assert_eq!(text_of(result.before().unwrap()), "one\n");
    assert_eq!(text_of(result.after().unwrap()), "one\nmarker\n");
}

#[test]
fn run_without_work_reports_no_results() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(AppendLineIfAbsent::new("marker"));

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "one\nmarker\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(run.stats().cycle_count(), 2);
    assert!(run.results().is_empty());
}

#[test]
fn generated_file_is_edited_within_the_same_cycle() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(
        CompositeRecipe::new("test.GenerateThenEdit")
            .with(Arc::new(GenerateFile::new("gen.txt", "hello\n")))
            .with(Arc::new(AppendLineIfAbsent::new("marker"))),
    );

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "one\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(run.results().len(), 2);
    let added = run
        .results()
        .iter()
        .find(|r| r.kind() == ChangeKind::Added)
        .expect("generated file result");
    assert_eq!(added.source_path(), "gen.txt");
    assert_eq!(text_of(added.after().unwrap()), "hello\nmarker\n");
}

#[test]
fn scan_recorded_state_drives_the_edit_phase() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(ScanningAppendLine::new("marker"));

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![
                text_file("a.txt", "one\n"),
                text_file("b.txt", "two\nmarker\n"),
            ],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    // Only the path the scan phase recorded as missing the line was
    // touched by the editor.
    assert_eq!(run.stats().cycle_count(), 2);
    assert_eq!(run.results().len(), 1);
    let result = &run.results()[0];
    assert_eq!(result.source_path(), "a.txt");
    assert_eq!(text_of(result.after().unwrap()), "one\nmarker\n");
}

#[test]
fn gitignore_merge_adds_only_missing_entries() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(MergeGitignoreEntries::new(["*.tmp", "node_modules/"]));

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file(".gitignore", "node_modules/\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(run.results().len(), 1);
    assert_eq!(
        text_of(run.results()[0].after().unwrap()),
        "node_modules/\n*.tmp\n"
    );
    let diff = run.results()[0].diff();
    assert!(diff.contains("+*.tmp"));
    assert!(!diff.contains("+node_modules/"));
}

#[test]
fn deletions_surface_with_their_diff() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(DeleteOn::new("b.txt"));

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "keep\n"), text_file("b.txt", "drop\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    assert_eq!(run.results().len(), 1);
    let result = &run.results()[0];
    assert_eq!(result.kind(), ChangeKind::Deleted);
    assert_eq!(result.source_path(), "b.txt");
    assert!(result.diff().contains("deleted file mode 100644"));
    assert!(result.diff().contains("-drop"));
}

/// Appends a fresh line on every visit, so it never converges on its own.
#[derive(Debug)]
struct TickEveryCycle {
    keeps_going: bool,
}

impl Recipe for TickEveryCycle {
    fn name(&self) -> String {
        "test.TickEveryCycle".to_string()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn causes_another_cycle(&self) -> bool {
        self.keeps_going
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        from_fn(|file, _| {
            let text = PlainText::from_source(file.as_ref())
                .ok_or_else(|| RecipeError::visit("not a plain-text file"))?;
            let next = format!("{}tick\n", text.text());
            Ok(VisitOutcome::Changed(Arc::new(text.with_text(next))))
        })
    }
}

#[test]
fn non_converging_recipe_stops_at_min_cycles_without_the_hint() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(TickEveryCycle { keeps_going: false });

    let run = scheduler()
        .schedule_run(&recipe, vec![text_file("a.txt", "")], &ctx, RunOptions::default())
        .unwrap();

    assert_eq!(run.stats().cycle_count(), 2);
    assert_eq!(text_of(run.results()[0].after().unwrap()), "tick\ntick\n");
}

#[test]
fn cycle_hint_keeps_the_run_going_to_max_cycles() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(TickEveryCycle { keeps_going: true });

    let run = scheduler()
        .schedule_run(&recipe, vec![text_file("a.txt", "")], &ctx, RunOptions::default())
        .unwrap();

    assert_eq!(run.stats().cycle_count(), 3);
    assert_eq!(
        text_of(run.results()[0].after().unwrap()),
        "tick\ntick\ntick\n"
    );
}

#[test]
fn provenance_names_the_editing_recipe_under_its_parents() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(
        CompositeRecipe::new("test.Suite").with(Arc::new(AppendLineIfAbsent::new("marker"))),
    );

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "one\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    let descriptors = run.results()[0].recipe_descriptors();
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].name, "test.Suite");
    assert_eq!(descriptors[0].children.len(), 1);
    assert_eq!(descriptors[0].children[0].name, "remold.test.AppendLineIfAbsent");
}

#[test]
fn parallel_executor_matches_inline_results() {
    init_tracing();
    let corpus: Vec<(String, String)> = (0..32)
        .map(|i| (format!("f{i}.txt"), format!("file {i}\n")))
        .collect();

    let run_with = |scheduler: RecipeScheduler| {
        let ctx = ExecutionContext::new();
        let recipe: Arc<dyn Recipe> = Arc::new(AppendLineIfAbsent::new("marker"));
        let files = corpus
            .iter()
            .map(|(path, text)| text_file(path, text))
            .collect();
        let run = scheduler
            .schedule_run(&recipe, files, &ctx, RunOptions::default())
            .unwrap();
        let mut results: Vec<(String, String)> = run
            .results()
            .iter()
            .map(|r| (r.source_path(), text_of(r.after().unwrap())))
            .collect();
        results.sort();
        results
    };

    let inline = run_with(RecipeScheduler::with_executor(Arc::new(InlineExecutor)));
    let parallel = run_with(RecipeScheduler::with_executor(Arc::new(RayonExecutor)));
    assert_eq!(inline.len(), 32);
    assert_eq!(inline, parallel);
}

#[test]
fn successful_edits_land_in_the_results_table() {
    init_tracing();
    let ctx = ExecutionContext::new();
    let recipe: Arc<dyn Recipe> = Arc::new(AppendLineIfAbsent::new("marker"));

    let run = scheduler()
        .schedule_run(
            &recipe,
            vec![text_file("a.txt", "one\n")],
            &ctx,
            RunOptions::default(),
        )
        .unwrap();

    let rows = &run.data_tables()["remold.table.SourceFileResults"];
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["source_path"], "a.txt");
    assert_eq!(rows[0]["cycle"], 1);
}
