//! Testing utilities for the remold workspace
//!
//! Shared fixture recipes and helpers used across engine tests.

#![allow(missing_docs)]

use dashmap::DashSet;
use remold_recipe::{
    from_fn, Accumulator, ExecutionContext, FileVisitor, NoopVisitor, Recipe, RecipeError,
    RecipeIdentity, ScanningRecipe, VisitOutcome,
};
use remold_tree::{PlainText, SourceFile};
use serde::Serialize;
use std::any::Any;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`; safe to call from every
/// test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn text_file(path: &str, text: &str) -> Arc<dyn SourceFile> {
    Arc::new(PlainText::new(path, text))
}

/// The text of a plain-text source file; panics on any other tree type.
pub fn text_of(file: &Arc<dyn SourceFile>) -> String {
    PlainText::from_source(file.as_ref())
        .expect("fixture files are plain text")
        .text()
        .to_string()
}

fn append_line(text: &str, line: &str) -> Option<String> {
    if text.lines().any(|l| l == line) {
        return None;
    }
    let mut next = text.to_string();
    if !next.is_empty() && !next.ends_with('\n') {
        next.push('\n');
    }
    next.push_str(line);
    next.push('\n');
    Some(next)
}

/// Appends a line to every text file missing it. Idempotent, so a run
/// converges on its second cycle.
#[derive(Debug, Clone, Serialize)]
pub struct AppendLineIfAbsent {
    pub line: String,
}

impl AppendLineIfAbsent {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }
}

impl Recipe for AppendLineIfAbsent {
    fn name(&self) -> String {
        "remold.test.AppendLineIfAbsent".to_string()
    }

    fn display_name(&self) -> String {
        "Append a line if absent".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn identity(&self) -> RecipeIdentity {
        RecipeIdentity::of_options(self.name(), self)
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        let line = self.line.clone();
        from_fn(move |file, _| {
            let text = PlainText::from_source(file.as_ref())
                .ok_or_else(|| RecipeError::visit("not a plain-text file"))?;
            match append_line(text.text(), &line) {
                None => Ok(VisitOutcome::Unchanged),
                Some(next) => Ok(VisitOutcome::Changed(Arc::new(text.with_text(next)))),
            }
        })
    }
}

/// Replaces every occurrence of one substring.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaceInText {
    pub from: String,
    pub to: String,
}

impl ReplaceInText {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl Recipe for ReplaceInText {
    fn name(&self) -> String {
        "remold.test.ReplaceInText".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn identity(&self) -> RecipeIdentity {
        RecipeIdentity::of_options(self.name(), self)
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        let from = self.from.clone();
        let to = self.to.clone();
        from_fn(move |file, _| {
            let text = PlainText::from_source(file.as_ref())
                .ok_or_else(|| RecipeError::visit("not a plain-text file"))?;
            if !text.text().contains(&from) {
                return Ok(VisitOutcome::Unchanged);
            }
            let next = text.text().replace(&from, &to);
            Ok(VisitOutcome::Changed(Arc::new(text.with_text(next))))
        })
    }
}

/// Fails on one path, leaves every other file untouched.
#[derive(Debug, Clone)]
pub struct FailOn {
    pub path: String,
}

impl FailOn {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Recipe for FailOn {
    fn name(&self) -> String {
        "remold.test.FailOn".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        let path = self.path.clone();
        from_fn(move |file, _| {
            if file.source_path() == Path::new(&path) {
                Err(RecipeError::visit(format!("induced failure on {path}")))
            } else {
                Ok(VisitOutcome::Unchanged)
            }
        })
    }
}

/// Deletes one path, leaves every other file untouched.
#[derive(Debug, Clone)]
pub struct DeleteOn {
    pub path: String,
}

impl DeleteOn {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Recipe for DeleteOn {
    fn name(&self) -> String {
        "remold.test.DeleteOn".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        let path = self.path.clone();
        from_fn(move |file, _| {
            if file.source_path() == Path::new(&path) {
                Ok(VisitOutcome::Deleted)
            } else {
                Ok(VisitOutcome::Unchanged)
            }
        })
    }
}

/// Panics on one path, leaves every other file untouched.
#[derive(Debug, Clone)]
pub struct PanicOn {
    pub path: String,
}

impl PanicOn {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Recipe for PanicOn {
    fn name(&self) -> String {
        "remold.test.PanicOn".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        let path = self.path.clone();
        from_fn(move |file, _| {
            assert!(
                file.source_path() != Path::new(&path),
                "induced panic on {path}"
            );
            Ok(VisitOutcome::Unchanged)
        })
    }
}

/// Generates one file unless it already exists, via the scan lifecycle:
/// the scan phase marks existence, the generate phase produces the file
/// at most once per run.
#[derive(Debug, Serialize)]
pub struct GenerateFile {
    pub path: String,
    pub text: String,
}

impl GenerateFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }
}

impl Recipe for GenerateFile {
    fn name(&self) -> String {
        "remold.test.GenerateFile".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn identity(&self) -> RecipeIdentity {
        RecipeIdentity::of_options(self.name(), self)
    }

    fn as_scanning(&self) -> Option<&dyn ScanningRecipe> {
        Some(self)
    }
}

impl ScanningRecipe for GenerateFile {
    fn initial_accumulator(&self) -> Accumulator {
        Accumulator::new(AtomicBool::new(false))
    }

    fn scanner(&self, acc: &Accumulator) -> Box<dyn FileVisitor> {
        let exists = acc
            .downcast::<AtomicBool>(&self.name())
            .expect("fixture accumulator type");
        let path = self.path.clone();
        from_fn(move |file, _| {
            if file.source_path() == Path::new(&path) {
                exists.store(true, Ordering::SeqCst);
            }
            Ok(VisitOutcome::Unchanged)
        })
    }

    fn generate(
        &self,
        acc: &Accumulator,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<Arc<dyn SourceFile>>, RecipeError> {
        let exists = acc.downcast::<AtomicBool>(&self.name())?;
        if exists.swap(true, Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![Arc::new(PlainText::new(&self.path, self.text.clone()))])
    }

    fn editor(&self, _acc: &Accumulator) -> Box<dyn FileVisitor> {
        Box::new(NoopVisitor)
    }
}

/// The scan-lifecycle form of [`AppendLineIfAbsent`]: the scan phase
/// records which files are missing the line, and the edit phase appends
/// only to the recorded paths.
#[derive(Debug, Serialize)]
pub struct ScanningAppendLine {
    pub line: String,
}

impl ScanningAppendLine {
    pub fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }
}

impl Recipe for ScanningAppendLine {
    fn name(&self) -> String {
        "remold.test.ScanningAppendLine".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn identity(&self) -> RecipeIdentity {
        RecipeIdentity::of_options(self.name(), self)
    }

    fn as_scanning(&self) -> Option<&dyn ScanningRecipe> {
        Some(self)
    }
}

impl ScanningRecipe for ScanningAppendLine {
    fn initial_accumulator(&self) -> Accumulator {
        Accumulator::new(DashSet::<String>::new())
    }

    fn scanner(&self, acc: &Accumulator) -> Box<dyn FileVisitor> {
        let missing = acc
            .downcast::<DashSet<String>>(&self.name())
            .expect("fixture accumulator type");
        let line = self.line.clone();
        from_fn(move |file, _| {
            let text = PlainText::from_source(file.as_ref())
                .ok_or_else(|| RecipeError::visit("not a plain-text file"))?;
            if !text.text().lines().any(|l| l == line) {
                missing.insert(file.source_path().display().to_string());
            }
            Ok(VisitOutcome::Unchanged)
        })
    }

    fn editor(&self, acc: &Accumulator) -> Box<dyn FileVisitor> {
        let missing = acc
            .downcast::<DashSet<String>>(&self.name())
            .expect("fixture accumulator type");
        let line = self.line.clone();
        from_fn(move |file, _| {
            if !missing.contains(&file.source_path().display().to_string()) {
                return Ok(VisitOutcome::Unchanged);
            }
            let text = PlainText::from_source(file.as_ref())
                .ok_or_else(|| RecipeError::visit("not a plain-text file"))?;
            match append_line(text.text(), &line) {
                None => Ok(VisitOutcome::Unchanged),
                Some(next) => Ok(VisitOutcome::Changed(Arc::new(text.with_text(next)))),
            }
        })
    }
}

#[derive(Debug, Default)]
struct SummaryState {
    seen: DashSet<String>,
    emitted: AtomicBool,
}

/// Emits one index file listing every path the scan phase saw. Nothing
/// is generated when the scan recorded no files.
#[derive(Debug, Serialize)]
pub struct SummarizeSources {
    pub path: String,
}

impl SummarizeSources {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Recipe for SummarizeSources {
    fn name(&self) -> String {
        "remold.test.SummarizeSources".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn identity(&self) -> RecipeIdentity {
        RecipeIdentity::of_options(self.name(), self)
    }

    fn as_scanning(&self) -> Option<&dyn ScanningRecipe> {
        Some(self)
    }
}

impl ScanningRecipe for SummarizeSources {
    fn initial_accumulator(&self) -> Accumulator {
        Accumulator::new(SummaryState::default())
    }

    fn scanner(&self, acc: &Accumulator) -> Box<dyn FileVisitor> {
        let state = acc
            .downcast::<SummaryState>(&self.name())
            .expect("fixture accumulator type");
        let own_path = self.path.clone();
        from_fn(move |file, _| {
            let path = file.source_path().display().to_string();
            if path != own_path {
                state.seen.insert(path);
            }
            Ok(VisitOutcome::Unchanged)
        })
    }

    fn generate(
        &self,
        acc: &Accumulator,
        _ctx: &ExecutionContext,
    ) -> Result<Vec<Arc<dyn SourceFile>>, RecipeError> {
        let state = acc.downcast::<SummaryState>(&self.name())?;
        if state.seen.is_empty() || state.emitted.swap(true, Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        let mut paths: Vec<String> = state.seen.iter().map(|p| p.key().clone()).collect();
        paths.sort();
        let mut text = paths.join("\n");
        text.push('\n');
        Ok(vec![Arc::new(PlainText::new(&self.path, text))])
    }

    fn editor(&self, _acc: &Accumulator) -> Box<dyn FileVisitor> {
        Box::new(NoopVisitor)
    }
}

/// Append-if-absent with a shared visit counter, for observing how often
/// a gated recipe instance actually runs.
#[derive(Debug, Clone, Serialize)]
pub struct CountingAppend {
    pub line: String,
    #[serde(skip)]
    visits: Arc<AtomicUsize>,
}

impl CountingAppend {
    pub fn new(line: impl Into<String>, visits: Arc<AtomicUsize>) -> Self {
        Self {
            line: line.into(),
            visits,
        }
    }
}

impl Recipe for CountingAppend {
    fn name(&self) -> String {
        "remold.test.CountingAppend".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn identity(&self) -> RecipeIdentity {
        // The counter is deliberately left out: two instances appending
        // the same line are the same recipe for dedup purposes.
        RecipeIdentity::of_options(self.name(), self)
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        let line = self.line.clone();
        let visits = Arc::clone(&self.visits);
        from_fn(move |file, _| {
            visits.fetch_add(1, Ordering::SeqCst);
            let text = PlainText::from_source(file.as_ref())
                .ok_or_else(|| RecipeError::visit("not a plain-text file"))?;
            match append_line(text.text(), &line) {
                None => Ok(VisitOutcome::Unchanged),
                Some(next) => Ok(VisitOutcome::Changed(Arc::new(text.with_text(next)))),
            }
        })
    }
}

/// Merges entries into `.gitignore` files, preserving existing lines and
/// appending only what is missing.
#[derive(Debug, Clone, Serialize)]
pub struct MergeGitignoreEntries {
    pub entries: Vec<String>,
}

impl MergeGitignoreEntries {
    pub fn new(entries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }
}

impl Recipe for MergeGitignoreEntries {
    fn name(&self) -> String {
        "remold.test.MergeGitignoreEntries".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn identity(&self) -> RecipeIdentity {
        RecipeIdentity::of_options(self.name(), self)
    }

    fn visitor(&self) -> Box<dyn FileVisitor> {
        let entries = self.entries.clone();
        from_fn(move |file, _| {
            if file.source_path().file_name().and_then(|n| n.to_str()) != Some(".gitignore") {
                return Ok(VisitOutcome::Unchanged);
            }
            let text = PlainText::from_source(file.as_ref())
                .ok_or_else(|| RecipeError::visit("not a plain-text file"))?;
            let mut next = text.text().to_string();
            let mut changed = false;
            for entry in &entries {
                if let Some(merged) = append_line(&next, entry) {
                    next = merged;
                    changed = true;
                }
            }
            if changed {
                Ok(VisitOutcome::Changed(Arc::new(text.with_text(next))))
            } else {
                Ok(VisitOutcome::Unchanged)
            }
        })
    }
}
