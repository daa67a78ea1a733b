//! The assembled outcome of a run.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use remold_recipe::RecipeDescriptor;
use remold_tree::SourceFile;
use serde_json::Value;

use crate::diff::{git_diff, DiffSide};
use crate::error::EngineError;
use crate::provenance::Provenance;
use crate::source_set::{Changeset, SourceEntry, VisitFailure};

/// What happened to a file over the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    /// Generated during the run.
    Added,
    /// Existed before and holds a different tree now.
    Edited,
    /// Existed before and is gone.
    Deleted,
}

/// One changed file: its state before and after the run, plus the
/// provenance explaining who changed it.
#[derive(Clone, Debug)]
pub struct SourceResult {
    before: Option<Arc<dyn SourceFile>>,
    after: Option<Arc<dyn SourceFile>>,
    provenance: Provenance,
    failures: Vec<VisitFailure>,
}

impl SourceResult {
    /// Result for an edited file. Fails when no recipe claimed the edit.
    pub fn try_edited(before: SourceEntry, after: SourceEntry) -> Result<Self, EngineError> {
        if after.provenance().is_empty() {
            return Err(EngineError::MissingProvenance {
                path: after.file().source_path().display().to_string(),
            });
        }
        Ok(Self {
            before: Some(Arc::clone(before.file())),
            after: Some(Arc::clone(after.file())),
            provenance: after.provenance().clone(),
            failures: after.failures().to_vec(),
        })
    }

    /// Result for a file generated during the run.
    #[must_use]
    pub fn added(after: SourceEntry) -> Self {
        Self {
            before: None,
            after: Some(Arc::clone(after.file())),
            provenance: after.provenance().clone(),
            failures: after.failures().to_vec(),
        }
    }

    /// Result for a deleted file.
    #[must_use]
    pub fn deleted(before: SourceEntry) -> Self {
        Self {
            before: Some(Arc::clone(before.file())),
            after: None,
            provenance: before.provenance().clone(),
            failures: before.failures().to_vec(),
        }
    }

    /// Build a result from a changeset row. Edits without provenance are
    /// rejected here rather than silently reported.
    pub fn from_changeset(change: Changeset) -> Result<Self, EngineError> {
        match change {
            Changeset::Added(entry) => Ok(Self::added(entry)),
            Changeset::Edited { before, after } => Self::try_edited(before, after),
            Changeset::Deleted(entry) => Ok(Self::deleted(entry)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), None) => ChangeKind::Deleted,
            _ => ChangeKind::Edited,
        }
    }

    /// The file state before the run; `None` for additions.
    #[must_use]
    pub fn before(&self) -> Option<&Arc<dyn SourceFile>> {
        self.before.as_ref()
    }

    /// The file state after the run; `None` for deletions.
    #[must_use]
    pub fn after(&self) -> Option<&Arc<dyn SourceFile>> {
        self.after.as_ref()
    }

    /// Path of the changed file, preferring the post-run location.
    #[must_use]
    pub fn source_path(&self) -> String {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map(|f| f.source_path().display().to_string())
            .unwrap_or_default()
    }

    /// Attribution for the change.
    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Contained failures recorded while this file was being visited.
    #[must_use]
    pub fn failures(&self) -> &[VisitFailure] {
        &self.failures
    }

    /// Attribution rendered as a descriptor forest sharing common
    /// ancestors.
    #[must_use]
    pub fn recipe_descriptors(&self) -> Vec<RecipeDescriptor> {
        self.provenance.descriptor_tree()
    }

    /// Render this change as a git-format unified diff.
    #[must_use]
    pub fn diff(&self) -> String {
        let before_text = self.before.as_ref().map(|f| f.print());
        let after_text = self.after.as_ref().map(|f| f.print());
        let before = self.before.as_ref().zip(before_text.as_ref()).map(|(f, text)| DiffSide {
            path: f.source_path().display().to_string(),
            text,
            mode: f.attributes().mode(),
        });
        let after = self.after.as_ref().zip(after_text.as_ref()).map(|(f, text)| DiffSide {
            path: f.source_path().display().to_string(),
            text,
            mode: f.attributes().mode(),
        });
        git_diff(before, after)
    }
}

/// Per-cycle timing and change counters.
#[derive(Clone, Debug, Default)]
pub struct CycleStats {
    /// 1-based cycle number.
    pub cycle: usize,
    /// Files edited this cycle.
    pub edits: usize,
    /// Files generated this cycle.
    pub generated: usize,
    /// Files deleted this cycle.
    pub deleted: usize,
    /// Contained per-file failures this cycle.
    pub failures: usize,
}

/// Whole-run counters.
#[derive(Clone, Debug, Default)]
pub struct RunStats {
    /// Per-cycle breakdown, in order.
    pub cycles: Vec<CycleStats>,
    /// Wall-clock duration of the run.
    pub duration: Duration,
}

impl RunStats {
    /// Number of cycles the run took.
    #[must_use]
    pub fn cycle_count(&self) -> usize {
        self.cycles.len()
    }
}

/// Everything a run produced: changed files, diagnostic tables, and
/// timing.
#[derive(Debug)]
pub struct RecipeRun {
    results: Vec<SourceResult>,
    data_tables: IndexMap<String, Vec<Value>>,
    stats: RunStats,
}

impl RecipeRun {
    pub(crate) fn new(
        results: Vec<SourceResult>,
        data_tables: IndexMap<String, Vec<Value>>,
        stats: RunStats,
    ) -> Self {
        Self {
            results,
            data_tables,
            stats,
        }
    }

    /// Changed files, in source-set order.
    #[must_use]
    pub fn results(&self) -> &[SourceResult] {
        &self.results
    }

    /// Diagnostic table rows collected during the run, keyed by table
    /// name.
    #[must_use]
    pub fn data_tables(&self) -> &IndexMap<String, Vec<Value>> {
        &self.data_tables
    }

    /// Timing and per-cycle counters.
    #[must_use]
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::ProvenanceStack;
    use crate::source_set::SourceEntry;
    use crate::stack::expand_recipe_stacks;
    use remold_recipe::Recipe;
    use remold_tree::PlainText;

    #[derive(Debug)]
    struct Stub;

    impl Recipe for Stub {
        fn name(&self) -> String {
            "test.Stub".to_string()
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn stack() -> ProvenanceStack {
        let root: Arc<dyn Recipe> = Arc::new(Stub);
        ProvenanceStack::of(&expand_recipe_stacks(&root)[0])
    }

    #[test]
    fn edited_without_provenance_is_rejected() {
        let before = SourceEntry::fresh(Arc::new(PlainText::new("a.txt", "a")));
        let after = SourceEntry::fresh(Arc::new(PlainText::new("a.txt", "b")));

        let err = SourceResult::try_edited(before, after).unwrap_err();
        assert!(matches!(err, EngineError::MissingProvenance { .. }));
    }

    #[test]
    fn edited_with_provenance_reports_the_recipe() {
        let original = PlainText::new("a.txt", "a\n");
        let before = SourceEntry::fresh(Arc::new(original.clone()));
        let after = before.edited(Arc::new(original.with_text("b\n")), &stack());

        let result = SourceResult::try_edited(before, after).unwrap();
        assert_eq!(result.kind(), ChangeKind::Edited);
        assert_eq!(result.source_path(), "a.txt");
        let descriptors = result.recipe_descriptors();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "test.Stub");
        assert!(result.diff().contains("-a\n+b\n"));
    }

    #[test]
    fn added_and_deleted_kinds() {
        let by = stack();
        let added = SourceResult::added(SourceEntry::generated(
            Arc::new(PlainText::new("n.txt", "n\n")),
            by.clone(),
        ));
        assert_eq!(added.kind(), ChangeKind::Added);
        assert!(added.diff().contains("new file mode 100644"));

        let deleted = SourceResult::deleted(
            SourceEntry::fresh(Arc::new(PlainText::new("d.txt", "d\n"))).claimed(&by),
        );
        assert_eq!(deleted.kind(), ChangeKind::Deleted);
        assert!(deleted.diff().contains("deleted file mode 100644"));
    }
}
