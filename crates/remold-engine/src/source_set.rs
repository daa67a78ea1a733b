//! Reference-preserving source collections.
//!
//! A [`LargeSourceSet`] is an immutable snapshot of every source file in a
//! run, plus the bookkeeping the convergence check needs: when a cycle
//! changes nothing, the set returned is the *same allocation* as the input,
//! so convergence is a pointer comparison rather than a tree diff.

use std::sync::Arc;

use remold_tree::{same_file, SourceFile, TreeId};

use crate::provenance::{Provenance, ProvenanceStack};

/// A contained per-file failure, recorded on the entry it hit.
#[derive(Clone, Debug)]
pub struct VisitFailure {
    /// Name of the recipe whose visitor failed.
    pub recipe: String,
    /// Rendered error or panic message.
    pub message: String,
}

/// One source file plus the run-scoped metadata carried alongside it.
#[derive(Clone, Debug)]
pub struct SourceEntry {
    file: Arc<dyn SourceFile>,
    provenance: Provenance,
    generated_by: Option<ProvenanceStack>,
    failures: Vec<VisitFailure>,
}

impl SourceEntry {
    /// An entry for a file that existed before the run.
    #[must_use]
    pub fn fresh(file: Arc<dyn SourceFile>) -> Self {
        Self {
            file,
            provenance: Provenance::empty(),
            generated_by: None,
            failures: Vec::new(),
        }
    }

    /// An entry for a file a recipe generated mid-run.
    #[must_use]
    pub fn generated(file: Arc<dyn SourceFile>, by: ProvenanceStack) -> Self {
        Self {
            file,
            provenance: Provenance::single(by.clone()),
            generated_by: Some(by),
            failures: Vec::new(),
        }
    }

    /// The current tree for this file.
    #[must_use]
    pub fn file(&self) -> &Arc<dyn SourceFile> {
        &self.file
    }

    /// Attribution accumulated for this file so far.
    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Set when the file did not exist before the run.
    #[must_use]
    pub fn generated_by(&self) -> Option<&ProvenanceStack> {
        self.generated_by.as_ref()
    }

    /// Contained failures recorded against this file.
    #[must_use]
    pub fn failures(&self) -> &[VisitFailure] {
        &self.failures
    }

    /// This entry with `file` in place of the old tree and `by` recorded
    /// as the claiming stack.
    #[must_use]
    pub fn edited(&self, file: Arc<dyn SourceFile>, by: &ProvenanceStack) -> Self {
        Self {
            file,
            provenance: self.provenance.merged_with(by),
            generated_by: self.generated_by.clone(),
            failures: self.failures.clone(),
        }
    }

    /// This entry, unchanged, but with `by` added to its provenance.
    /// Used when a recipe deletes a file: the deletion itself needs an
    /// owner even though no new tree exists.
    #[must_use]
    pub fn claimed(&self, by: &ProvenanceStack) -> Self {
        Self {
            file: Arc::clone(&self.file),
            provenance: self.provenance.merged_with(by),
            generated_by: self.generated_by.clone(),
            failures: self.failures.clone(),
        }
    }

    /// This entry with `failure` appended.
    #[must_use]
    pub fn with_failure(&self, failure: VisitFailure) -> Self {
        let mut failures = self.failures.clone();
        failures.push(failure);
        Self {
            file: Arc::clone(&self.file),
            provenance: self.provenance.clone(),
            generated_by: self.generated_by.clone(),
            failures,
        }
    }
}

/// A before-vs-initial difference for one file.
#[derive(Clone, Debug)]
pub enum Changeset {
    /// File did not exist initially.
    Added(SourceEntry),
    /// File existed and its tree is now a different allocation.
    Edited {
        /// The initial entry.
        before: SourceEntry,
        /// The current entry.
        after: SourceEntry,
    },
    /// File existed and is gone.
    Deleted(SourceEntry),
}

impl Changeset {
    /// Path of the affected file, preferring the post-run location.
    #[must_use]
    pub fn path(&self) -> String {
        let entry = match self {
            Self::Added(entry) | Self::Deleted(entry) => entry,
            Self::Edited { after, .. } => after,
        };
        entry.file.source_path().display().to_string()
    }
}

/// An edited file whose provenance is empty: some recipe replaced the
/// tree without claiming the change.
#[derive(Clone, Debug)]
pub struct UnexplainedChange {
    /// Path of the file.
    pub path: String,
}

/// Immutable snapshot of all sources in a run.
///
/// Cloning is cheap; every variant of the collection shares unchanged
/// entry vectors by `Arc`.
#[derive(Clone, Debug)]
pub struct LargeSourceSet {
    entries: Arc<Vec<SourceEntry>>,
    deleted: Arc<Vec<SourceEntry>>,
    initial: Arc<Vec<SourceEntry>>,
}

impl LargeSourceSet {
    /// Snapshot the given files as the run's initial state.
    #[must_use]
    pub fn from_files(files: Vec<Arc<dyn SourceFile>>) -> Self {
        let entries: Arc<Vec<SourceEntry>> =
            Arc::new(files.into_iter().map(SourceEntry::fresh).collect());
        Self {
            initial: Arc::clone(&entries),
            deleted: Arc::new(Vec::new()),
            entries,
        }
    }

    /// Current live entries.
    #[must_use]
    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    /// Entries deleted at some point during the run.
    #[must_use]
    pub fn deleted(&self) -> &[SourceEntry] {
        &self.deleted
    }

    /// True when `other` holds the exact same entry storage. This is the
    /// engine's convergence test: an edit pass that changes nothing hands
    /// back the input set itself.
    #[must_use]
    pub fn same_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries) && Arc::ptr_eq(&self.deleted, &other.deleted)
    }

    /// Replace the live entries after an edit pass.
    ///
    /// When `changed` is false the input set is returned as-is, keeping
    /// the storage pointer stable for the convergence check.
    #[must_use]
    pub fn with_entries(
        &self,
        entries: Vec<SourceEntry>,
        newly_deleted: Vec<SourceEntry>,
        changed: bool,
    ) -> Self {
        if !changed && newly_deleted.is_empty() {
            return self.clone();
        }
        let deleted = if newly_deleted.is_empty() {
            Arc::clone(&self.deleted)
        } else {
            let mut all = (*self.deleted).clone();
            all.extend(newly_deleted);
            Arc::new(all)
        };
        Self {
            entries: Arc::new(entries),
            deleted,
            initial: Arc::clone(&self.initial),
        }
    }

    /// Append generated entries. An empty batch returns the input set
    /// unchanged.
    #[must_use]
    pub fn generate(&self, new_entries: Vec<SourceEntry>) -> Self {
        if new_entries.is_empty() {
            return self.clone();
        }
        let mut entries = (*self.entries).clone();
        entries.extend(new_entries);
        Self {
            entries: Arc::new(entries),
            deleted: Arc::clone(&self.deleted),
            initial: Arc::clone(&self.initial),
        }
    }

    /// Diff the current state against the initial snapshot.
    ///
    /// Edits are detected per tree id by reference inequality of the
    /// underlying file. Edited files without provenance are still
    /// reported as changes, alongside an [`UnexplainedChange`] marker.
    #[must_use]
    pub fn changeset(&self) -> (Vec<Changeset>, Vec<UnexplainedChange>) {
        let mut changes = Vec::new();
        let mut unexplained = Vec::new();
        let mut initial_by_id: std::collections::HashMap<TreeId, &SourceEntry> = self
            .initial
            .iter()
            .map(|entry| (entry.file.id(), entry))
            .collect();

        for entry in self.entries.iter() {
            match initial_by_id.remove(&entry.file.id()) {
                None => changes.push(Changeset::Added(entry.clone())),
                Some(before) => {
                    if !same_file(&before.file, &entry.file) {
                        if entry.provenance.is_empty() {
                            unexplained.push(UnexplainedChange {
                                path: entry.file.source_path().display().to_string(),
                            });
                        }
                        changes.push(Changeset::Edited {
                            before: before.clone(),
                            after: entry.clone(),
                        });
                    }
                }
            }
        }

        for entry in self.deleted.iter() {
            if initial_by_id.remove(&entry.file.id()).is_some() {
                changes.push(Changeset::Deleted(entry.clone()));
            }
        }

        // Anything left in the initial map vanished without passing
        // through the deletion path.
        for (_, entry) in initial_by_id {
            unexplained.push(UnexplainedChange {
                path: entry.file.source_path().display().to_string(),
            });
            changes.push(Changeset::Deleted(entry.clone()));
        }

        (changes, unexplained)
    }
}
