//! Change attribution.
//!
//! Provenance travels alongside the source tree, not inside it. Each time
//! a recipe stack edits a file, the stack is recorded against that file's
//! entry; merging is a pure function of the two inputs, so entries stay
//! immutable values.

use remold_recipe::{RecipeDescriptor, RecipeIdentity};
use smallvec::SmallVec;

use crate::stack::RecipeStack;

/// One recorded attribution: the recipe path (root first) that produced
/// or touched a file.
#[derive(Clone, Debug, PartialEq)]
pub struct ProvenanceStack {
    identities: Vec<RecipeIdentity>,
    descriptors: Vec<RecipeDescriptor>,
}

impl ProvenanceStack {
    /// Capture the current path of `stack`.
    #[must_use]
    pub fn of(stack: &RecipeStack) -> Self {
        Self {
            identities: stack.recipes().iter().map(|r| r.identity()).collect(),
            descriptors: stack
                .recipes()
                .iter()
                .map(|r| {
                    RecipeDescriptor::leaf(r.name(), r.display_name(), r.description())
                })
                .collect(),
        }
    }

    /// Root-first identities along the path.
    #[must_use]
    pub fn identities(&self) -> &[RecipeIdentity] {
        &self.identities
    }

    /// Root-first descriptors along the path.
    #[must_use]
    pub fn descriptors(&self) -> &[RecipeDescriptor] {
        &self.descriptors
    }

    /// Name of the recipe at the bottom of the path, the one whose
    /// visitor actually ran.
    #[must_use]
    pub fn terminal_name(&self) -> Option<&str> {
        self.descriptors.last().map(|d| d.name.as_str())
    }
}

/// All attributions accumulated for one file over a run.
///
/// Most files are touched by zero or one stack; the inline capacity
/// keeps the common case off the heap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Provenance {
    stacks: SmallVec<[ProvenanceStack; 2]>,
}

impl Provenance {
    /// No attributions yet.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single attribution.
    #[must_use]
    pub fn single(stack: ProvenanceStack) -> Self {
        Self {
            stacks: SmallVec::from_iter([stack]),
        }
    }

    /// Whether no attribution was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// The recorded attributions, in insertion order.
    #[must_use]
    pub fn stacks(&self) -> &[ProvenanceStack] {
        &self.stacks
    }

    /// This provenance plus `stack`, deduplicated by identity path.
    /// Returns a new value; `self` is untouched.
    #[must_use]
    pub fn merged_with(&self, stack: &ProvenanceStack) -> Self {
        if self
            .stacks
            .iter()
            .any(|existing| existing.identities == stack.identities)
        {
            return self.clone();
        }
        let mut stacks = self.stacks.clone();
        stacks.push(stack.clone());
        Self { stacks }
    }

    /// True when any attribution's terminal recipe has this name.
    #[must_use]
    pub fn touched_by(&self, name: &str) -> bool {
        self.stacks
            .iter()
            .any(|stack| stack.terminal_name() == Some(name))
    }

    /// Merge all attribution paths into a descriptor forest, sharing
    /// common ancestors by name.
    #[must_use]
    pub fn descriptor_tree(&self) -> Vec<RecipeDescriptor> {
        let mut forest: Vec<RecipeDescriptor> = Vec::new();
        for stack in &self.stacks {
            let mut level = &mut forest;
            for descriptor in &stack.descriptors {
                let idx = match level.iter().position(|d| d.name == descriptor.name) {
                    Some(idx) => idx,
                    None => {
                        level.push(RecipeDescriptor::leaf(
                            descriptor.name.clone(),
                            descriptor.display_name.clone(),
                            descriptor.description.clone(),
                        ));
                        level.len() - 1
                    }
                };
                level = &mut level[idx].children;
            }
        }
        forest
    }
}
