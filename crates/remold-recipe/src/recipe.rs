//! The recipe contract.

use crate::context::ExecutionContext;
use crate::scanning::ScanningRecipe;
use crate::validate::Validated;
use crate::visitor::{FileVisitor, NoopVisitor};
use serde::Serialize;
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

/// A named, possibly-parameterized transformation unit.
///
/// A recipe produces a [`FileVisitor`] via [`Recipe::visitor`] and may
/// compose child recipes via [`Recipe::recipe_list`]; children are
/// scheduled depth-first, in list order, after the recipe's own visitor
/// within the same cycle.
///
/// Implementations must be cheap to query: the scheduler re-expands the
/// recipe tree and re-fetches visitors on every cycle.
pub trait Recipe: Debug + Send + Sync {
    /// Stable machine name, e.g. `remold.text.AppendLine`.
    fn name(&self) -> String;

    /// Human-readable name for reporting.
    fn display_name(&self) -> String {
        self.name()
    }

    /// What the recipe does, for reporting.
    fn description(&self) -> String {
        String::new()
    }

    /// Downcast access; also anchors the default instance identity.
    fn as_any(&self) -> &dyn Any;

    /// Gate: whether this recipe's options are well-formed. An invalid
    /// recipe's subtree is skipped for the remainder of the run.
    fn validate(&self, _ctx: &ExecutionContext) -> Validated {
        Validated::valid("all")
    }

    /// Upper bound on the cycles this recipe (and its subtree) may run in.
    fn max_cycles(&self) -> usize {
        usize::MAX
    }

    /// Hint that convergence should continue past the minimum cycle count
    /// even though this recipe keeps changing sources.
    fn causes_another_cycle(&self) -> bool {
        false
    }

    /// Child recipes, scheduled depth-first after this one.
    fn recipe_list(&self) -> Vec<Arc<dyn Recipe>> {
        Vec::new()
    }

    /// The per-file transform. Composite recipes keep the no-op default.
    ///
    /// Scanning recipes are never asked for this visitor; the engine goes
    /// through [`ScanningRecipe::scanner`] and [`ScanningRecipe::editor`]
    /// instead.
    fn visitor(&self) -> Box<dyn FileVisitor> {
        Box::new(NoopVisitor)
    }

    /// Equality key for dedup (Singleton/Unique) and provenance.
    ///
    /// The default is per-instance identity: two separately constructed
    /// recipes never compare equal, so they never deduplicate. Recipes
    /// that want value equality override this with
    /// [`RecipeIdentity::of_options`].
    fn identity(&self) -> RecipeIdentity {
        RecipeIdentity::instance(self.name(), self.as_any())
    }

    /// Scanning-lifecycle hook; `None` for ordinary recipes.
    fn as_scanning(&self) -> Option<&dyn ScanningRecipe> {
        None
    }

    /// Serializable metadata tree for provenance reporting.
    fn descriptor(&self) -> RecipeDescriptor {
        RecipeDescriptor {
            name: self.name(),
            display_name: self.display_name(),
            description: self.description(),
            children: self
                .recipe_list()
                .iter()
                .map(|child| child.descriptor())
                .collect(),
        }
    }
}

/// Canonical equality key of a recipe.
///
/// Identity is either per-instance (the default: the address of the live
/// recipe object, stable for as long as the recipe is held in an `Arc`) or
/// a digest of the recipe's serialized options for recipes that opt in to
/// value equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipeIdentity {
    name: String,
    digest: IdentityDigest,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum IdentityDigest {
    Instance(usize),
    Options([u8; 32]),
}

impl RecipeIdentity {
    /// Instance identity anchored at the recipe object's address.
    #[must_use]
    pub fn instance(name: impl Into<String>, anchor: &dyn Any) -> Self {
        let address = (anchor as *const dyn Any).cast::<()>() as usize;
        Self {
            name: name.into(),
            digest: IdentityDigest::Instance(address),
        }
    }

    /// Value identity over the recipe's serialized options.
    ///
    /// Unserializable options fall back to a digest of the name alone,
    /// with a warning; recipes opting in to value equality should keep
    /// their options serializable.
    #[must_use]
    pub fn of_options<T: Serialize>(name: impl Into<String>, options: &T) -> Self {
        let name = name.into();
        let bytes = match serde_json::to_vec(options) {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(recipe = %name, %error, "recipe options not serializable");
                name.as_bytes().to_vec()
            }
        };
        let mut hasher = blake3::Hasher::new();
        hasher.update(name.as_bytes());
        hasher.update(&bytes);
        Self {
            name,
            digest: IdentityDigest::Options(*hasher.finalize().as_bytes()),
        }
    }

    /// Recipe name this identity belongs to.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this identity participates in value-equality dedup.
    #[must_use]
    pub fn is_value_equal(&self) -> bool {
        matches!(self.digest, IdentityDigest::Options(_))
    }
}

/// Serializable recipe metadata, hierarchical by composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeDescriptor {
    /// Stable machine name.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// What the recipe does.
    pub description: String,
    /// Descriptors of composed child recipes.
    pub children: Vec<RecipeDescriptor>,
}

impl RecipeDescriptor {
    /// A leaf descriptor with no children.
    #[must_use]
    pub fn leaf(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            children: Vec::new(),
        }
    }
}
