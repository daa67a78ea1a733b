//! Recipe tree flattening.
//!
//! A composite recipe is a tree. Each run flattens it once per cycle into
//! a list of stacks, one per node, where a stack is the path from that
//! node back to the root. Stacks carry the context an edit needs to
//! attribute changes: every ancestor's identity is on the stack.
//!
//! Positions are the pre-order index of each node and are stable across
//! cycles because the tree is flattened the same way every time.

use std::sync::Arc;

use remold_recipe::Recipe;

/// The path from one recipe node up to the root, root first.
#[derive(Clone, Debug)]
pub struct RecipeStack {
    recipes: Arc<[Arc<dyn Recipe>]>,
    position: u64,
}

impl RecipeStack {
    /// The recipe this stack terminates at.
    #[must_use]
    pub fn recipe(&self) -> &Arc<dyn Recipe> {
        self.recipes.last().expect("a stack is never empty")
    }

    /// Root-first path, including the terminal recipe.
    #[must_use]
    pub fn recipes(&self) -> &[Arc<dyn Recipe>] {
        &self.recipes
    }

    /// Pre-order index of the terminal recipe within the flattened tree.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// True when any recipe on this stack has the given identity.
    #[must_use]
    pub fn contains(&self, identity: &remold_recipe::RecipeIdentity) -> bool {
        self.recipes.iter().any(|r| r.identity() == *identity)
    }
}

/// Flatten `root` into pre-order stacks.
///
/// A worklist of partial paths replaces recursion: pop a path, record it
/// with the next pre-order position, push each child's extended path in
/// reverse so children pop in declaration order.
pub fn expand_recipe_stacks(root: &Arc<dyn Recipe>) -> Vec<RecipeStack> {
    let mut out = Vec::new();
    let mut worklist: Vec<Vec<Arc<dyn Recipe>>> = vec![vec![Arc::clone(root)]];

    while let Some(path) = worklist.pop() {
        let recipe = Arc::clone(path.last().expect("worklist paths are never empty"));
        out.push(RecipeStack {
            recipes: path.clone().into(),
            position: out.len() as u64,
        });
        for child in recipe.recipe_list().iter().rev() {
            let mut extended = path.clone();
            extended.push(Arc::clone(child));
            worklist.push(extended);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use remold_recipe::CompositeRecipe;

    #[derive(Debug)]
    struct Leaf(&'static str);

    impl Recipe for Leaf {
        fn name(&self) -> String {
            self.0.to_owned()
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    fn names(stacks: &[RecipeStack]) -> Vec<String> {
        stacks.iter().map(|s| s.recipe().name()).collect()
    }

    #[test]
    fn single_recipe_yields_one_stack() {
        let root: Arc<dyn Recipe> = Arc::new(Leaf("only"));
        let stacks = expand_recipe_stacks(&root);
        assert_eq!(names(&stacks), vec!["only"]);
        assert_eq!(stacks[0].position(), 0);
        assert_eq!(stacks[0].recipes().len(), 1);
    }

    #[test]
    fn expansion_is_pre_order() {
        let inner = CompositeRecipe::new("remold.inner")
            .with(Arc::new(Leaf("b")))
            .with(Arc::new(Leaf("c")));
        let root: Arc<dyn Recipe> = Arc::new(
            CompositeRecipe::new("remold.root")
                .with(Arc::new(Leaf("a")))
                .with(Arc::new(inner))
                .with(Arc::new(Leaf("d"))),
        );

        let stacks = expand_recipe_stacks(&root);
        assert_eq!(
            names(&stacks),
            vec!["remold.root", "a", "remold.inner", "b", "c", "d"]
        );
        for (idx, stack) in stacks.iter().enumerate() {
            assert_eq!(stack.position(), idx as u64);
        }
    }

    #[test]
    fn stacks_carry_the_full_ancestor_path() {
        let root: Arc<dyn Recipe> = Arc::new(
            CompositeRecipe::new("remold.root")
                .with(Arc::new(CompositeRecipe::new("remold.mid").with(Arc::new(Leaf("leaf"))))),
        );

        let stacks = expand_recipe_stacks(&root);
        let leaf = stacks.iter().find(|s| s.recipe().name() == "leaf").unwrap();
        let path: Vec<String> = leaf.recipes().iter().map(|r| r.name()).collect();
        assert_eq!(path, vec!["remold.root", "remold.mid", "leaf"]);
    }

    #[test]
    fn positions_are_stable_across_expansions() {
        let root: Arc<dyn Recipe> = Arc::new(
            CompositeRecipe::new("remold.root")
                .with(Arc::new(Leaf("a")))
                .with(Arc::new(Leaf("b"))),
        );

        let first = expand_recipe_stacks(&root);
        let second = expand_recipe_stacks(&root);
        assert_eq!(names(&first), names(&second));
        for (left, right) in first.iter().zip(second.iter()) {
            assert_eq!(left.position(), right.position());
        }
    }
}
