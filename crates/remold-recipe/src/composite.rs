//! Aggregation of recipes into a composite.

use crate::recipe::Recipe;
use std::any::Any;
use std::sync::Arc;

/// A recipe that only aggregates child recipes.
///
/// Its own visitor is a no-op; the children are scheduled depth-first in
/// declaration order.
#[derive(Debug)]
pub struct CompositeRecipe {
    name: String,
    display_name: String,
    description: String,
    recipes: Vec<Arc<dyn Recipe>>,
}

impl CompositeRecipe {
    /// Create an empty composite.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            description: String::new(),
            recipes: Vec::new(),
        }
    }

    /// Set the human-readable name.
    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    /// Set the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Append a child recipe.
    #[must_use]
    pub fn with(mut self, recipe: Arc<dyn Recipe>) -> Self {
        self.recipes.push(recipe);
        self
    }
}

impl Recipe for CompositeRecipe {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn recipe_list(&self) -> Vec<Arc<dyn Recipe>> {
        self.recipes.clone()
    }
}
