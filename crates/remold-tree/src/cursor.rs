//! Ephemeral traversal cursors.
//!
//! A cursor is a singly-linked parent chain built while visiting a tree.
//! It is reconstructed per top-level visit and never persisted. The chain
//! bottoms out at a sentinel root whose [`RootScope`] carries caches that
//! are shared by reference across all files and phases of one cycle, so
//! the scope must tolerate concurrent reads and occasional writes.

use crate::tree::TreeId;
use dashmap::DashMap;
use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

type ScopeValue = Arc<dyn Any + Send + Sync>;

/// Shared scratch state rooted at the cursor sentinel.
pub struct RootScope {
    messages: DashMap<String, ScopeValue>,
}

impl RootScope {
    fn new() -> Self {
        Self {
            messages: DashMap::new(),
        }
    }

    /// Look up a typed value. `None` when absent or of another type.
    #[must_use]
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.messages
            .get(key)
            .and_then(|v| Arc::clone(v.value()).downcast::<T>().ok())
    }

    /// Store a value under `key`, replacing any previous one.
    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.messages.insert(key.to_string(), Arc::new(value));
    }

    /// Fetch the value under `key`, inserting the supplier's result first
    /// if the key is absent. `None` when an existing value has a
    /// different type.
    pub fn get_or_insert_with<T, F>(&self, key: &str, supplier: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let entry = self
            .messages
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(supplier()) as ScopeValue);
        Arc::clone(entry.value()).downcast::<T>().ok()
    }
}

impl Debug for RootScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootScope")
            .field("messages", &self.messages.len())
            .finish()
    }
}

/// One link in a traversal's parent chain.
#[derive(Debug)]
pub struct Cursor {
    parent: Option<Arc<Cursor>>,
    value: CursorValue,
}

#[derive(Debug)]
enum CursorValue {
    Root(RootScope),
    Tree(TreeId),
}

impl Cursor {
    /// Build a sentinel root cursor with an empty shared scope.
    #[must_use]
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            value: CursorValue::Root(RootScope::new()),
        })
    }

    /// Extend the chain with a child positioned at `id`.
    #[must_use]
    pub fn child(self: &Arc<Self>, id: TreeId) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(self)),
            value: CursorValue::Tree(id),
        })
    }

    /// Parent link, `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<Cursor>> {
        self.parent.as_ref()
    }

    /// The tree this cursor is positioned at, `None` at the root.
    #[must_use]
    pub fn tree_id(&self) -> Option<TreeId> {
        match self.value {
            CursorValue::Tree(id) => Some(id),
            CursorValue::Root(_) => None,
        }
    }

    /// Ancestor ids from this cursor up to (excluding) the root.
    #[must_use]
    pub fn path_ids(&self) -> Vec<TreeId> {
        let mut ids = Vec::new();
        let mut current = Some(self);
        while let Some(cursor) = current {
            if let Some(id) = cursor.tree_id() {
                ids.push(id);
            }
            current = cursor.parent.as_deref();
        }
        ids
    }

    /// The shared scope at the chain's sentinel root.
    #[must_use]
    pub fn root_scope(&self) -> &RootScope {
        let mut current = self;
        loop {
            match &current.value {
                CursorValue::Root(scope) => return scope,
                CursorValue::Tree(_) => match current.parent.as_deref() {
                    Some(parent) => current = parent,
                    // Chains are only built through child(), which always
                    // starts from root(), so a tree cursor has a parent.
                    None => unreachable!("tree cursor detached from root"),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_ids_walk_to_root() {
        let root = Cursor::root();
        let a = TreeId::random();
        let b = TreeId::random();
        let leaf = root.child(a).child(b);

        assert_eq!(leaf.path_ids(), vec![b, a]);
        assert_eq!(root.path_ids(), Vec::new());
    }

    #[test]
    fn root_scope_shared_through_chain() {
        let root = Cursor::root();
        let leaf = root.child(TreeId::random());

        leaf.root_scope().put("seen", 42usize);
        let seen = root.root_scope().get::<usize>("seen");
        assert_eq!(seen.as_deref(), Some(&42));
    }

    #[test]
    fn scope_get_or_insert_with_runs_supplier_once() {
        let root = Cursor::root();
        let scope = root.root_scope();

        let first = scope.get_or_insert_with("k", || 1usize).unwrap();
        let second = scope.get_or_insert_with("k", || 2usize).unwrap();
        assert_eq!(*first, 1);
        assert_eq!(*second, 1);
    }

    #[test]
    fn scope_type_mismatch_is_none() {
        let root = Cursor::root();
        root.root_scope().put("k", 1usize);
        assert!(root.root_scope().get::<String>("k").is_none());
    }
}
