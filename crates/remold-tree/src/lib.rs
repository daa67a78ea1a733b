//! Remold tree model
//!
//! The engine treats source trees as opaque values behind two small traits:
//!
//! - [`Tree`]: an immutable node with a stable random [`TreeId`] that
//!   survives transformation. A transformed node is a *new* object but
//!   conceptually "is" the old one when the id is preserved.
//! - [`SourceFile`]: a tree that corresponds to one parsed file, with a
//!   logical source path and a [`FileType`] tag. Files are identified by
//!   id, never by path, because a path may change (rename) within a run.
//!
//! Per-language parsers and AST shapes live outside this workspace; the
//! only concrete implementation shipped here is [`PlainText`], which is
//! enough for text-level recipes and for exercising the engine.
//!
//! [`Cursor`] is the ephemeral parent chain built during one traversal,
//! rooted at a sentinel that carries shared per-cycle caches.

mod cursor;
mod text;
mod tree;

pub use cursor::{Cursor, RootScope};
pub use text::PlainText;
pub use tree::{same_file, FileAttributes, FileType, SourceFile, Tree, TreeId};
