//! Core tree and source-file contracts.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{self, Debug, Display, Formatter};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Stable random identifier of a tree node.
///
/// The id survives transformation: an edited file keeps the id of the file
/// it was derived from, while a genuinely new construct (a generated file)
/// gets a fresh id. All identity-keyed bookkeeping in the engine (change
/// detection, result assembly, rename tracking) runs over this id, never
/// over source paths.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TreeId(Uuid);

impl TreeId {
    /// Mint a fresh random id.
    #[inline]
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for TreeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// An immutable, identity-addressed tree node.
///
/// Trees never hold a back-reference to their parent; ancestry is supplied
/// externally via a [`crate::Cursor`] during traversal.
pub trait Tree: Any + Debug + Send + Sync {
    /// Stable identifier, preserved across transformation.
    fn id(&self) -> TreeId;

    /// Downcast access for visitors that know the concrete tree type.
    fn as_any(&self) -> &dyn Any;

    /// Print the tree back to text.
    fn print(&self) -> String;
}

/// Tag describing what kind of file a [`SourceFile`] was parsed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileType(String);

impl FileType {
    /// Create a file type tag.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Tag text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Filesystem attributes a source file carries through transformation.
///
/// Only what diff rendering needs: the file mode is derived from
/// `executable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileAttributes {
    /// Executable bit.
    pub executable: bool,
    /// Read-only bit.
    pub read_only: bool,
}

impl FileAttributes {
    /// Octal file mode string as it appears in a unified diff header.
    #[must_use]
    pub fn mode(&self) -> &'static str {
        if self.executable {
            "100755"
        } else {
            "100644"
        }
    }
}

/// A tree that corresponds to one parsed source file.
pub trait SourceFile: Tree {
    /// Logical file location, relative to the project root.
    fn source_path(&self) -> &Path;

    /// File-type tag.
    fn file_type(&self) -> &FileType;

    /// Filesystem attributes.
    fn attributes(&self) -> FileAttributes;
}

/// Whether two handles point at the very same file object.
///
/// The engine's convergence test relies on unchanged files flowing through
/// a cycle as the *same* allocation, so this is reference equality, not
/// content equality.
#[inline]
#[must_use]
pub fn same_file(a: &Arc<dyn SourceFile>, b: &Arc<dyn SourceFile>) -> bool {
    Arc::ptr_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlainText;

    #[test]
    fn tree_id_random_unique() {
        assert_ne!(TreeId::random(), TreeId::random());
    }

    #[test]
    fn file_attributes_mode() {
        let plain = FileAttributes::default();
        assert_eq!(plain.mode(), "100644");

        let exec = FileAttributes {
            executable: true,
            ..FileAttributes::default()
        };
        assert_eq!(exec.mode(), "100755");
    }

    #[test]
    fn same_file_is_reference_equality() {
        let a: Arc<dyn SourceFile> = Arc::new(PlainText::new("a.txt", "x"));
        let b = Arc::clone(&a);
        let c: Arc<dyn SourceFile> = Arc::new(PlainText::new("a.txt", "x"));

        assert!(same_file(&a, &b));
        assert!(!same_file(&a, &c));
    }
}
