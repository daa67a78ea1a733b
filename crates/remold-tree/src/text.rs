//! Plain-text source files.

use crate::tree::{FileAttributes, FileType, SourceFile, Tree, TreeId};
use std::any::Any;
use std::path::{Path, PathBuf};

/// A source file whose tree is just its text.
///
/// All `with_*` constructors preserve the file id, so the result still
/// counts as the same file for change tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainText {
    id: TreeId,
    source_path: PathBuf,
    text: String,
    file_type: FileType,
    attributes: FileAttributes,
}

impl PlainText {
    /// Create a new plain-text file with a fresh id.
    #[must_use]
    pub fn new(source_path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            id: TreeId::random(),
            source_path: source_path.into(),
            text: text.into(),
            file_type: FileType::new("text/plain"),
            attributes: FileAttributes::default(),
        }
    }

    /// The text content.
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the text, preserving the file id.
    #[must_use]
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }

    /// Move the file to a new path (rename), preserving the id.
    #[must_use]
    pub fn with_source_path(&self, source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            ..self.clone()
        }
    }

    /// Replace the filesystem attributes, preserving the id.
    #[must_use]
    pub fn with_attributes(&self, attributes: FileAttributes) -> Self {
        Self {
            attributes,
            ..self.clone()
        }
    }

    /// Downcast a source file to plain text, if that is what it is.
    #[must_use]
    pub fn from_source(file: &dyn SourceFile) -> Option<&PlainText> {
        file.as_any().downcast_ref()
    }
}

impl Tree for PlainText {
    fn id(&self) -> TreeId {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn print(&self) -> String {
        self.text.clone()
    }
}

impl SourceFile for PlainText {
    fn source_path(&self) -> &Path {
        &self.source_path
    }

    fn file_type(&self) -> &FileType {
        &self.file_type
    }

    fn attributes(&self) -> FileAttributes {
        self.attributes
    }
}
