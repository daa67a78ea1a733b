//! Built-in diagnostic tables the engine reports into.

use once_cell::sync::Lazy;
use remold_recipe::DataTable;
use serde::Serialize;

/// One contained per-file failure.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFileErrorRow {
    /// Path of the file the failure occurred on.
    pub source_path: String,
    /// Name of the failing recipe.
    pub recipe: String,
    /// Rendered error or panic message.
    pub error: String,
}

/// One successful edit of a file by a recipe in a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFileResultRow {
    /// Path of the edited file.
    pub source_path: String,
    /// Name of the editing recipe.
    pub recipe: String,
    /// 1-based cycle in which the edit happened.
    pub cycle: usize,
}

static SOURCE_FILE_ERRORS: Lazy<DataTable<SourceFileErrorRow>> = Lazy::new(|| {
    DataTable::new(
        "remold.table.SourceFileErrors",
        "Source file errors",
        "Contained recipe failures, one row per distinct failure per file.",
    )
});

static SOURCE_FILE_RESULTS: Lazy<DataTable<SourceFileResultRow>> = Lazy::new(|| {
    DataTable::new(
        "remold.table.SourceFileResults",
        "Source file results",
        "Successful per-file edits, one row per recipe, file, and cycle.",
    )
});

/// The table of contained per-file failures.
#[must_use]
pub fn source_file_errors() -> &'static DataTable<SourceFileErrorRow> {
    &SOURCE_FILE_ERRORS
}

/// The table of successful per-file edits.
#[must_use]
pub fn source_file_results() -> &'static DataTable<SourceFileResultRow> {
    &SOURCE_FILE_RESULTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use remold_recipe::ExecutionContext;

    #[test]
    fn error_rows_land_in_the_errors_table() {
        let ctx = ExecutionContext::new();
        source_file_errors().insert_row(
            &ctx,
            &SourceFileErrorRow {
                source_path: "a.txt".into(),
                recipe: "test.Fails".into(),
                error: "boom".into(),
            },
        );

        assert_eq!(
            ctx.data_tables().row_count("remold.table.SourceFileErrors"),
            1
        );
    }

    #[test]
    fn result_rows_carry_the_cycle() {
        let ctx = ExecutionContext::new();
        source_file_results().insert_row(
            &ctx,
            &SourceFileResultRow {
                source_path: "a.txt".into(),
                recipe: "test.Edits".into(),
                cycle: 2,
            },
        );

        let snapshot = ctx.data_tables().snapshot();
        let (_, rows) = snapshot.first().expect("one table");
        assert_eq!(rows[0]["cycle"], 2);
    }
}
