//! Append-only tabular diagnostics.
//!
//! Recipes and the engine report structured rows into named tables. Rows
//! are serialized eagerly and flushed into the final run report; the
//! engine never interprets row contents.

use crate::context::ExecutionContext;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Identity of a data table. Equality and hashing are by name alone so a
/// table declared in two places still collects into one row set.
#[derive(Debug, Clone, Serialize)]
pub struct DataTableDescriptor {
    /// Stable machine name, e.g. `remold.table.SourceFileErrors`.
    pub name: String,
    /// Human-readable name.
    pub display_name: String,
    /// What the rows mean.
    pub description: String,
}

impl DataTableDescriptor {
    /// Create a descriptor.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
        }
    }
}

impl PartialEq for DataTableDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for DataTableDescriptor {}

impl Hash for DataTableDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// A typed handle for inserting rows of `R` into one table.
#[derive(Debug)]
pub struct DataTable<R> {
    descriptor: DataTableDescriptor,
    _row: PhantomData<fn() -> R>,
}

impl<R: Serialize> DataTable<R> {
    /// Declare a table.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: DataTableDescriptor::new(name, display_name, description),
            _row: PhantomData,
        }
    }

    /// The table's identity.
    #[must_use]
    pub fn descriptor(&self) -> &DataTableDescriptor {
        &self.descriptor
    }

    /// Append one row. Unserializable rows are dropped with a warning
    /// rather than failing the caller.
    pub fn insert_row(&self, ctx: &ExecutionContext, row: &R) {
        match serde_json::to_value(row) {
            Ok(value) => ctx.data_tables().insert(&self.descriptor, value),
            Err(error) => {
                tracing::warn!(table = %self.descriptor.name, %error, "dropping unserializable row");
            }
        }
    }
}

/// Run-scoped store of all rows inserted into all tables.
#[derive(Debug, Default)]
pub struct DataTableStore {
    rows: DashMap<DataTableDescriptor, Vec<serde_json::Value>>,
}

impl DataTableStore {
    /// Append a serialized row under the table's descriptor.
    pub fn insert(&self, descriptor: &DataTableDescriptor, row: serde_json::Value) {
        self.rows.entry(descriptor.clone()).or_default().push(row);
    }

    /// Number of rows in the named table.
    #[must_use]
    pub fn row_count(&self, table_name: &str) -> usize {
        self.rows
            .iter()
            .find(|entry| entry.key().name == table_name)
            .map_or(0, |entry| entry.value().len())
    }

    /// Snapshot of all tables, ordered by table name.
    #[must_use]
    pub fn snapshot(&self) -> IndexMap<DataTableDescriptor, Vec<serde_json::Value>> {
        let mut tables: Vec<_> = self
            .rows
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        tables.sort_by(|(a, _), (b, _)| a.name.cmp(&b.name));
        tables.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Row {
        path: String,
        count: usize,
    }

    #[test]
    fn descriptor_equality_is_by_name() {
        let a = DataTableDescriptor::new("t", "Table", "first");
        let b = DataTableDescriptor::new("t", "Other display", "second");
        assert_eq!(a, b);
    }

    #[test]
    fn rows_accumulate_under_one_descriptor() {
        let ctx = ExecutionContext::new();
        let table: DataTable<Row> = DataTable::new("t", "Table", "rows");

        table.insert_row(
            &ctx,
            &Row {
                path: "a.txt".into(),
                count: 1,
            },
        );
        table.insert_row(
            &ctx,
            &Row {
                path: "b.txt".into(),
                count: 2,
            },
        );

        assert_eq!(ctx.data_tables().row_count("t"), 2);
        let snapshot = ctx.data_tables().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[table.descriptor()][0]["path"], "a.txt");
    }

    #[test]
    fn snapshot_is_ordered_by_table_name() {
        let ctx = ExecutionContext::new();
        DataTable::<Row>::new("zz", "Z", "").insert_row(
            &ctx,
            &Row {
                path: "z".into(),
                count: 0,
            },
        );
        DataTable::<Row>::new("aa", "A", "").insert_row(
            &ctx,
            &Row {
                path: "a".into(),
                count: 0,
            },
        );

        let names: Vec<_> = ctx
            .data_tables()
            .snapshot()
            .keys()
            .map(|d| d.name.clone())
            .collect();
        assert_eq!(names, vec!["aa".to_string(), "zz".to_string()]);
    }
}
