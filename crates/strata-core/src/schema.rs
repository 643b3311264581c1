//! Logical schema metadata
//!
//! Known logic tables with their columns and index names. Used for
//! `TableExists`/`NoSuchTable` checks and to find the table that owns an
//! index when a DDL statement does not name it.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetaData {
    pub name: String,
    pub columns: Vec<String>,
    pub indexes: Vec<String>,
}

impl TableMetaData {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), columns: vec![], indexes: vec![] }
    }

    pub fn with_columns(mut self, columns: &[&str]) -> Self {
        self.columns.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.indexes.push(index.into());
        self
    }

    pub fn contains_index(&self, index: &str) -> bool {
        self.indexes.iter().any(|i| i.eq_ignore_ascii_case(index))
    }
}

/// Tables of one logical database, keyed by lower-cased name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetaData {
    tables: IndexMap<String, TableMetaData>,
}

impl SchemaMetaData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableMetaData) -> Self {
        self.add_table(table);
        self
    }

    pub fn add_table(&mut self, table: TableMetaData) {
        self.tables.insert(table.name.to_ascii_lowercase(), table);
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(&name.to_ascii_lowercase())
    }

    pub fn table(&self, name: &str) -> Option<&TableMetaData> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    /// Logic table owning `index`, if exactly one table declares it
    pub fn find_table_by_index(&self, index: &str) -> Option<&str> {
        let mut owners = self.tables.values().filter(|t| t.contains_index(index));
        let owner = owners.next()?;
        owners.next().is_none().then_some(owner.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup_is_case_insensitive() {
        let schema = SchemaMetaData::new().with_table(TableMetaData::new("t_order").with_columns(&["order_id"]));
        assert!(schema.contains_table("T_ORDER"));
        assert_eq!(schema.table("t_order").map(|t| t.columns.len()), Some(1));
        assert!(!schema.contains_table("t_user"));
    }

    #[test]
    fn test_find_table_by_index() {
        let schema = SchemaMetaData::new()
            .with_table(TableMetaData::new("t_order").with_index("idx_user"))
            .with_table(TableMetaData::new("t_order_item").with_index("idx_item"))
            .with_table(TableMetaData::new("t_user").with_index("idx_item"));

        assert_eq!(schema.find_table_by_index("IDX_USER"), Some("t_order"));
        // ambiguous owner
        assert_eq!(schema.find_table_by_index("idx_item"), None);
        assert_eq!(schema.find_table_by_index("idx_none"), None);
    }
}
