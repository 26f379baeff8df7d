//! Table schema descriptors.
//!
//! A table is an ordered list of [`ColumnDescriptor`]s. Relationship columns
//! carry the metadata the cascade writer and hydrator need to follow them:
//!
//! - many-to-one: `related_table`; the column itself stores the foreign id
//! - one-to-many: `related_table` + `junction_key_right` (back-reference
//!   column on the related table)
//! - many-to-many: `related_table`, `junction_table`, `junction_key_left`
//!   (points at this table), `junction_key_right` (points at the related
//!   table)
//!
//! One-to-many, many-to-many and plain alias columns are never stored on the
//! owning row.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RelgraphError, Result};

/// Columns that are bookkeeping rather than content.
pub const SYSTEM_COLUMNS: &[&str] = &["id", "active", "sort"];

/// How a column relates to another table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    #[default]
    None,
    ManyToOne,
    OneToMany,
    ManyToMany,
    Alias,
}

impl RelationshipKind {
    /// Alias kinds are virtual: never persisted on the owning row.
    pub fn is_alias(self) -> bool {
        matches!(
            self,
            RelationshipKind::OneToMany | RelationshipKind::ManyToMany | RelationshipKind::Alias
        )
    }

    pub fn is_to_many(self) -> bool {
        matches!(self, RelationshipKind::OneToMany | RelationshipKind::ManyToMany)
    }

    fn infer(storage_type: &str) -> Self {
        match storage_type.to_ascii_uppercase().as_str() {
            "ONETOMANY" => RelationshipKind::OneToMany,
            "MANYTOMANY" => RelationshipKind::ManyToMany,
            "ALIAS" => RelationshipKind::Alias,
            _ => RelationshipKind::None,
        }
    }
}

/// One column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub id: String,
    /// Storage type as reported by the database (`INT`, `VARCHAR`, `BLOB`...)
    #[serde(rename = "type", default)]
    pub storage_type: String,
    #[serde(default)]
    pub relationship: RelationshipKind,
    /// UI hint; selects a registered field validator
    #[serde(default)]
    pub ui: Option<String>,
    #[serde(default)]
    pub related_table: Option<String>,
    #[serde(default)]
    pub junction_table: Option<String>,
    #[serde(default)]
    pub junction_key_left: Option<String>,
    #[serde(default)]
    pub junction_key_right: Option<String>,
    /// Display column used to identify a record in the activity log
    #[serde(default)]
    pub master: bool,
}

/// Resolved metadata of a one-to-many column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OneToManyLink<'a> {
    pub related_table: &'a str,
    /// Column on the related table pointing back at the parent
    pub back_reference: &'a str,
}

/// Resolved metadata of a many-to-many column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManyToManyLink<'a> {
    pub related_table: &'a str,
    pub junction_table: &'a str,
    pub left_key: &'a str,
    pub right_key: &'a str,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ColumnDescriptor {
    pub fn new(id: impl Into<String>, storage_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            storage_type: storage_type.into(),
            relationship: RelationshipKind::None,
            ui: None,
            related_table: None,
            junction_table: None,
            junction_key_left: None,
            junction_key_right: None,
            master: false,
        }
    }

    pub fn many_to_one(id: impl Into<String>, related_table: impl Into<String>) -> Self {
        Self {
            relationship: RelationshipKind::ManyToOne,
            related_table: Some(related_table.into()),
            ..Self::new(id, "INT")
        }
    }

    pub fn one_to_many(
        id: impl Into<String>,
        related_table: impl Into<String>,
        back_reference: impl Into<String>,
    ) -> Self {
        Self {
            relationship: RelationshipKind::OneToMany,
            related_table: Some(related_table.into()),
            junction_key_right: Some(back_reference.into()),
            ..Self::new(id, "ONETOMANY")
        }
    }

    pub fn many_to_many(
        id: impl Into<String>,
        related_table: impl Into<String>,
        junction_table: impl Into<String>,
        left_key: impl Into<String>,
        right_key: impl Into<String>,
    ) -> Self {
        Self {
            relationship: RelationshipKind::ManyToMany,
            related_table: Some(related_table.into()),
            junction_table: Some(junction_table.into()),
            junction_key_left: Some(left_key.into()),
            junction_key_right: Some(right_key.into()),
            ..Self::new(id, "MANYTOMANY")
        }
    }

    pub fn with_ui(mut self, ui: impl Into<String>) -> Self {
        self.ui = Some(ui.into());
        self
    }

    pub fn as_master(mut self) -> Self {
        self.master = true;
        self
    }

    pub fn is_alias(&self) -> bool {
        self.relationship.is_alias()
    }

    pub fn is_system(&self) -> bool {
        SYSTEM_COLUMNS.contains(&self.id.as_str())
    }

    /// Related table, when configured.
    pub fn related(&self) -> Option<&str> {
        present(&self.related_table)
    }

    fn missing(
        &self,
        table: &str,
        required: &[(&str, &Option<String>)],
    ) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| present(value).is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RelgraphError::RelationshipMetadata {
                table: table.to_string(),
                column: self.id.clone(),
                missing,
            })
        }
    }

    /// One-to-many metadata, or a configuration error naming what is absent.
    pub fn one_to_many_link(&self, table: &str) -> Result<OneToManyLink<'_>> {
        self.missing(
            table,
            &[
                ("related_table", &self.related_table),
                ("junction_key_right", &self.junction_key_right),
            ],
        )?;
        Ok(OneToManyLink {
            related_table: present(&self.related_table).unwrap_or_default(),
            back_reference: present(&self.junction_key_right).unwrap_or_default(),
        })
    }

    /// Many-to-many metadata, or a configuration error naming what is absent.
    pub fn many_to_many_link(&self, table: &str) -> Result<ManyToManyLink<'_>> {
        self.missing(
            table,
            &[
                ("related_table", &self.related_table),
                ("junction_table", &self.junction_table),
                ("junction_key_left", &self.junction_key_left),
                ("junction_key_right", &self.junction_key_right),
            ],
        )?;
        Ok(ManyToManyLink {
            related_table: present(&self.related_table).unwrap_or_default(),
            junction_table: present(&self.junction_table).unwrap_or_default(),
            left_key: present(&self.junction_key_left).unwrap_or_default(),
            right_key: present(&self.junction_key_right).unwrap_or_default(),
        })
    }
}

/// Ordered column list of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    /// Build a schema; alias kinds are inferred from the storage type when
    /// the relationship was left unset.
    pub fn new(table: impl Into<String>, mut columns: Vec<ColumnDescriptor>) -> Self {
        for column in &mut columns {
            if column.relationship == RelationshipKind::None {
                column.relationship = RelationshipKind::infer(&column.storage_type);
            }
        }
        Self {
            table: table.into(),
            columns,
        }
    }

    pub fn column(&self, id: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.id == id)
    }

    pub fn has_column(&self, id: &str) -> bool {
        self.column(id).is_some()
    }

    pub fn has_active_column(&self) -> bool {
        self.has_column("active")
    }

    /// The column flagged as the display ("master") column.
    pub fn display_column(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.master)
    }

    pub fn first_non_system_column(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| !c.is_system() && !c.is_alias())
    }

    /// Column whose value names a record: the display column, else the
    /// first non-system column.
    pub fn identifier_column(&self) -> Option<&ColumnDescriptor> {
        self.display_column()
            .or_else(|| self.first_non_system_column())
    }

    pub fn alias_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_alias())
    }

    pub fn non_alias_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| !c.is_alias())
    }

    pub fn non_alias_column_names(&self) -> Vec<String> {
        self.non_alias_columns().map(|c| c.id.clone()).collect()
    }

    pub fn to_one_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns
            .iter()
            .filter(|c| c.relationship == RelationshipKind::ManyToOne)
    }
}

/// Source of table schemas.
pub trait SchemaProvider: Send + Sync {
    fn table_schema(&self, table: &str) -> Option<Arc<TableSchema>>;
}

/// Static, in-process schema registry.
///
/// The JSON form maps table names to their ordered column lists:
///
/// ```json
/// { "people": [ {"id": "id", "type": "INT"}, {"id": "name", "type": "VARCHAR", "master": true} ] }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, Arc<TableSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: TableSchema) -> &mut Self {
        self.tables.insert(schema.table.clone(), Arc::new(schema));
        self
    }

    pub fn with_table(mut self, schema: TableSchema) -> Self {
        self.register(schema);
        self
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let raw: HashMap<String, Vec<ColumnDescriptor>> = serde_json::from_str(text)?;
        let mut registry = Self::new();
        for (table, columns) in raw {
            registry.register(TableSchema::new(table, columns));
        }
        Ok(registry)
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl SchemaProvider for SchemaRegistry {
    fn table_schema(&self, table: &str) -> Option<Arc<TableSchema>> {
        self.tables.get(table).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> TableSchema {
        TableSchema::new(
            "people",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("active", "TINYINT"),
                ColumnDescriptor::new("name", "VARCHAR"),
                ColumnDescriptor::new("nick", "VARCHAR").as_master(),
                ColumnDescriptor::many_to_one("company", "companies"),
                ColumnDescriptor::many_to_many("tags", "tags", "people_tags", "person_id", "tag_id"),
            ],
        )
    }

    #[test]
    fn display_column_wins_over_first_content_column() {
        let schema = people();
        assert_eq!(schema.identifier_column().unwrap().id, "nick");

        let plain = TableSchema::new(
            "t",
            vec![ColumnDescriptor::new("id", "INT"), ColumnDescriptor::new("title", "VARCHAR")],
        );
        assert_eq!(plain.identifier_column().unwrap().id, "title");
    }

    #[test]
    fn alias_columns_are_split_out() {
        let schema = people();
        let alias: Vec<&str> = schema.alias_columns().map(|c| c.id.as_str()).collect();
        assert_eq!(alias, vec!["tags"]);
        assert!(!schema.non_alias_column_names().contains(&"tags".to_string()));
        assert!(schema.has_active_column());
    }

    #[test]
    fn relationship_inferred_from_storage_type() {
        let schema = TableSchema::new("t", vec![ColumnDescriptor::new("kids", "onetomany")]);
        assert_eq!(schema.columns[0].relationship, RelationshipKind::OneToMany);
    }

    #[test]
    fn missing_link_metadata_names_every_gap() {
        let mut column = ColumnDescriptor::many_to_many("tags", "tags", " ", "person_id", "tag_id");
        column.junction_key_left = None;
        let err = column.many_to_many_link("people").unwrap_err();
        match err {
            RelgraphError::RelationshipMetadata { missing, .. } => {
                assert_eq!(missing, vec!["junction_table", "junction_key_left"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn registry_loads_from_json() {
        let registry = SchemaRegistry::from_json(
            r#"{
                "pets": [
                    {"id": "id", "type": "INT"},
                    {"id": "owner", "type": "INT", "relationship": "many_to_one", "related_table": "people"},
                    {"id": "toys", "type": "ONETOMANY", "related_table": "toys", "junction_key_right": "pet"}
                ]
            }"#,
        )
        .unwrap();
        let pets = registry.table_schema("pets").unwrap();
        assert_eq!(pets.to_one_columns().count(), 1);
        let link = pets.column("toys").unwrap().one_to_many_link("pets").unwrap();
        assert_eq!(link.back_reference, "pet");
        assert!(registry.table_schema("nope").is_none());
    }
}
