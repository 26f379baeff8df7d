//! Relationship hydrator: the read-side mirror of the cascade writer.
//!
//! Flat stored rows come back with their relationships expanded into the
//! same nested shape the writer accepts:
//!
//! - many-to-one: the foreign id is replaced by the foreign row (or `null`)
//! - one-to-many: `{"rows": [child, ...]}` ordered by child id
//! - many-to-many: `{"rows": [{"id": junction_id, "sort"?, "data": row}]}`
//!   ordered by junction `sort` (when present), then junction id
//!
//! Every query projects only the columns the current actor may read.

use std::collections::{BTreeSet, HashMap};

use relgraph_state::{
    value_as_row_id, Direction, Filter, Join, Row, RowId, RowQuery, PRIMARY_KEY,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::coerce::coerce_row;
use crate::collaborators::Collaborators;
use crate::error::{RelgraphError, Result};
use crate::schema::{
    ColumnDescriptor, ManyToManyLink, OneToManyLink, RelationshipKind, TableSchema,
};

const JUNCTION_ID_ALIAS: &str = "__junction_id";
const JUNCTION_SORT_ALIAS: &str = "__junction_sort";

/// Expands relationship columns of stored rows.
#[derive(Clone)]
pub struct RelationshipHydrator {
    collab: Collaborators,
}

impl RelationshipHydrator {
    pub fn new(collab: Collaborators) -> Self {
        Self { collab }
    }

    /// Replace every to-one foreign id in `rows` with the foreign row.
    ///
    /// One `IN` query per to-one column; dangling references become `null`.
    pub async fn hydrate_many_to_one(
        &self,
        schema: &TableSchema,
        mut rows: Vec<Row>,
    ) -> Result<Vec<Row>> {
        for column in schema.to_one_columns() {
            let related = to_one_target(schema, column)?;
            let ids: BTreeSet<RowId> = rows
                .iter()
                .filter_map(|row| row.get(&column.id).and_then(value_as_row_id))
                .collect();
            if ids.is_empty() {
                continue;
            }

            let related_schema = self.collab.table(related)?;
            let query = RowQuery::table(related)
                .columns(self.collab.readable_columns(&related_schema))
                .filter(Filter::is_in(
                    PRIMARY_KEY,
                    ids.iter().map(|id| Value::from(*id)).collect(),
                ));
            let found: HashMap<RowId, Row> = self
                .collab
                .store
                .select(&query)
                .await?
                .into_iter()
                .filter_map(|row| {
                    let id = row.get(PRIMARY_KEY).and_then(value_as_row_id)?;
                    Some((id, coerce_row(&related_schema, row)))
                })
                .collect();
            debug!(
                table = %schema.table,
                column = %column.id,
                requested = ids.len(),
                found = found.len(),
                "to-one hydrated"
            );

            for row in &mut rows {
                let Some(value) = row.get_mut(&column.id) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                *value = value_as_row_id(value)
                    .and_then(|id| found.get(&id))
                    .map(|foreign| Value::Object(foreign.clone()))
                    .unwrap_or(Value::Null);
            }
        }
        Ok(rows)
    }

    /// Attach every to-many alias column of `schema` to `row`.
    pub async fn hydrate_row(&self, schema: &TableSchema, mut row: Row) -> Result<Row> {
        let Some(parent_id) = row.get(PRIMARY_KEY).and_then(value_as_row_id) else {
            return Ok(row);
        };
        for column in schema.alias_columns() {
            let hydrated = match column.relationship {
                RelationshipKind::OneToMany => {
                    let link = column.one_to_many_link(&schema.table)?;
                    self.load_one_to_many(link, parent_id).await?
                }
                RelationshipKind::ManyToMany => {
                    let link = column.many_to_many_link(&schema.table)?;
                    self.load_many_to_many(link, parent_id).await?
                }
                _ => continue,
            };
            row.insert(column.id.clone(), hydrated);
        }
        Ok(row)
    }

    /// Children whose back-reference equals `parent_id`, ordered by id.
    pub async fn load_one_to_many(
        &self,
        link: OneToManyLink<'_>,
        parent_id: RowId,
    ) -> Result<Value> {
        let related_schema = self.collab.table(link.related_table)?;
        let query = RowQuery::table(link.related_table)
            .columns(self.collab.readable_columns(&related_schema))
            .filter(Filter::eq(link.back_reference, parent_id))
            .order_by(PRIMARY_KEY, Direction::Asc);
        let rows: Vec<Value> = self
            .collab
            .store
            .select(&query)
            .await?
            .into_iter()
            .map(|row| Value::Object(coerce_row(&related_schema, row)))
            .collect();
        Ok(json!({ "rows": rows }))
    }

    /// Related rows joined through the junction table.
    pub async fn load_many_to_many(
        &self,
        link: ManyToManyLink<'_>,
        parent_id: RowId,
    ) -> Result<Value> {
        let related_schema = self.collab.table(link.related_table)?;
        let junction_has_sort = self
            .collab
            .schema
            .table_schema(link.junction_table)
            .is_some_and(|junction| junction.has_column("sort"));

        let mut joined_columns = vec![(JUNCTION_ID_ALIAS.to_string(), PRIMARY_KEY.to_string())];
        if junction_has_sort {
            joined_columns.push((JUNCTION_SORT_ALIAS.to_string(), "sort".to_string()));
        }

        let mut query = RowQuery::table(link.related_table)
            .columns(self.collab.readable_columns(&related_schema))
            .join(Join {
                table: link.junction_table.to_string(),
                base_column: PRIMARY_KEY.to_string(),
                joined_column: link.right_key.to_string(),
                columns: joined_columns,
            })
            .filter(Filter::eq(
                format!("{}.{}", link.junction_table, link.left_key),
                parent_id,
            ));
        if junction_has_sort {
            query = query.order_by(format!("{}.sort", link.junction_table), Direction::Asc);
        }
        query = query.order_by(
            format!("{}.{}", link.junction_table, PRIMARY_KEY),
            Direction::Asc,
        );

        let mut entries = Vec::new();
        for mut row in self.collab.store.select(&query).await? {
            let junction_id = row.remove(JUNCTION_ID_ALIAS).unwrap_or(Value::Null);
            let sort = row.remove(JUNCTION_SORT_ALIAS);
            let mut entry = Row::new();
            entry.insert(
                PRIMARY_KEY.to_string(),
                value_as_row_id(&junction_id).map(Value::from).unwrap_or(junction_id),
            );
            if let Some(sort) = sort {
                entry.insert("sort".to_string(), sort);
            }
            entry.insert(
                "data".to_string(),
                Value::Object(coerce_row(&related_schema, row)),
            );
            entries.push(Value::Object(entry));
        }
        Ok(json!({ "rows": entries }))
    }
}

fn to_one_target<'a>(schema: &TableSchema, column: &'a ColumnDescriptor) -> Result<&'a str> {
    column
        .related()
        .ok_or_else(|| RelgraphError::RelationshipMetadata {
            table: schema.table.clone(),
            column: column.id.clone(),
            missing: vec!["related_table".to_string()],
        })
}
