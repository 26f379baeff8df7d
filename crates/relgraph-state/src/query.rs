//! In-process evaluation of [`RowQuery`]
//!
//! Both the in-memory fake and the SurrealDB store keep rows as opaque JSON
//! documents, so filtering, joining, grouping, ordering and paging are done
//! here once for both of them.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde_json::Value;

use crate::storage_traits::{Direction, Filter, Row, RowQuery, StorageResult};
use crate::StorageError;

/// A base row, optionally paired with the joined row it matched.
struct Scope<'a> {
    table: &'a str,
    base: &'a Row,
    joined: Option<(&'a str, &'a Row)>,
}

impl Scope<'_> {
    fn get(&self, column: &str) -> Option<&Value> {
        match column.split_once('.') {
            Some((prefix, name)) if prefix == self.table => self.base.get(name),
            Some((prefix, name)) => match self.joined {
                Some((table, row)) if table == prefix => row.get(name),
                _ => None,
            },
            None => self.base.get(column),
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality the way a loosely typed SQL driver sees it: `"3"` equals `3`.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => as_text(a) == as_text(b),
        },
    }
}

/// Total order used for `ORDER BY`: missing/null first, numbers
/// numerically, everything else by text.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => as_text(a).cmp(&as_text(b)),
        },
    }
}

fn matches(scope: &Scope<'_>, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { column, value } => {
            loose_eq(scope.get(column).unwrap_or(&Value::Null), value)
        }
        Filter::In { column, values } => {
            let current = scope.get(column).unwrap_or(&Value::Null);
            values.iter().any(|v| loose_eq(current, v))
        }
        Filter::ContainsAny { columns, needle } => {
            let needle = needle.to_lowercase();
            columns.iter().any(|column| {
                scope
                    .get(column)
                    .filter(|v| !v.is_null())
                    .map(|v| as_text(v).to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
        }
    }
}

/// Check a single row against a filter list (no join).
pub fn row_matches(table: &str, row: &Row, filters: &[Filter]) -> bool {
    let scope = Scope {
        table,
        base: row,
        joined: None,
    };
    filters.iter().all(|f| matches(&scope, f))
}

/// Evaluate `query` over the base table rows and, when the query joins,
/// the joined table rows.
pub fn evaluate(query: &RowQuery, base: &[Row], joined: Option<&[Row]>) -> StorageResult<Vec<Row>> {
    let mut scopes: Vec<Scope<'_>> = Vec::new();
    match (&query.join, joined) {
        (Some(join), Some(joined_rows)) => {
            for row in base {
                let Some(key) = row.get(&join.base_column) else {
                    continue;
                };
                for other in joined_rows {
                    let hit = other
                        .get(&join.joined_column)
                        .map(|v| loose_eq(key, v))
                        .unwrap_or(false);
                    if hit {
                        scopes.push(Scope {
                            table: &query.table,
                            base: row,
                            joined: Some((join.table.as_str(), other)),
                        });
                    }
                }
            }
        }
        (Some(join), None) => {
            return Err(StorageError::InvalidQuery {
                table: query.table.clone(),
                reason: format!("join on {} without its rows", join.table),
            });
        }
        (None, _) => {
            scopes.extend(base.iter().map(|row| Scope {
                table: &query.table,
                base: row,
                joined: None,
            }));
        }
    }

    scopes.retain(|scope| query.filters.iter().all(|f| matches(scope, f)));

    if let Some(group) = &query.group_by {
        let mut seen = HashSet::new();
        scopes.retain(|scope| {
            let key = scope.get(group).map(as_text).unwrap_or_default();
            seen.insert(key)
        });
    }

    if !query.order_by.is_empty() {
        scopes.sort_by(|a, b| {
            for (column, direction) in &query.order_by {
                let ord = compare_values(a.get(column), b.get(column));
                let ord = match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }

    let limit = query.limit.unwrap_or(usize::MAX);
    Ok(scopes
        .into_iter()
        .skip(query.offset)
        .take(limit)
        .map(|scope| project(query, &scope))
        .collect())
}

fn project(query: &RowQuery, scope: &Scope<'_>) -> Row {
    let mut out = match &query.columns {
        Some(columns) => columns
            .iter()
            .filter_map(|c| scope.base.get(c).map(|v| (c.clone(), v.clone())))
            .collect(),
        None => scope.base.clone(),
    };
    if let (Some(join), Some((_, joined))) = (&query.join, scope.joined) {
        for (alias, column) in &join.columns {
            out.insert(
                alias.clone(),
                joined.get(column).cloned().unwrap_or(Value::Null),
            );
        }
    }
    out
}
