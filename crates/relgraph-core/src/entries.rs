//! Entry listing and lookup on top of the hydrator, plus collection writes.

use relgraph_state::{Direction, Filter, Row, RowId, RowQuery, PRIMARY_KEY};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::cascade::{ActivityMode, CascadeWriter, PersistedRow};
use crate::coerce::{coerce_row, TypeFamily};
use crate::collaborators::Collaborators;
use crate::error::Result;
use crate::hydrate::RelationshipHydrator;
use crate::record::Fragment;
use crate::schema::{TableSchema, SYSTEM_COLUMNS};

pub const DEFAULT_PER_PAGE: usize = 500;

/// Value of the `active` column for each entry state.
pub const STATE_TRASH: i64 = 0;
pub const STATE_ACTIVE: i64 = 1;
pub const STATE_INACTIVE: i64 = 2;

/// Listing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntriesQuery {
    pub order_by: String,
    pub order_direction: Direction,
    /// Requested columns; `None` selects every column
    pub fields: Option<Vec<String>>,
    /// Narrows the projection; system columns always stay
    pub columns_visible: Option<Vec<String>>,
    pub per_page: usize,
    pub page: usize,
    /// Single-entry lookup
    pub id: Option<RowId>,
    pub search: Option<String>,
    /// Allowed `active` states; ignored when the table has no such column
    pub active: Option<Vec<i64>>,
}

impl Default for EntriesQuery {
    fn default() -> Self {
        Self {
            order_by: PRIMARY_KEY.to_string(),
            order_direction: Direction::Desc,
            fields: None,
            columns_visible: None,
            per_page: DEFAULT_PER_PAGE,
            page: 0,
            id: None,
            search: None,
            active: None,
        }
    }
}

impl EntriesQuery {
    pub fn by_id(id: RowId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_active(mut self, states: Vec<i64>) -> Self {
        self.active = Some(states);
        self
    }

    pub fn with_page(mut self, page: usize, per_page: usize) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    pub fn ordered_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order_by = column.into();
        self.order_direction = direction;
        self
    }

    fn offset(&self) -> usize {
        self.page.saturating_mul(self.per_page)
    }
}

/// Row counts per entry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateCounts {
    pub trash: u64,
    pub active: u64,
    pub inactive: u64,
    pub total: u64,
}

/// Totals reported alongside a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryTotals {
    ByState(StateCounts),
    Total { total: u64 },
}

impl EntryTotals {
    pub fn total(&self) -> u64 {
        match self {
            EntryTotals::ByState(counts) => counts.total,
            EntryTotals::Total { total } => *total,
        }
    }
}

/// One page of entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySet {
    #[serde(flatten)]
    pub totals: EntryTotals,
    pub rows: Vec<Row>,
}

/// Outcome of [`EntryService::get_entries`].
#[derive(Debug, Clone, PartialEq)]
pub enum Entries {
    Listing(EntrySet),
    /// Lookup by id; `None` when nothing matched
    Single(Option<Row>),
}

/// Value naming a record: display column, else first non-system column.
pub fn find_record_identifier(schema: &TableSchema, row: &Row) -> Option<String> {
    let column = schema.identifier_column()?;
    match row.get(&column.id)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Generic CRUD over any table of the schema.
#[derive(Clone)]
pub struct EntryService {
    collab: Collaborators,
    writer: CascadeWriter,
    hydrator: RelationshipHydrator,
}

impl EntryService {
    pub fn new(collab: Collaborators) -> Self {
        Self {
            writer: CascadeWriter::new(collab.clone()),
            hydrator: RelationshipHydrator::new(collab.clone()),
            collab,
        }
    }

    pub fn writer(&self) -> &CascadeWriter {
        &self.writer
    }

    pub fn hydrator(&self) -> &RelationshipHydrator {
        &self.hydrator
    }

    /// List a page of entries, or look one up when `query.id` is set.
    pub async fn get_entries(&self, table: &str, query: &EntriesQuery) -> Result<Entries> {
        let schema = self.collab.table(table)?;
        let select = self.entries_select(&schema, query);
        debug!(table = %table, page = query.page, per_page = query.per_page, "listing entries");

        let rows: Vec<Row> = self
            .collab
            .store
            .select(&select)
            .await?
            .into_iter()
            .map(|row| coerce_row(&schema, row))
            .collect();
        let mut rows = self.hydrator.hydrate_many_to_one(&schema, rows).await?;

        if query.id.is_some() {
            if rows.is_empty() {
                return Ok(Entries::Single(None));
            }
            let row = rows.swap_remove(0);
            let row = self.hydrator.hydrate_row(&schema, row).await?;
            return Ok(Entries::Single(Some(row)));
        }

        let totals = if schema.has_active_column() {
            EntryTotals::ByState(self.count_active(table).await?)
        } else {
            EntryTotals::Total {
                total: self.count_total(table).await?,
            }
        };
        Ok(Entries::Listing(EntrySet { totals, rows }))
    }

    /// Single hydrated entry, `None` when absent.
    pub async fn find_entry(&self, table: &str, id: RowId) -> Result<Option<Row>> {
        match self.get_entries(table, &EntriesQuery::by_id(id)).await? {
            Entries::Single(row) => Ok(row),
            Entries::Listing(_) => Ok(None),
        }
    }

    /// Standalone save of every entry, in order.
    pub async fn update_collection(
        &self,
        table: &str,
        entries: Vec<Fragment>,
    ) -> Result<Vec<PersistedRow>> {
        let mut saved = Vec::with_capacity(entries.len());
        for entry in entries {
            saved.push(
                self.writer
                    .save_record_graph(table, entry, ActivityMode::Standalone)
                    .await?,
            );
        }
        Ok(saved)
    }

    pub async fn count_total(&self, table: &str) -> Result<u64> {
        Ok(self.collab.store.count(&RowQuery::table(table)).await?)
    }

    /// Per-state counts; states with no rows report zero.
    pub async fn count_active(&self, table: &str) -> Result<StateCounts> {
        let mut counts = StateCounts::default();
        for (state, slot) in [
            (STATE_TRASH, &mut counts.trash),
            (STATE_ACTIVE, &mut counts.active),
            (STATE_INACTIVE, &mut counts.inactive),
        ] {
            let query = RowQuery::table(table).filter(Filter::eq("active", state));
            *slot = self.collab.store.count(&query).await?;
        }
        counts.total = counts.trash + counts.active + counts.inactive;
        Ok(counts)
    }

    fn entries_select(&self, schema: &TableSchema, query: &EntriesQuery) -> RowQuery {
        let mut columns = self.collab.readable_columns(schema);
        if let Some(fields) = &query.fields {
            columns.retain(|c| c == PRIMARY_KEY || fields.contains(c));
        }
        if let Some(visible) = &query.columns_visible {
            columns.retain(|c| SYSTEM_COLUMNS.contains(&c.as_str()) || visible.contains(c));
        }

        let mut select = RowQuery::table(&schema.table)
            .columns(columns)
            .group_by(PRIMARY_KEY)
            .order_by(query.order_by.clone(), query.order_direction)
            .limit(query.per_page)
            .offset(query.offset());

        if let (Some(states), true) = (&query.active, schema.has_active_column()) {
            select = select.filter(Filter::is_in(
                "active",
                states.iter().map(|s| Value::from(*s)).collect(),
            ));
        }
        if let Some(id) = query.id {
            select = select.filter(Filter::eq(PRIMARY_KEY, id));
        }
        if let Some(needle) = query.search.as_deref().filter(|s| !s.is_empty()) {
            let searchable: Vec<String> = schema
                .non_alias_columns()
                .filter(|c| TypeFamily::of(&c.storage_type).is_searchable())
                .map(|c| c.id.clone())
                .collect();
            select = select.filter(Filter::contains_any(searchable, needle));
        }
        select
    }
}

