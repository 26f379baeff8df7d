//! Cascade writer: persists a nested record graph.
//!
//! A save runs in a fixed order for every record in the graph:
//!
//! 1. to-one columns are resolved into foreign ids (nested maps upserted)
//! 2. the own row is validated and written when it changed
//! 3. to-many columns are saved recursively as nested children
//! 4. the row is reloaded and the activity entries are emitted
//!
//! Nested children share one [`CascadeContext`]; the top-level call flushes
//! the accumulated entries with `parent_id` set to its own row.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use relgraph_state::{
    value_as_row_id, ActivityAction, ActivityEntry, ActivityType, Filter, Row, RowId,
    PRIMARY_KEY,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, Instrument};

use crate::collaborators::Collaborators;
use crate::entries::find_record_identifier;
use crate::error::{RelgraphError, Result};
use crate::obs;
use crate::record::{
    contains_non_primary_key_data, is_empty_value, is_truthy, primary_key, to_many_entries,
    Fragment,
};
use crate::schema::{
    ColumnDescriptor, ManyToManyLink, OneToManyLink, RelationshipKind, TableSchema,
};

/// How a save reports itself to the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityMode {
    /// Top-level save: writes its own entry plus every nested entry.
    #[default]
    Standalone,
    /// Child of another save: queues one entry on the shared context.
    NestedChild,
    /// Persist without any audit entry.
    Disabled,
}

impl std::str::FromStr for ActivityMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standalone" | "parent" => Ok(ActivityMode::Standalone),
            "nested" | "child" | "nested_child" => Ok(ActivityMode::NestedChild),
            "disabled" | "off" => Ok(ActivityMode::Disabled),
            other => Err(format!("unknown activity mode: {other}")),
        }
    }
}

/// State shared by every level of one cascade.
#[derive(Debug, Default)]
pub struct CascadeContext {
    /// Entries queued by nested saves, flushed by the top-level save
    pub nested_entries: Vec<ActivityEntry>,
    /// Set when a nested collection gained, lost or re-annotated a member
    pub relationships_changed: bool,
}

impl CascadeContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Stored state of a record after a save.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedRow {
    pub table: String,
    pub row: Row,
}

impl PersistedRow {
    pub fn id(&self) -> Option<RowId> {
        self.row.get(PRIMARY_KEY).and_then(value_as_row_id)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.row.get(column)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.row)
    }
}

/// Recursive record-graph writer. One instance serves every table.
#[derive(Clone)]
pub struct CascadeWriter {
    collab: Collaborators,
}

impl CascadeWriter {
    pub fn new(collab: Collaborators) -> Self {
        Self { collab }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collab
    }

    /// Save `fragment` and everything nested in it.
    pub async fn save_record_graph(
        &self,
        table: &str,
        fragment: Fragment,
        mode: ActivityMode,
    ) -> Result<PersistedRow> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let span = obs::save_span(&request_id, table);
        let mut ctx = CascadeContext::new();
        obs::emit_save_started(&request_id, table, mode);
        let saved = self
            .save_with_context(table, fragment, mode, &mut ctx)
            .instrument(span)
            .await?;
        obs::emit_save_finished(&request_id, table, saved.id(), ctx.relationships_changed);
        Ok(saved)
    }

    /// Save with a caller-owned context. Nested-child entries stay on `ctx`.
    pub fn save_with_context<'a>(
        &'a self,
        table: &'a str,
        fragment: Fragment,
        mode: ActivityMode,
        ctx: &'a mut CascadeContext,
    ) -> BoxFuture<'a, Result<PersistedRow>> {
        let span = tracing::debug_span!("relgraph.record", table = %table, mode = ?mode);
        async move {
            let schema = self.collab.table(table)?;
            let submitted = fragment;
            let is_new = primary_key(&submitted).is_none();

            let mut own = self.resolve_to_one(&schema, &submitted).await?;

            let mut own_changed = contains_non_primary_key_data(&own);
            if own_changed {
                self.run_validators(&schema, &submitted, &mut own)?;
                own_changed = contains_non_primary_key_data(&own);
            }

            let row_id = self
                .write_own_row(table, &submitted, &own, is_new, own_changed)
                .await?;

            for column in schema.alias_columns() {
                let Some(payload) = submitted.get(&column.id) else {
                    continue;
                };
                if is_empty_value(payload) {
                    continue;
                }
                self.save_to_many(table, column, row_id, payload, ctx).await?;
            }

            let reloaded = self
                .collab
                .store
                .find_by_id(table, row_id)
                .await?
                .ok_or_else(|| RelgraphError::Consistency {
                    table: table.to_string(),
                    row_id: Some(row_id),
                    state: if is_new { "new" } else { "pre-existing" },
                })?;

            let delta = if is_new {
                Row::new()
            } else {
                own.iter()
                    .filter(|(key, _)| reloaded.contains_key(*key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            };
            let record_changed = is_new || own_changed;

            match mode {
                ActivityMode::NestedChild => {
                    let entry = self.activity_entry(table, &reloaded, delta, row_id, is_new);
                    ctx.nested_entries.push(entry);
                    if is_new {
                        ctx.relationships_changed = true;
                    }
                }
                ActivityMode::Standalone => {
                    if record_changed || ctx.relationships_changed {
                        self.flush_activity(
                            &schema,
                            &reloaded,
                            delta,
                            row_id,
                            is_new,
                            record_changed,
                            ctx,
                        )
                        .await?;
                    } else {
                        debug!(table = %table, row_id, "nothing changed, no activity");
                    }
                }
                ActivityMode::Disabled => {}
            }

            Ok(PersistedRow {
                table: table.to_string(),
                row: reloaded,
            })
        }
        .instrument(span)
        .boxed()
    }

    /// Replace to-one payloads with foreign ids; drop to-many payloads.
    async fn resolve_to_one(&self, schema: &TableSchema, submitted: &Fragment) -> Result<Fragment> {
        let mut own = Fragment::new();
        for (key, value) in submitted {
            match schema.column(key) {
                Some(column) if column.is_alias() => continue,
                Some(column) if column.relationship == RelationshipKind::ManyToOne => {
                    if let Some(resolved) = self.resolve_one(schema, column, value).await? {
                        own.insert(key.clone(), resolved);
                    }
                }
                _ => {
                    own.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(own)
    }

    async fn resolve_one(
        &self,
        schema: &TableSchema,
        column: &ColumnDescriptor,
        value: &Value,
    ) -> Result<Option<Value>> {
        let foreign = match value {
            Value::Object(map) if map.is_empty() => {
                debug!(table = %schema.table, column = %column.id, "empty to-one payload dropped");
                return Ok(None);
            }
            Value::Array(items) if items.is_empty() => {
                debug!(table = %schema.table, column = %column.id, "empty to-one payload dropped");
                return Ok(None);
            }
            Value::Array(_) => {
                return Err(RelgraphError::InvalidPayload {
                    table: schema.table.clone(),
                    reason: format!("to-one column {} holds a sequence", column.id),
                })
            }
            Value::Object(map) => map,
            scalar => return Ok(Some(scalar.clone())),
        };

        let related = match column.related() {
            Some(related) if self.collab.schema.table_schema(related).is_some() => related,
            other => {
                obs::emit_to_one_dropped(&schema.table, &column.id, other.unwrap_or("<unset>"));
                return Ok(None);
            }
        };

        if !contains_non_primary_key_data(foreign) {
            return Ok(foreign.get(PRIMARY_KEY).cloned());
        }
        let id = self.upsert_plain(related, foreign).await?;
        Ok(Some(Value::from(id)))
    }

    /// Single-row insert or update, no cascade and no activity.
    async fn upsert_plain(&self, table: &str, fragment: &Fragment) -> Result<RowId> {
        let mut fields = fragment.clone();
        fields.remove(PRIMARY_KEY);
        match primary_key(fragment) {
            Some(id) => {
                self.collab.store.update(table, id, fields).await?;
                obs::emit_row_written(table, id, ActivityAction::Update);
                Ok(id)
            }
            None => {
                let id = self.collab.store.insert(table, fields).await?;
                obs::emit_row_written(table, id, ActivityAction::Add);
                Ok(id)
            }
        }
    }

    fn run_validators(
        &self,
        schema: &TableSchema,
        submitted: &Fragment,
        own: &mut Fragment,
    ) -> Result<()> {
        if self.collab.validators.is_empty() {
            return Ok(());
        }
        for column in schema.alias_columns() {
            let Some(ui) = column.ui.as_deref() else {
                continue;
            };
            let Some(validator) = self.collab.validators.get(ui) else {
                continue;
            };
            validator
                .validate(submitted, own)
                .map_err(|reason| RelgraphError::Validation {
                    table: schema.table.clone(),
                    column: column.id.clone(),
                    ui: ui.to_string(),
                    reason,
                })?;
            validator.apply(submitted, own);
        }
        Ok(())
    }

    async fn write_own_row(
        &self,
        table: &str,
        submitted: &Fragment,
        own: &Fragment,
        is_new: bool,
        own_changed: bool,
    ) -> Result<RowId> {
        let mut fields = own.clone();
        fields.remove(PRIMARY_KEY);
        match primary_key(submitted) {
            None => {
                let id = self.collab.store.insert(table, fields).await?;
                obs::emit_row_written(table, id, ActivityAction::Add);
                Ok(id)
            }
            Some(id) if own_changed => {
                self.collab.store.update(table, id, fields).await?;
                obs::emit_row_written(table, id, ActivityAction::Update);
                Ok(id)
            }
            Some(id) => {
                debug!(table = %table, row_id = id, is_new, "own row unchanged, not written");
                Ok(id)
            }
        }
    }

    async fn save_to_many(
        &self,
        table: &str,
        column: &ColumnDescriptor,
        parent_id: RowId,
        payload: &Value,
        ctx: &mut CascadeContext,
    ) -> Result<()> {
        match column.relationship {
            RelationshipKind::OneToMany => {
                let link = column.one_to_many_link(table)?;
                self.save_one_to_many(link, parent_id, payload, ctx).await
            }
            RelationshipKind::ManyToMany => {
                let link = column.many_to_many_link(table)?;
                self.save_many_to_many(link, parent_id, payload, ctx).await
            }
            _ => Ok(()),
        }
    }

    async fn save_one_to_many(
        &self,
        link: OneToManyLink<'_>,
        parent_id: RowId,
        payload: &Value,
        ctx: &mut CascadeContext,
    ) -> Result<()> {
        for mut child in to_many_entries(payload) {
            if child.is_empty() {
                continue;
            }
            if !child.contains_key(link.back_reference) {
                child.insert(link.back_reference.to_string(), Value::from(parent_id));
            }
            self.save_with_context(link.related_table, child, ActivityMode::NestedChild, ctx)
                .await?;
        }
        Ok(())
    }

    async fn save_many_to_many(
        &self,
        link: ManyToManyLink<'_>,
        parent_id: RowId,
        payload: &Value,
        ctx: &mut CascadeContext,
    ) -> Result<()> {
        let store = &self.collab.store;
        for entry in to_many_entries(payload) {
            let junction_id = primary_key(&entry);

            if entry.get("active").is_some_and(|a| !is_truthy(a)) {
                if let Some(junction_id) = junction_id {
                    let removed = store
                        .delete_where(
                            link.junction_table,
                            &[Filter::eq(PRIMARY_KEY, junction_id)],
                        )
                        .await?;
                    obs::emit_junction_removed(link.junction_table, junction_id, removed);
                    ctx.relationships_changed = true;
                }
                continue;
            }

            let mut extra = entry.clone();
            extra.remove("data");
            extra.remove(PRIMARY_KEY);

            let data = match entry.get("data") {
                Some(Value::Object(data)) if !data.is_empty() => data.clone(),
                _ => {
                    // Junction-only update of an existing association.
                    if let Some(junction_id) = junction_id {
                        if !extra.is_empty() {
                            store.update(link.junction_table, junction_id, extra).await?;
                            obs::emit_row_written(
                                link.junction_table,
                                junction_id,
                                ActivityAction::Update,
                            );
                            ctx.relationships_changed = true;
                        }
                    }
                    continue;
                }
            };

            let foreign_changed = contains_non_primary_key_data(&data);
            let foreign = self
                .save_with_context(link.related_table, data, ActivityMode::NestedChild, ctx)
                .await?;
            let Some(foreign_id) = foreign.id() else {
                continue;
            };

            let mut junction = extra;
            let extra_changed = !junction.is_empty();
            junction.insert(link.left_key.to_string(), Value::from(parent_id));
            junction.insert(link.right_key.to_string(), Value::from(foreign_id));

            match junction_id {
                None => {
                    let id = store.insert(link.junction_table, junction).await?;
                    obs::emit_row_written(link.junction_table, id, ActivityAction::Add);
                    ctx.relationships_changed = true;
                }
                Some(id) => {
                    let relinked = self.junction_relinked(&link, id, &junction).await?;
                    if relinked || foreign_changed || extra_changed {
                        store.update(link.junction_table, id, junction).await?;
                        obs::emit_row_written(link.junction_table, id, ActivityAction::Update);
                    }
                    if relinked || extra_changed {
                        ctx.relationships_changed = true;
                    }
                }
            }
        }
        Ok(())
    }

    /// Whether the stored junction row points at other endpoints than
    /// `junction`. A missing row counts as relinked so the update surfaces it.
    async fn junction_relinked(
        &self,
        link: &ManyToManyLink<'_>,
        junction_id: RowId,
        junction: &Fragment,
    ) -> Result<bool> {
        let Some(stored) = self
            .collab
            .store
            .find_by_id(link.junction_table, junction_id)
            .await?
        else {
            return Ok(true);
        };
        let differs = |key: &str| {
            let wanted = junction.get(key).and_then(value_as_row_id);
            stored.get(key).and_then(value_as_row_id) != wanted
        };
        Ok(differs(link.left_key) || differs(link.right_key))
    }

    fn activity_entry(
        &self,
        table: &str,
        reloaded: &Row,
        delta: Row,
        row_id: RowId,
        is_new: bool,
    ) -> ActivityEntry {
        ActivityEntry {
            kind: ActivityType::for_table(table),
            table_name: table.to_string(),
            action: if is_new {
                ActivityAction::Add
            } else {
                ActivityAction::Update
            },
            actor_id: self.collab.actor.current_user_id(),
            timestamp: Utc::now(),
            data: Value::Object(reloaded.clone()),
            delta: Value::Object(delta),
            row_id,
            parent_id: None,
            identifier: None,
            parent_changed: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn flush_activity(
        &self,
        schema: &TableSchema,
        reloaded: &Row,
        delta: Row,
        row_id: RowId,
        is_new: bool,
        record_changed: bool,
        ctx: &mut CascadeContext,
    ) -> Result<()> {
        let mut entry = self.activity_entry(&schema.table, reloaded, delta, row_id, is_new);
        entry.identifier = find_record_identifier(schema, reloaded);
        entry.parent_changed = Some(record_changed);
        self.collab.activity.append(entry).await?;

        let nested: Vec<ActivityEntry> = std::mem::take(&mut ctx.nested_entries)
            .into_iter()
            .map(|mut child| {
                child.parent_id = Some(row_id);
                child
            })
            .collect();
        let nested_count = nested.len();
        if !nested.is_empty() {
            self.collab.activity.append_batch(nested).await?;
        }
        obs::emit_activity_flushed(&schema.table, row_id, nested_count);
        Ok(())
    }
}
