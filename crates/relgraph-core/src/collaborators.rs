//! The external services the writer, hydrator and entries reader share.

use std::sync::Arc;

use relgraph_state::{ActivitySink, RowStore};

use crate::access::{AccessControl, AllowAll, CurrentActor, StaticActor};
use crate::error::{RelgraphError, Result};
use crate::schema::{SchemaProvider, TableSchema};
use crate::validation::ValidatorRegistry;

/// Handles to every collaborator. Cheap to clone.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RowStore>,
    pub schema: Arc<dyn SchemaProvider>,
    pub activity: Arc<dyn ActivitySink>,
    pub access: Arc<dyn AccessControl>,
    pub actor: Arc<dyn CurrentActor>,
    pub validators: ValidatorRegistry,
}

impl Collaborators {
    /// Anonymous actor, no read restrictions, no validators.
    pub fn new(
        store: Arc<dyn RowStore>,
        schema: Arc<dyn SchemaProvider>,
        activity: Arc<dyn ActivitySink>,
    ) -> Self {
        Self {
            store,
            schema,
            activity,
            access: Arc::new(AllowAll),
            actor: Arc::new(StaticActor(None)),
            validators: ValidatorRegistry::new(),
        }
    }

    pub fn with_access(mut self, access: Arc<dyn AccessControl>) -> Self {
        self.access = access;
        self
    }

    pub fn with_actor(mut self, actor: Arc<dyn CurrentActor>) -> Self {
        self.actor = actor;
        self
    }

    pub fn with_validators(mut self, validators: ValidatorRegistry) -> Self {
        self.validators = validators;
        self
    }

    /// Schema of `table`, or an unknown-table configuration error.
    pub fn table(&self, table: &str) -> Result<Arc<TableSchema>> {
        self.schema
            .table_schema(table)
            .ok_or_else(|| RelgraphError::UnknownTable(table.to_string()))
    }

    /// Non-alias columns of `table` the current actor may read; the primary
    /// key is always included.
    pub fn readable_columns(&self, schema: &TableSchema) -> Vec<String> {
        let columns = schema.non_alias_column_names();
        let mut visible =
            self.access
                .visible_columns(&schema.table, self.actor.current_user_id(), &columns);
        if !visible.iter().any(|c| c == relgraph_state::PRIMARY_KEY) {
            visible.insert(0, relgraph_state::PRIMARY_KEY.to_string());
        }
        visible
    }
}
