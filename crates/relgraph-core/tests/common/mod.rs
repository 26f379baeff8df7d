//! Shared fixture: a small people/companies/tags/pets schema, plus a
//! projects/tasks/subtasks chain, over the in-memory store and activity log.

#![allow(dead_code)]

use std::sync::Arc;

use relgraph_core::validation::MaxEntries;
use relgraph_core::{
    CascadeWriter, Collaborators, ColumnDescriptor, EntryService, Fragment, RelationshipHydrator,
    SchemaRegistry, StaticActor, TableSchema, ValidatorRegistry,
};
use relgraph_state::fakes::{MemoryActivityLog, MemoryRowStore};
use serde_json::Value;

pub const ACTOR: i64 = 7;

pub fn frag(value: Value) -> Fragment {
    value.as_object().cloned().expect("object literal")
}

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_table(TableSchema::new(
            "people",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("active", "TINYINT"),
                ColumnDescriptor::new("name", "VARCHAR").as_master(),
                ColumnDescriptor::new("bio", "TEXT"),
                ColumnDescriptor::many_to_one("company", "companies"),
                ColumnDescriptor::many_to_many("tags", "tags", "people_tags", "person_id", "tag_id")
                    .with_ui("checkboxes"),
                ColumnDescriptor::one_to_many("pets", "pets", "owner"),
            ],
        ))
        .with_table(TableSchema::new(
            "companies",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("name", "VARCHAR"),
            ],
        ))
        .with_table(TableSchema::new(
            "tags",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("label", "VARCHAR"),
            ],
        ))
        .with_table(TableSchema::new(
            "people_tags",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("person_id", "INT"),
                ColumnDescriptor::new("tag_id", "INT"),
                ColumnDescriptor::new("sort", "INT"),
            ],
        ))
        .with_table(TableSchema::new(
            "pets",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("name", "VARCHAR"),
                ColumnDescriptor::many_to_one("owner", "people"),
                ColumnDescriptor::new("born", "DATETIME"),
            ],
        ))
        .with_table(TableSchema::new(
            "projects",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("title", "VARCHAR"),
                ColumnDescriptor::one_to_many("tasks", "tasks", "project_id"),
            ],
        ))
        .with_table(TableSchema::new(
            "tasks",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("title", "VARCHAR"),
                ColumnDescriptor::many_to_one("project_id", "projects"),
                ColumnDescriptor::one_to_many("subtasks", "subtasks", "task_id"),
            ],
        ))
        .with_table(TableSchema::new(
            "subtasks",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("title", "VARCHAR"),
                ColumnDescriptor::many_to_one("task_id", "tasks"),
            ],
        ))
        .with_table(TableSchema::new(
            "notes",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("body", "TEXT"),
                ColumnDescriptor::many_to_one("mentor", "mentors"),
            ],
        ))
        .with_table(TableSchema::new(
            "broken",
            vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("title", "VARCHAR"),
                ColumnDescriptor {
                    junction_table: None,
                    ..ColumnDescriptor::many_to_many("links", "tags", "x", "broken_id", "tag_id")
                },
            ],
        ))
}

pub struct Fixture {
    pub store: Arc<MemoryRowStore>,
    pub log: Arc<MemoryActivityLog>,
    pub collab: Collaborators,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryRowStore::new());
        let log = Arc::new(MemoryActivityLog::new());
        let collab = Collaborators::new(store.clone(), Arc::new(registry()), log.clone())
            .with_actor(Arc::new(StaticActor(Some(ACTOR))));
        Self { store, log, collab }
    }

    /// At most `max` tags per person.
    pub fn with_tag_limit(mut self, max: usize) -> Self {
        let validators = ValidatorRegistry::new().register(
            "checkboxes",
            Arc::new(MaxEntries {
                column: "tags".to_string(),
                max,
            }),
        );
        self.collab = self.collab.with_validators(validators);
        self
    }

    pub fn writer(&self) -> CascadeWriter {
        CascadeWriter::new(self.collab.clone())
    }

    pub fn hydrator(&self) -> RelationshipHydrator {
        RelationshipHydrator::new(self.collab.clone())
    }

    pub fn entries(&self) -> EntryService {
        EntryService::new(self.collab.clone())
    }
}
