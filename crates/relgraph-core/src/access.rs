//! Column-level read permissions and actor resolution.

use std::collections::{HashMap, HashSet};

use relgraph_state::{RowId, PRIMARY_KEY};

/// Filters the columns an actor may read from a table.
pub trait AccessControl: Send + Sync {
    /// Subset of `columns` visible to `actor`, in their given order.
    fn visible_columns(&self, table: &str, actor: Option<RowId>, columns: &[String]) -> Vec<String>;
}

/// Every column is readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn visible_columns(&self, _table: &str, _actor: Option<RowId>, columns: &[String]) -> Vec<String> {
        columns.to_vec()
    }
}

/// Per-table read blacklist. The primary key is never hidden.
#[derive(Debug, Clone, Default)]
pub struct ReadBlacklist {
    hidden: HashMap<String, HashSet<String>>,
}

impl ReadBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hide(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.hidden
            .entry(table.into())
            .or_default()
            .insert(column.into());
        self
    }
}

impl AccessControl for ReadBlacklist {
    fn visible_columns(&self, table: &str, _actor: Option<RowId>, columns: &[String]) -> Vec<String> {
        let Some(hidden) = self.hidden.get(table) else {
            return columns.to_vec();
        };
        columns
            .iter()
            .filter(|c| c.as_str() == PRIMARY_KEY || !hidden.contains(c.as_str()))
            .cloned()
            .collect()
    }
}

/// Resolves the user on whose behalf a write happens.
pub trait CurrentActor: Send + Sync {
    fn current_user_id(&self) -> Option<RowId>;
}

/// Fixed actor, e.g. from a CLI flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticActor(pub Option<RowId>);

impl CurrentActor for StaticActor {
    fn current_user_id(&self) -> Option<RowId> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn blacklist_hides_columns_but_keeps_id() {
        let acl = ReadBlacklist::new()
            .hide("people", "salary")
            .hide("people", "id");
        let visible = acl.visible_columns("people", Some(1), &cols(&["id", "name", "salary"]));
        assert_eq!(visible, cols(&["id", "name"]));

        let other = acl.visible_columns("pets", None, &cols(&["id", "salary"]));
        assert_eq!(other, cols(&["id", "salary"]));
    }

    #[test]
    fn static_actor() {
        assert_eq!(StaticActor(Some(4)).current_user_id(), Some(4));
        assert_eq!(StaticActor::default().current_user_id(), None);
    }
}
