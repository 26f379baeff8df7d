//! Structured observability hooks for cascade saves.
//!
//! Top-level saves run inside a `relgraph.save` span carrying a request id;
//! every row written below it logs a `row.written` event at `debug!`.
//! For JSON output, initialise tracing with `LogFormat::Json`.

use relgraph_state::{ActivityAction, RowId};
use tracing::{debug, info, warn};

use crate::cascade::ActivityMode;

/// Span covering one top-level save.
pub fn save_span(request_id: &str, table: &str) -> tracing::Span {
    tracing::info_span!("relgraph.save", request_id = %request_id, table = %table)
}

/// Emit event: top-level save started.
///
/// ```ignore
/// emit_save_started("9f1c...", "people", ActivityMode::Standalone);
/// // logs: event=save.started request_id=9f1c... table=people mode=Standalone
/// ```
pub fn emit_save_started(request_id: &str, table: &str, mode: ActivityMode) {
    info!(event = "save.started", request_id = %request_id, table = %table, mode = ?mode);
}

/// Emit event: top-level save finished.
pub fn emit_save_finished(
    request_id: &str,
    table: &str,
    row_id: Option<RowId>,
    relationships_changed: bool,
) {
    info!(
        event = "save.finished",
        request_id = %request_id,
        table = %table,
        row_id = ?row_id,
        relationships_changed = relationships_changed,
    );
}

pub fn emit_row_written(table: &str, row_id: RowId, action: ActivityAction) {
    debug!(event = "row.written", table = %table, row_id = row_id, action = ?action);
}

/// Emit event: a junction row was deleted to disassociate two records.
pub fn emit_junction_removed(junction_table: &str, junction_id: RowId, removed: u64) {
    debug!(
        event = "junction.removed",
        table = %junction_table,
        junction_id = junction_id,
        removed = removed,
    );
}

/// Emit event: a to-one payload was dropped because its related table is
/// unknown (warning level).
pub fn emit_to_one_dropped(table: &str, column: &str, related_table: &str) {
    warn!(
        event = "to_one.dropped",
        table = %table,
        column = %column,
        related_table = %related_table,
    );
}

/// Emit event: activity entries written for a top-level record.
pub fn emit_activity_flushed(table: &str, row_id: RowId, nested: usize) {
    info!(event = "activity.flushed", table = %table, row_id = row_id, nested = nested);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_row_written_inside_save_span() {
        let span = save_span("req-1", "people");
        let _entered = span.enter();
        emit_row_written("people", 1, ActivityAction::Add);

        assert!(logs_contain("row.written"));
        assert!(logs_contain("relgraph.save"));
        assert!(logs_contain("req-1"));
    }

    #[traced_test]
    #[test]
    fn test_to_one_dropped_names_related_table() {
        emit_to_one_dropped("notes", "mentor", "mentors");

        assert!(logs_contain("to_one.dropped"));
        assert!(logs_contain("mentors"));
    }

    #[traced_test]
    #[test]
    fn test_save_lifecycle_events() {
        emit_save_started("req-2", "people", ActivityMode::NestedChild);
        emit_save_finished("req-2", "people", Some(4), true);

        assert!(logs_contain("save.started"));
        assert!(logs_contain("NestedChild"));
        assert!(logs_contain("save.finished"));
    }
}
