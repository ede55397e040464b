use serde_json::Value;

use super::{RevertUnit, row_value};
use crate::statement::Row;

/// DELETE is undone by inserting the before-image back. Columns follow the
/// order of the first snapshot row.
pub(super) fn revert_delete(actual_table: &str, undo_data: &[Row]) -> Option<RevertUnit> {
	let first = undo_data.first()?;
	let columns: Vec<&String> = first.keys().collect();

	let column_list = columns
		.iter()
		.map(|c| c.as_str())
		.collect::<Vec<_>>()
		.join(", ");
	let placeholders = vec!["?"; columns.len()].join(", ");
	let mut result = RevertUnit::new(format!(
		"INSERT INTO {actual_table} ({column_list}) VALUES ({placeholders})"
	));

	for row in undo_data {
		let params: Vec<Value> = columns.iter().map(|c| row_value(row, c)).collect();
		result.parameters.push(params);
	}
	Some(result)
}
