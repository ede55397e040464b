use indexmap::IndexMap;
use serde_json::Value;

use super::{RevertUnit, key_predicate, row_value};
use crate::statement::Row;

/// UPDATE is undone by setting every assigned column back to its
/// before-image, one parameter row per snapshot row.
///
/// The revert locates each row by its post-update key: when the forward
/// statement assigned a primary key column, the WHERE value is the new value
/// rather than the snapshot one.
pub(super) fn revert_update(
	actual_table: &str,
	primary_keys: &[String],
	assignments: &IndexMap<String, Option<Value>>,
	undo_data: &[Row],
) -> Option<RevertUnit> {
	if undo_data.is_empty() {
		return None;
	}

	let set_clause = assignments
		.keys()
		.map(|column| format!("{column} = ?"))
		.collect::<Vec<_>>()
		.join(", ");
	let mut result = RevertUnit::new(format!(
		"UPDATE {actual_table} SET {set_clause} WHERE {}",
		key_predicate(primary_keys)
	));

	for row in undo_data {
		let mut params: Vec<Value> = assignments
			.keys()
			.map(|column| row_value(row, column))
			.collect();
		for key in primary_keys {
			let new_value = assignments
				.iter()
				.find(|(column, _)| column.eq_ignore_ascii_case(key))
				.and_then(|(_, value)| value.clone());
			params.push(new_value.unwrap_or_else(|| row_value(row, key)));
		}
		result.parameters.push(params);
	}
	Some(result)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn row(pairs: &[(&str, Value)]) -> Row {
		pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.clone()))
			.collect()
	}

	#[test]
	fn test_empty_snapshot_is_noop() {
		let assignments = IndexMap::from([("name".to_string(), Some(json!("b")))]);
		assert_eq!(revert_update("t_1", &["id".to_string()], &assignments, &[]), None);
	}

	#[test]
	fn test_restores_before_image() {
		let assignments = IndexMap::from([("name".to_string(), Some(json!("b")))]);
		let undo = vec![row(&[("id", json!(1)), ("name", json!("a"))])];

		let unit = revert_update("t_1", &["id".to_string()], &assignments, &undo).unwrap();
		assert_eq!(unit.sql, "UPDATE t_1 SET name = ? WHERE id = ?");
		assert_eq!(unit.parameters, vec![vec![json!("a"), json!(1)]]);
	}

	#[test]
	fn test_updated_primary_key_uses_new_value() {
		let assignments = IndexMap::from([
			("id".to_string(), Some(json!(20))),
			("name".to_string(), Some(json!("b"))),
		]);
		let undo = vec![row(&[("id", json!(2)), ("name", json!("a"))])];

		let unit = revert_update("t_1", &["id".to_string()], &assignments, &undo).unwrap();
		assert_eq!(unit.sql, "UPDATE t_1 SET id = ?, name = ? WHERE id = ?");
		// SET restores the old key, WHERE finds the row by the new one.
		assert_eq!(unit.parameters, vec![vec![json!(2), json!("a"), json!(20)]]);
	}

	#[test]
	fn test_one_parameter_row_per_snapshot_row() {
		let assignments = IndexMap::from([("status".to_string(), Some(json!("DONE")))]);
		let undo = vec![
			row(&[("order_id", json!(1)), ("user_id", json!(9)), ("status", json!("NEW"))]),
			row(&[("order_id", json!(2)), ("user_id", json!(9)), ("status", json!("PAID"))]),
		];
		let keys = ["order_id".to_string(), "user_id".to_string()];

		let unit = revert_update("t_order_1", &keys, &assignments, &undo).unwrap();
		assert_eq!(
			unit.sql,
			"UPDATE t_order_1 SET status = ? WHERE order_id = ? AND user_id = ?"
		);
		assert_eq!(
			unit.parameters,
			vec![
				vec![json!("NEW"), json!(1), json!(9)],
				vec![json!("PAID"), json!(2), json!(9)],
			]
		);
	}

	#[test]
	fn test_unbound_key_assignment_falls_back_to_snapshot() {
		let assignments = IndexMap::from([("id".to_string(), None)]);
		let undo = vec![row(&[("id", json!(5))])];

		let unit = revert_update("t_1", &["id".to_string()], &assignments, &undo).unwrap();
		assert_eq!(unit.parameters, vec![vec![json!(5), json!(5)]]);
	}
}
