use serde_json::Value;
use tracing::warn;

use super::{RevertUnit, key_predicate};
use crate::statement::{InsertStatement, ValueExpr};

/// INSERT is undone by deleting the inserted rows by primary key.
pub(super) fn revert_insert(
	actual_table: &str,
	primary_keys: &[String],
	statement: &InsertStatement,
	parameters: &[Value],
) -> Option<RevertUnit> {
	match &statement.generated_key_column {
		Some(column) => revert_generated_keys(actual_table, column, statement.values.len(), parameters),
		None => revert_supplied_keys(actual_table, primary_keys, statement, parameters),
	}
}

/// The sharding layer appends the generated key as the last parameter of
/// every batch row, so row `i` finds its key at `(i + 1) * (P / B) - 1`.
fn revert_generated_keys(
	actual_table: &str,
	key_column: &str,
	batch_size: usize,
	parameters: &[Value],
) -> Option<RevertUnit> {
	if batch_size == 0 || parameters.is_empty() || parameters.len() % batch_size != 0 {
		warn!(
			table = %actual_table,
			batch_size,
			parameter_count = parameters.len(),
			"generated keys not found in insert parameters, skipping revert"
		);
		return None;
	}
	let row_width = parameters.len() / batch_size;

	let mut result = RevertUnit::new(format!("DELETE FROM {actual_table} WHERE {key_column} = ?"));
	for i in 0..batch_size {
		let key_index = (i + 1) * row_width - 1;
		result.parameters.push(vec![parameters[key_index].clone()]);
	}
	Some(result)
}

fn revert_supplied_keys(
	actual_table: &str,
	primary_keys: &[String],
	statement: &InsertStatement,
	parameters: &[Value],
) -> Option<RevertUnit> {
	let mut params = parameters.iter();
	let mut result = RevertUnit::new(format!(
		"DELETE FROM {actual_table} WHERE {}",
		key_predicate(primary_keys)
	));

	for row in &statement.values {
		// Bind every value of the row so placeholders stay aligned across rows.
		let bound: Vec<Option<Value>> = row
			.iter()
			.map(|expr| match expr {
				ValueExpr::Placeholder => params.next().cloned(),
				ValueExpr::Literal(v) => Some(v.clone()),
			})
			.collect();

		let keys: Option<Vec<Value>> = primary_keys
			.iter()
			.map(|key| {
				statement
					.columns
					.iter()
					.position(|c| c.eq_ignore_ascii_case(key))
					.and_then(|idx| bound.get(idx).cloned().flatten())
			})
			.collect();

		match keys {
			Some(keys) => result.parameters.push(keys),
			None => {
				warn!(
					table = %actual_table,
					"primary key value missing from insert, skipping revert"
				);
				return None;
			},
		}
	}
	Some(result)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn keys(names: &[&str]) -> Vec<String> {
		names.iter().map(|s| s.to_string()).collect()
	}

	fn insert(columns: &[&str], values: Vec<Vec<ValueExpr>>, generated: Option<&str>) -> InsertStatement {
		InsertStatement {
			table: "t".to_string(),
			columns: keys(columns),
			values,
			generated_key_column: generated.map(str::to_string),
		}
	}

	#[test]
	fn test_generated_keys_batch() {
		let statement = insert(
			&["name"],
			vec![vec![ValueExpr::Placeholder], vec![ValueExpr::Placeholder]],
			Some("id"),
		);
		let params = [json!("a"), json!(101), json!("b"), json!(102)];

		let unit = revert_insert("t_1", &keys(&["id"]), &statement, &params).unwrap();
		assert_eq!(unit.sql, "DELETE FROM t_1 WHERE id = ?");
		assert_eq!(unit.parameters, vec![vec![json!(101)], vec![json!(102)]]);
	}

	#[test]
	fn test_generated_keys_use_row_width_offsets() {
		// Three rows of three parameters each: keys sit at 2, 5 and 8.
		let row = vec![ValueExpr::Placeholder, ValueExpr::Placeholder];
		let statement = insert(&["a", "b"], vec![row.clone(), row.clone(), row], Some("id"));
		let params: Vec<Value> = (0..9).map(|i| json!(i)).collect();

		let unit = revert_insert("t_1", &keys(&["id"]), &statement, &params).unwrap();
		assert_eq!(unit.parameters.len(), 3);
		assert_eq!(
			unit.parameters,
			vec![vec![json!(2)], vec![json!(5)], vec![json!(8)]]
		);
	}

	#[test]
	fn test_generated_keys_absent_is_noop() {
		let statement = insert(&["name"], vec![vec![ValueExpr::Literal(json!("a"))]], Some("id"));
		assert_eq!(revert_insert("t_1", &keys(&["id"]), &statement, &[]), None);
	}

	#[test]
	fn test_generated_keys_uneven_parameters_is_noop() {
		let statement = insert(
			&["name"],
			vec![vec![ValueExpr::Placeholder], vec![ValueExpr::Placeholder]],
			Some("id"),
		);
		let params = [json!("a"), json!(1), json!("b")];
		assert_eq!(revert_insert("t_1", &keys(&["id"]), &statement, &params), None);
	}

	#[test]
	fn test_supplied_keys_from_placeholders() {
		let statement = insert(
			&["id", "name"],
			vec![
				vec![ValueExpr::Placeholder, ValueExpr::Placeholder],
				vec![ValueExpr::Placeholder, ValueExpr::Placeholder],
			],
			None,
		);
		let params = [json!(1), json!("a"), json!(2), json!("b")];

		let unit = revert_insert("t_1", &keys(&["id"]), &statement, &params).unwrap();
		assert_eq!(unit.sql, "DELETE FROM t_1 WHERE id = ?");
		assert_eq!(unit.parameters, vec![vec![json!(1)], vec![json!(2)]]);
	}

	#[test]
	fn test_supplied_composite_keys_mixed_literals() {
		let statement = insert(
			&["name", "order_id", "item_id"],
			vec![vec![
				ValueExpr::Placeholder,
				ValueExpr::Literal(json!(10)),
				ValueExpr::Placeholder,
			]],
			None,
		);
		let params = [json!("widget"), json!(7)];

		let unit = revert_insert("t_item_0", &keys(&["item_id", "order_id"]), &statement, &params).unwrap();
		assert_eq!(unit.sql, "DELETE FROM t_item_0 WHERE item_id = ? AND order_id = ?");
		assert_eq!(unit.parameters, vec![vec![json!(7), json!(10)]]);
	}

	#[test]
	fn test_supplied_keys_without_rows_is_empty_unit() {
		let statement = insert(&["id", "name"], vec![], None);
		let unit = revert_insert("t_1", &keys(&["id"]), &statement, &[]).unwrap();
		assert_eq!(unit.sql, "DELETE FROM t_1 WHERE id = ?");
		assert!(unit.parameters.is_empty());
		assert!(unit.is_noop());
	}

	#[test]
	fn test_supplied_key_missing_from_columns_is_noop() {
		let statement = insert(&["name"], vec![vec![ValueExpr::Placeholder]], None);
		assert_eq!(
			revert_insert("t_1", &keys(&["id"]), &statement, &[json!("a")]),
			None
		);
	}
}
