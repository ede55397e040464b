//! Revert statement synthesis.
//!
//! Every forward mutation gets a compensating statement derived from data read
//! before the mutation ran:
//!
//! | forward | revert | source of values |
//! |---------|--------|------------------|
//! | INSERT  | DELETE by primary key | insert values, or generated keys in the parameters |
//! | UPDATE  | UPDATE back to the before-image | snapshot rows |
//! | DELETE  | INSERT of the before-image | snapshot rows |
//!
//! Synthesis returns `None` when there is legitimately nothing to undo.

mod delete;
mod insert;
mod update;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::statement::{DmlStatement, InsertStatement, Row};

/// A statement that undoes one forward branch, with one parameter row per
/// affected physical row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertUnit {
	pub sql: String,
	pub parameters: Vec<Vec<Value>>,
}

impl RevertUnit {
	pub fn new(sql: impl Into<String>) -> Self {
		Self {
			sql: sql.into(),
			parameters: Vec::new(),
		}
	}

	/// A unit that does nothing when executed.
	pub fn is_noop(&self) -> bool {
		is_noop_revert(&self.sql, &self.parameters)
	}
}

/// A revert with no statement or no parameter rows runs nothing.
pub(crate) fn is_noop_revert(sql: &str, parameters: &[Vec<Value>]) -> bool {
	sql.is_empty() || parameters.is_empty()
}

/// Everything one revert rule needs, per forward statement kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RevertContext {
	Insert {
		actual_table: String,
		primary_keys: Vec<String>,
		statement: InsertStatement,
		parameters: Vec<Value>,
	},
	Update {
		actual_table: String,
		primary_keys: Vec<String>,
		/// New value of every assigned column, `None` if it could not be bound
		assignments: IndexMap<String, Option<Value>>,
		undo_data: Vec<Row>,
	},
	Delete {
		actual_table: String,
		undo_data: Vec<Row>,
	},
}

impl RevertContext {
	/// Build the context for one routed branch of `statement`.
	///
	/// `undo_data` is ignored for inserts, which need no before-image.
	pub fn new(
		statement: &DmlStatement,
		actual_table: impl Into<String>,
		primary_keys: &[String],
		parameters: &[Value],
		undo_data: Vec<Row>,
	) -> Self {
		let actual_table = actual_table.into();
		match statement {
			DmlStatement::Insert(insert) => RevertContext::Insert {
				actual_table,
				primary_keys: primary_keys.to_vec(),
				statement: insert.clone(),
				parameters: parameters.to_vec(),
			},
			DmlStatement::Update(update) => RevertContext::Update {
				actual_table,
				primary_keys: primary_keys.to_vec(),
				assignments: update.resolved_assignments(parameters),
				undo_data,
			},
			DmlStatement::Delete(_) => RevertContext::Delete {
				actual_table,
				undo_data,
			},
		}
	}

	/// Whether building this kind of context requires a before-image.
	pub fn needs_snapshot(statement: &DmlStatement) -> bool {
		!matches!(statement, DmlStatement::Insert(_))
	}

	pub fn synthesize(&self) -> Option<RevertUnit> {
		match self {
			RevertContext::Insert {
				actual_table,
				primary_keys,
				statement,
				parameters,
			} => insert::revert_insert(actual_table, primary_keys, statement, parameters),
			RevertContext::Update {
				actual_table,
				primary_keys,
				assignments,
				undo_data,
			} => update::revert_update(actual_table, primary_keys, assignments, undo_data),
			RevertContext::Delete {
				actual_table,
				undo_data,
			} => delete::revert_delete(actual_table, undo_data),
		}
	}
}

/// `a = ? AND b = ?`
fn key_predicate(keys: &[String]) -> String {
	keys
		.iter()
		.map(|k| format!("{k} = ?"))
		.collect::<Vec<_>>()
		.join(" AND ")
}

/// Look a column up in a snapshot row, falling back to a case-insensitive
/// match since drivers disagree on the case of returned labels.
fn row_value(row: &Row, column: &str) -> Value {
	row
		.get(column)
		.or_else(|| {
			row
				.iter()
				.find(|(name, _)| name.eq_ignore_ascii_case(column))
				.map(|(_, v)| v)
		})
		.cloned()
		.unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::statement::{DeleteStatement, UpdateStatement, ValueExpr};

	#[test]
	fn test_key_predicate() {
		assert_eq!(key_predicate(&["id".to_string()]), "id = ?");
		assert_eq!(
			key_predicate(&["a".to_string(), "b".to_string()]),
			"a = ? AND b = ?"
		);
	}

	#[test]
	fn test_row_value_case_insensitive() {
		let row = Row::from([("ORDER_ID".to_string(), json!(3))]);
		assert_eq!(row_value(&row, "order_id"), json!(3));
		assert_eq!(row_value(&row, "missing"), Value::Null);
	}

	#[test]
	fn test_context_dispatch() {
		let delete = DmlStatement::Delete(DeleteStatement {
			tables: vec!["t".to_string()],
			predicate: Some("id = ?".to_string()),
		});
		assert!(RevertContext::needs_snapshot(&delete));
		let ctx = RevertContext::new(&delete, "t_1", &["id".to_string()], &[json!(1)], vec![]);
		assert!(matches!(ctx, RevertContext::Delete { ref actual_table, .. } if actual_table == "t_1"));

		let update = DmlStatement::Update(UpdateStatement {
			tables: vec!["t".to_string()],
			assignments: IndexMap::from([("name".to_string(), ValueExpr::Placeholder)]),
			predicate: Some("id = ?".to_string()),
		});
		let ctx = RevertContext::new(&update, "t_1", &["id".to_string()], &[json!("b"), json!(1)], vec![]);
		let RevertContext::Update { assignments, .. } = ctx else {
			panic!("Expected Update context");
		};
		assert_eq!(assignments["name"], Some(json!("b")));
	}

	#[test]
	fn test_noop_unit() {
		assert!(RevertUnit::default().is_noop());
		assert!(RevertUnit::new("DELETE FROM t WHERE id = ?").is_noop());
	}
}
