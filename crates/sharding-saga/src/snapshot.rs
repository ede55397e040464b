//! Before-image access for update and delete compensation.

use async_trait::async_trait;
use serde_json::Value;

use crate::statement::Row;

/// Error type for snapshot reads
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to read snapshot of '{table}' on '{datasource}': {message}")]
pub struct AccessError {
	pub datasource: String,
	pub table: String,
	pub message: String,
}

impl AccessError {
	pub fn new(datasource: impl Into<String>, table: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			datasource: datasource.into(),
			table: table.into(),
			message: message.into(),
		}
	}
}

/// Selection of the rows a forward statement is about to mutate.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotQuery {
	pub datasource: String,
	/// Actual (physical) table name
	pub table: String,
	/// The forward statement's WHERE clause, without the keyword
	pub predicate: Option<String>,
	pub parameters: Vec<Value>,
}

impl SnapshotQuery {
	/// Render the query as a `SELECT` for accessors backed by SQL.
	pub fn to_sql(&self) -> String {
		match &self.predicate {
			Some(predicate) => format!("SELECT * FROM {} WHERE {}", self.table, predicate),
			None => format!("SELECT * FROM {}", self.table),
		}
	}
}

/// Reads before-images. Implementations must return rows in a stable order
/// with columns in table order; the revert statements follow that order.
#[async_trait]
pub trait SnapshotAccessor: Send + Sync {
	async fn query_undo_data(&self, query: &SnapshotQuery) -> Result<Vec<Row>, AccessError>;
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_to_sql() {
		let mut query = SnapshotQuery {
			datasource: "ds_0".to_string(),
			table: "t_order_0".to_string(),
			predicate: Some("order_id = ? AND status = 'NEW'".to_string()),
			parameters: vec![json!(7)],
		};
		assert_eq!(
			query.to_sql(),
			"SELECT * FROM t_order_0 WHERE order_id = ? AND status = 'NEW'"
		);

		query.predicate = None;
		assert_eq!(query.to_sql(), "SELECT * FROM t_order_0");
	}

	#[test]
	fn test_access_error_display() {
		let err = AccessError::new("ds_0", "t_order_0", "connection reset");
		assert_eq!(
			err.to_string(),
			"failed to read snapshot of 't_order_0' on 'ds_0': connection reset"
		);
	}
}
