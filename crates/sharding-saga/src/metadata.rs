//! Table metadata registered before any saga transaction starts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::SagaError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
	pub name: String,
	#[serde(default)]
	pub primary_key: bool,
}

impl ColumnMetadata {
	pub fn new(name: impl Into<String>, primary_key: bool) -> Self {
		Self {
			name: name.into(),
			primary_key,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
	/// Logic table name
	pub name: String,
	pub columns: Vec<ColumnMetadata>,
}

impl TableMetadata {
	pub fn new(name: impl Into<String>, columns: Vec<ColumnMetadata>) -> Self {
		Self {
			name: name.into(),
			columns,
		}
	}

	/// Primary key columns in declaration order.
	pub fn primary_key_columns(&self) -> Vec<String> {
		self
			.columns
			.iter()
			.filter(|c| c.primary_key)
			.map(|c| c.name.clone())
			.collect()
	}
}

/// Primary key lookup for every logic table that may appear in a saga
/// transaction. Table names are matched case-insensitively.
#[derive(Debug, Default)]
pub struct TableMetas {
	primary_keys: HashMap<String, Vec<String>>,
}

impl TableMetas {
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a table. Tables without a primary key cannot be compensated
	/// and are rejected here rather than at statement time.
	pub fn register(&mut self, table: TableMetadata) -> Result<(), SagaError> {
		let keys = table.primary_key_columns();
		if keys.is_empty() {
			return Err(SagaError::MissingPrimaryKey(table.name));
		}
		self.primary_keys.insert(table.name.to_lowercase(), keys);
		Ok(())
	}

	pub fn primary_keys(&self, logic_table: &str) -> Result<&[String], SagaError> {
		self
			.primary_keys
			.get(&logic_table.to_lowercase())
			.map(Vec::as_slice)
			.ok_or_else(|| SagaError::UnknownTable(logic_table.to_string()))
	}

	pub fn len(&self) -> usize {
		self.primary_keys.len()
	}

	pub fn is_empty(&self) -> bool {
		self.primary_keys.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use assert_matches::assert_matches;

	use super::*;

	#[test]
	fn test_rejects_table_without_primary_key() {
		let mut metas = TableMetas::new();
		let table = TableMetadata::new(
			"t_log",
			vec![ColumnMetadata::new("message", false), ColumnMetadata::new("ts", false)],
		);
		assert_matches!(metas.register(table), Err(SagaError::MissingPrimaryKey(name)) if name == "t_log");
		assert!(metas.is_empty());
	}

	#[test]
	fn test_composite_key_keeps_declaration_order() {
		let mut metas = TableMetas::new();
		metas
			.register(TableMetadata::new(
				"t_order_item",
				vec![
					ColumnMetadata::new("item_id", true),
					ColumnMetadata::new("name", false),
					ColumnMetadata::new("order_id", true),
				],
			))
			.unwrap();

		assert_eq!(metas.primary_keys("T_ORDER_ITEM").unwrap(), ["item_id", "order_id"]);
	}

	#[test]
	fn test_unknown_table() {
		let metas = TableMetas::new();
		assert_matches!(metas.primary_keys("missing"), Err(SagaError::UnknownTable(_)));
	}

	#[test]
	fn test_deserialize_metadata() {
		let json = r#"{"name": "t", "columns": [{"name": "id", "primaryKey": true}, {"name": "v"}]}"#;
		let table: TableMetadata = serde_json::from_str(json).unwrap();
		assert_eq!(table.primary_key_columns(), vec!["id".to_string()]);
	}
}
