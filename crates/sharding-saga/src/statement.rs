//! Parsed DML statement model consumed by the revert synthesizer.
//!
//! Parsing itself happens upstream; these types only carry what the revert
//! rules need.

use indexmap::IndexMap;
use serde_json::Value;

/// One row of a table: column name to value, in column order.
pub type Row = IndexMap<String, Value>;

/// The value side of an insert value or an update assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
	/// A `?` bound from the statement parameters, consumed left to right
	Placeholder,
	/// A literal written into the SQL text
	Literal(Value),
}

/// A mutating statement against a single logic table.
#[derive(Debug, Clone, PartialEq)]
pub enum DmlStatement {
	Insert(InsertStatement),
	Update(UpdateStatement),
	Delete(DeleteStatement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
	pub table: String,
	pub columns: Vec<String>,
	/// One entry per batch row, each aligned with `columns`
	pub values: Vec<Vec<ValueExpr>>,
	/// Set when the key is generated by the sharding layer and appended as the
	/// last parameter of every batch row.
	pub generated_key_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
	pub tables: Vec<String>,
	pub assignments: IndexMap<String, ValueExpr>,
	/// WHERE clause text without the `WHERE` keyword
	pub predicate: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
	pub tables: Vec<String>,
	pub predicate: Option<String>,
}

impl DmlStatement {
	/// The single logic table the statement mutates.
	pub fn logic_table(&self) -> Option<&str> {
		match self {
			DmlStatement::Insert(insert) => Some(insert.table.as_str()),
			DmlStatement::Update(UpdateStatement { tables, .. })
			| DmlStatement::Delete(DeleteStatement { tables, .. }) => match tables.as_slice() {
				[table] => Some(table.as_str()),
				_ => None,
			},
		}
	}

	pub fn predicate(&self) -> Option<&str> {
		match self {
			DmlStatement::Insert(_) => None,
			DmlStatement::Update(update) => update.predicate.as_deref(),
			DmlStatement::Delete(delete) => delete.predicate.as_deref(),
		}
	}

	/// Number of parameters consumed before the WHERE clause.
	fn leading_placeholders(&self) -> usize {
		match self {
			DmlStatement::Insert(insert) => insert
				.values
				.iter()
				.flatten()
				.filter(|v| matches!(v, ValueExpr::Placeholder))
				.count(),
			DmlStatement::Update(update) => update
				.assignments
				.values()
				.filter(|v| matches!(v, ValueExpr::Placeholder))
				.count(),
			DmlStatement::Delete(_) => 0,
		}
	}

	/// The parameters bound to the WHERE clause.
	pub fn predicate_parameters<'a>(&self, parameters: &'a [Value]) -> &'a [Value] {
		if self.predicate().is_none() {
			return &[];
		}
		parameters
			.get(self.leading_placeholders()..)
			.unwrap_or_default()
	}
}

impl UpdateStatement {
	/// Resolve the new value of every assigned column, binding placeholders
	/// from `parameters` in assignment order. A placeholder without a matching
	/// parameter resolves to `None`.
	pub fn resolved_assignments(&self, parameters: &[Value]) -> IndexMap<String, Option<Value>> {
		let mut params = parameters.iter();
		self
			.assignments
			.iter()
			.map(|(column, expr)| {
				let value = match expr {
					ValueExpr::Placeholder => params.next().cloned(),
					ValueExpr::Literal(v) => Some(v.clone()),
				};
				(column.clone(), value)
			})
			.collect()
	}
}
