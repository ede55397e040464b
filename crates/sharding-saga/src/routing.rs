//! Routing output consumed when registering branches.
//!
//! The routing algorithm lives upstream. A [`RoutingResult`] tells us, for
//! every datasource a statement was routed to, which actual table stands in
//! for each logic table. A [`RouteUnit`] is one rewritten statement ready to
//! run on one datasource.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::SagaError;

/// One rewritten statement bound for one datasource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteUnit {
	pub datasource_name: String,
	pub sql: String,
	#[serde(default)]
	pub parameters: Vec<Value>,
}

impl RouteUnit {
	pub fn new(datasource_name: impl Into<String>, sql: impl Into<String>, parameters: Vec<Value>) -> Self {
		Self {
			datasource_name: datasource_name.into(),
			sql: sql.into(),
			parameters,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableUnit {
	pub logic_table_name: String,
	pub actual_table_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingUnit {
	pub datasource_name: String,
	pub table_units: Vec<TableUnit>,
}

impl RoutingUnit {
	pub fn new(datasource_name: impl Into<String>) -> Self {
		Self {
			datasource_name: datasource_name.into(),
			table_units: Vec::new(),
		}
	}

	pub fn with_table(mut self, logic: impl Into<String>, actual: impl Into<String>) -> Self {
		self.table_units.push(TableUnit {
			logic_table_name: logic.into(),
			actual_table_name: actual.into(),
		});
		self
	}
}

/// The full fan-out of one logical statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingResult {
	pub routing_units: Vec<RoutingUnit>,
}

impl RoutingResult {
	pub fn new(routing_units: Vec<RoutingUnit>) -> Self {
		Self { routing_units }
	}

	/// Find the actual table standing in for `logic_table` on `datasource`.
	///
	/// Both names are compared case-insensitively. A miss means the route
	/// units and routing units disagree, which is never retryable.
	pub fn actual_table(&self, datasource: &str, logic_table: &str) -> Result<&str, SagaError> {
		self
			.routing_units
			.iter()
			.find(|unit| unit.datasource_name.eq_ignore_ascii_case(datasource))
			.and_then(|unit| {
				unit
					.table_units
					.iter()
					.find(|t| t.logic_table_name.eq_ignore_ascii_case(logic_table))
			})
			.map(|t| t.actual_table_name.as_str())
			.ok_or_else(|| SagaError::inconsistent_routing(datasource, logic_table))
	}
}
