//! In-memory collaborators for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::engine::{CompensationEngine, EngineError, SqlError, SqlExecutor};
use crate::graph::CompensationGraph;
use crate::snapshot::{AccessError, SnapshotAccessor, SnapshotQuery};
use crate::statement::Row;

/// Snapshot accessor serving fixed rows per datasource and actual table.
#[derive(Default)]
pub struct MemorySnapshotAccessor {
	rows: Mutex<HashMap<(String, String), Vec<Row>>>,
	failing: Mutex<HashMap<(String, String), String>>,
	queries: Mutex<Vec<SnapshotQuery>>,
}

impl MemorySnapshotAccessor {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_rows(self, datasource: &str, table: &str, rows: Vec<Row>) -> Self {
		self
			.rows
			.lock()
			.insert((datasource.to_string(), table.to_string()), rows);
		self
	}

	/// Make reads of `table` on `datasource` fail with `message`.
	pub fn fail_on(self, datasource: &str, table: &str, message: &str) -> Self {
		self
			.failing
			.lock()
			.insert((datasource.to_string(), table.to_string()), message.to_string());
		self
	}

	pub fn queries(&self) -> Vec<SnapshotQuery> {
		self.queries.lock().clone()
	}
}

#[async_trait]
impl SnapshotAccessor for MemorySnapshotAccessor {
	async fn query_undo_data(&self, query: &SnapshotQuery) -> Result<Vec<Row>, AccessError> {
		self.queries.lock().push(query.clone());
		let key = (query.datasource.clone(), query.table.clone());
		if let Some(message) = self.failing.lock().get(&key) {
			return Err(AccessError::new(&query.datasource, &query.table, message.as_str()));
		}
		Ok(self.rows.lock().get(&key).cloned().unwrap_or_default())
	}
}

/// Engine that records every graph it is asked to run.
#[derive(Default)]
pub struct RecordingEngine {
	graphs: Mutex<Vec<CompensationGraph>>,
	failure: Mutex<Option<String>>,
}

impl RecordingEngine {
	pub fn new() -> Self {
		Self::default()
	}

	/// Make every subsequent run fail after recording its graph.
	pub fn failing(message: &str) -> Self {
		Self {
			graphs: Mutex::new(Vec::new()),
			failure: Mutex::new(Some(message.to_string())),
		}
	}

	pub fn graphs(&self) -> Vec<CompensationGraph> {
		self.graphs.lock().clone()
	}

	pub fn run_count(&self) -> usize {
		self.graphs.lock().len()
	}
}

#[async_trait]
impl CompensationEngine for RecordingEngine {
	async fn run(&self, graph: CompensationGraph) -> Result<(), EngineError> {
		self.graphs.lock().push(graph);
		match self.failure.lock().as_ref() {
			Some(message) => Err(EngineError::Unavailable(message.clone())),
			None => Ok(()),
		}
	}
}

/// A statement executed by [`ScriptedSqlExecutor`].
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCall {
	pub datasource: String,
	pub sql: String,
	pub parameters: Vec<Value>,
}

/// SQL executor that succeeds unless told to fail a statement a number of
/// times.
#[derive(Default)]
pub struct ScriptedSqlExecutor {
	calls: Mutex<Vec<SqlCall>>,
	failures: Mutex<HashMap<String, (usize, bool)>>,
	row_failures: Mutex<Vec<(String, Vec<Value>, usize, bool)>>,
}

impl ScriptedSqlExecutor {
	pub fn new() -> Self {
		Self::default()
	}

	/// Fail the next `times` executions of `sql`.
	pub fn fail_times(&self, sql: &str, times: usize, retryable: bool) {
		self.failures.lock().insert(sql.to_string(), (times, retryable));
	}

	/// Fail the next `times` executions of `sql` bound to exactly `parameters`.
	pub fn fail_row(&self, sql: &str, parameters: Vec<Value>, times: usize, retryable: bool) {
		self
			.row_failures
			.lock()
			.push((sql.to_string(), parameters, times, retryable));
	}

	pub fn calls(&self) -> Vec<SqlCall> {
		self.calls.lock().clone()
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().len()
	}
}

#[async_trait]
impl SqlExecutor for ScriptedSqlExecutor {
	async fn execute(&self, datasource: &str, sql: &str, parameters: &[Value]) -> Result<u64, SqlError> {
		self.calls.lock().push(SqlCall {
			datasource: datasource.to_string(),
			sql: sql.to_string(),
			parameters: parameters.to_vec(),
		});

		let mut row_failures = self.row_failures.lock();
		let row_failure = row_failures
			.iter_mut()
			.find(|(s, p, remaining, _)| s == sql && p.as_slice() == parameters && *remaining > 0)
			.map(|(_, _, remaining, retryable)| (remaining, *retryable));
		let mut failures = self.failures.lock();
		let failure = match row_failure {
			Some(found) => Some(found),
			None => failures
				.get_mut(sql)
				.filter(|(remaining, _)| *remaining > 0)
				.map(|(remaining, retryable)| (remaining, *retryable)),
		};

		if let Some((remaining, retryable)) = failure {
			*remaining -= 1;
			let message = format!("{sql} failed on {datasource}");
			return Err(if retryable {
				SqlError::retryable(message)
			} else {
				SqlError::fatal(message)
			});
		}
		Ok(1)
	}
}
