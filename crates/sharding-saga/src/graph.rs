//! The compensation graph handed to the saga engine.
//!
//! The graph is the wire contract between the transaction manager and the
//! engine: an ordered list of logical statements, each an ordered list of
//! branch requests carrying the forward and revert statements. Requests
//! always have the same shape; a branch with nothing to undo carries an empty
//! revert statement rather than a missing one.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{SagaConfig, serde_dur};
use crate::revert::is_noop_revert;
use crate::transaction::{BranchId, BranchTransaction, ExecuteStatus, GlobalTransaction};

/// Which direction the engine recovers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecoveryPolicy {
	/// Retry incomplete forward branches until everything is applied
	Forward,
	/// Undo every applied branch in reverse order
	Backward,
}

impl fmt::Display for RecoveryPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RecoveryPolicy::Forward => f.write_str("forward"),
			RecoveryPolicy::Backward => f.write_str("backward"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchRequest {
	pub branch_id: BranchId,
	pub datasource_name: String,
	pub sql: String,
	pub parameters: Vec<Value>,
	pub revert_sql: String,
	pub revert_parameters: Vec<Vec<Value>>,
	#[serde(default)]
	pub status: ExecuteStatus,
}

impl BranchRequest {
	pub fn from_branch(branch: &BranchTransaction, status: ExecuteStatus) -> Self {
		let (revert_sql, revert_parameters) = match branch.revert().filter(|revert| !revert.is_noop()) {
			Some(revert) => (revert.sql.clone(), revert.parameters.clone()),
			None => (String::new(), Vec::new()),
		};
		Self {
			branch_id: branch.branch_id(),
			datasource_name: branch.datasource_name().to_string(),
			sql: branch.sql().to_string(),
			parameters: branch.parameters().to_vec(),
			revert_sql,
			revert_parameters,
			status,
		}
	}

	/// Whether the revert side does nothing.
	pub fn is_noop_revert(&self) -> bool {
		is_noop_revert(&self.revert_sql, &self.revert_parameters)
	}
}

/// One logical statement and its branches in branch id order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicSqlNode {
	pub sql: String,
	pub requests: Vec<BranchRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationGraph {
	pub policy: RecoveryPolicy,
	pub transaction_max_retries: u32,
	pub compensation_max_retries: u32,
	#[serde(with = "serde_dur")]
	pub retry_delay: Duration,
	/// Set for rollbacks: the engine must not try to complete any branch
	/// forward.
	#[serde(default)]
	pub rollback_initiated: bool,
	pub nodes: Vec<LogicSqlNode>,
}

impl CompensationGraph {
	pub fn requests(&self) -> impl Iterator<Item = &BranchRequest> {
		self.nodes.iter().flat_map(|node| node.requests.iter())
	}

	pub fn request_count(&self) -> usize {
		self.nodes.iter().map(|node| node.requests.len()).sum()
	}
}

/// Incrementally assembles a [`CompensationGraph`].
#[derive(Debug)]
pub struct GraphBuilder {
	policy: RecoveryPolicy,
	transaction_max_retries: u32,
	compensation_max_retries: u32,
	retry_delay: Duration,
	rollback_initiated: bool,
	nodes: Vec<LogicSqlNode>,
}

impl GraphBuilder {
	pub fn new(policy: RecoveryPolicy, config: &SagaConfig) -> Self {
		Self {
			policy,
			transaction_max_retries: config.transaction_max_retries,
			compensation_max_retries: config.compensation_max_retries,
			retry_delay: config.transaction_retry_delay,
			rollback_initiated: false,
			nodes: Vec::new(),
		}
	}

	/// Build the graph for a whole transaction. Backward graphs are marked as
	/// rollback-initiated.
	pub fn from_transaction(
		transaction: &GlobalTransaction,
		policy: RecoveryPolicy,
		config: &SagaConfig,
	) -> CompensationGraph {
		let mut builder = Self::new(policy, config);
		for logic in transaction.logic_sql_transactions() {
			builder.next_logic_sql(logic.sql());
			for branch in logic.branches() {
				let status = transaction.execution_status(branch.branch_id());
				builder.add_request(&branch, status);
			}
		}
		if policy == RecoveryPolicy::Backward {
			builder.add_rollback_request();
		}
		builder.build()
	}

	/// Start the node for the next logical statement.
	pub fn next_logic_sql(&mut self, sql: impl Into<String>) -> &mut Self {
		self.nodes.push(LogicSqlNode {
			sql: sql.into(),
			requests: Vec::new(),
		});
		self
	}

	/// Add a branch to the current node, opening an anonymous node if none is
	/// open yet.
	pub fn add_request(&mut self, branch: &BranchTransaction, status: ExecuteStatus) -> &mut Self {
		if self.nodes.is_empty() {
			self.next_logic_sql("");
		}
		if let Some(node) = self.nodes.last_mut() {
			node.requests.push(BranchRequest::from_branch(branch, status));
		}
		self
	}

	pub fn add_rollback_request(&mut self) -> &mut Self {
		self.rollback_initiated = true;
		self
	}

	pub fn build(self) -> CompensationGraph {
		CompensationGraph {
			policy: self.policy,
			transaction_max_retries: self.transaction_max_retries,
			compensation_max_retries: self.compensation_max_retries,
			retry_delay: self.retry_delay,
			rollback_initiated: self.rollback_initiated,
			nodes: self.nodes,
		}
	}
}
