//! The boundary to the saga engine that runs compensation graphs.
//!
//! [`CompensationEngine`] is what the transaction manager calls on commit and
//! rollback. [`GraphExecutor`] is an in-process implementation that runs a
//! graph against shards through a [`SqlExecutor`].

mod executor;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use executor::{ExecutionReport, GraphExecutor};

use crate::graph::{CompensationGraph, RecoveryPolicy};
use crate::transaction::BranchId;

/// Errors reported by a compensation engine.
///
/// Terminal errors carry the branches the run had completed before giving up,
/// so callers can see which shards were left applied or compensated. A branch
/// whose revert spans several rows can fail part way; `rows_completed` counts
/// the rows of the failing branch that were already restored.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("branch {branch_id} failed after {attempts} attempts during {policy} recovery: {message}")]
	RetriesExhausted {
		branch_id: BranchId,
		policy: RecoveryPolicy,
		attempts: u32,
		message: String,
		completed: Vec<BranchId>,
		rows_completed: usize,
	},

	#[error("branch {branch_id} failed during {policy} recovery: {message}")]
	NonRetryable {
		branch_id: BranchId,
		policy: RecoveryPolicy,
		message: String,
		completed: Vec<BranchId>,
		rows_completed: usize,
	},

	#[error("compensation engine unavailable: {0}")]
	Unavailable(String),
}

impl EngineError {
	/// Branches the failed run completed before stopping.
	pub fn completed(&self) -> &[BranchId] {
		match self {
			EngineError::RetriesExhausted { completed, .. } | EngineError::NonRetryable { completed, .. } => {
				completed
			},
			EngineError::Unavailable(_) => &[],
		}
	}

	/// Statements of the failing branch that ran before it stopped. Always zero
	/// under forward recovery, where a branch is a single statement.
	pub fn rows_completed(&self) -> usize {
		match self {
			EngineError::RetriesExhausted { rows_completed, .. }
			| EngineError::NonRetryable { rows_completed, .. } => *rows_completed,
			EngineError::Unavailable(_) => 0,
		}
	}
}

/// Runs a compensation graph to completion.
///
/// The call does not return until the graph succeeded, the retry budget is
/// exhausted or a non-retryable error occurred.
#[async_trait]
pub trait CompensationEngine: Send + Sync {
	async fn run(&self, graph: CompensationGraph) -> Result<(), EngineError>;
}

/// Error type for a single statement run against a shard
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SqlError {
	pub message: String,
	/// Whether running the same statement again may succeed
	pub retryable: bool,
}

impl SqlError {
	pub fn retryable(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			retryable: true,
		}
	}

	pub fn fatal(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			retryable: false,
		}
	}
}

/// Runs one statement on one datasource.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
	/// Execute `sql` with `parameters`, returning the number of affected rows.
	async fn execute(&self, datasource: &str, sql: &str, parameters: &[Value]) -> Result<u64, SqlError>;
}
