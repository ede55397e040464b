//! In-process compensation graph executor.
//!
//! Forward recovery walks the graph in order and re-runs every branch that
//! has not reported success. Backward recovery walks it in reverse and runs
//! the revert statement of every branch that may have been applied.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{CompensationEngine, EngineError, SqlExecutor};
use crate::graph::{BranchRequest, CompensationGraph, RecoveryPolicy};
use crate::transaction::{BranchId, ExecuteStatus};

/// What a successful run did to each branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
	/// Branches whose forward statement ran during this run
	pub applied: Vec<BranchId>,
	/// Branches whose revert statement ran during this run
	pub compensated: Vec<BranchId>,
	/// Branches left untouched
	pub skipped: Vec<BranchId>,
}

/// Executor for compensation graphs.
pub struct GraphExecutor<S: SqlExecutor> {
	executor: Arc<S>,
}

impl<S: SqlExecutor> GraphExecutor<S> {
	/// Create a new executor running statements through `executor`.
	pub fn new(executor: Arc<S>) -> Self {
		Self { executor }
	}

	/// Run a graph under its recovery policy.
	pub async fn execute(&self, graph: &CompensationGraph) -> Result<ExecutionReport, EngineError> {
		info!(
			policy = %graph.policy,
			rollback_initiated = graph.rollback_initiated,
			nodes = graph.nodes.len(),
			requests = graph.request_count(),
			"Running compensation graph"
		);

		if graph.rollback_initiated || graph.policy == RecoveryPolicy::Backward {
			self.recover_backward(graph).await
		} else {
			self.recover_forward(graph).await
		}
	}

	async fn recover_forward(&self, graph: &CompensationGraph) -> Result<ExecutionReport, EngineError> {
		let mut report = ExecutionReport::default();
		let budget = Budget {
			policy: RecoveryPolicy::Forward,
			max_retries: graph.transaction_max_retries,
			delay: graph.retry_delay,
		};

		for request in graph.requests() {
			if request.status == ExecuteStatus::Success {
				debug!(branch_id = %request.branch_id, "Branch already applied, skipping");
				report.skipped.push(request.branch_id);
				continue;
			}

			let progress = Progress {
				completed: &report.applied,
				rows_completed: 0,
			};
			self
				.run_with_retries(request, &request.sql, &request.parameters, &budget, progress)
				.await?;
			report.applied.push(request.branch_id);
		}
		Ok(report)
	}

	async fn recover_backward(&self, graph: &CompensationGraph) -> Result<ExecutionReport, EngineError> {
		let mut report = ExecutionReport::default();
		let budget = Budget {
			policy: RecoveryPolicy::Backward,
			max_retries: graph.compensation_max_retries,
			delay: graph.retry_delay,
		};

		for node in graph.nodes.iter().rev() {
			for request in node.requests.iter().rev() {
				// A failed forward statement left nothing behind to undo.
				if request.status == ExecuteStatus::Failure || request.is_noop_revert() {
					debug!(branch_id = %request.branch_id, "Nothing to compensate, skipping");
					report.skipped.push(request.branch_id);
					continue;
				}

				for (row, params) in request.revert_parameters.iter().enumerate() {
					let progress = Progress {
						completed: &report.compensated,
						rows_completed: row,
					};
					self
						.run_with_retries(request, &request.revert_sql, params, &budget, progress)
						.await?;
				}
				report.compensated.push(request.branch_id);
			}
		}
		Ok(report)
	}

	async fn run_with_retries(
		&self,
		request: &BranchRequest,
		sql: &str,
		parameters: &[Value],
		budget: &Budget,
		progress: Progress<'_>,
	) -> Result<(), EngineError> {
		let attempts = budget.max_retries.saturating_add(1);
		let mut attempt = 0;
		loop {
			attempt += 1;
			let err = match self
				.executor
				.execute(&request.datasource_name, sql, parameters)
				.await
			{
				Ok(_) => return Ok(()),
				Err(err) => err,
			};

			if !err.retryable {
				error!(
					branch_id = %request.branch_id,
					datasource = %request.datasource_name,
					error = %err,
					"Branch failed with a non-retryable error"
				);
				return Err(EngineError::NonRetryable {
					branch_id: request.branch_id,
					policy: budget.policy,
					message: err.message,
					completed: progress.completed.to_vec(),
					rows_completed: progress.rows_completed,
				});
			}
			if attempt >= attempts {
				error!(
					branch_id = %request.branch_id,
					datasource = %request.datasource_name,
					attempts,
					error = %err,
					"Branch retry budget exhausted"
				);
				return Err(EngineError::RetriesExhausted {
					branch_id: request.branch_id,
					policy: budget.policy,
					attempts,
					message: err.message,
					completed: progress.completed.to_vec(),
					rows_completed: progress.rows_completed,
				});
			}

			warn!(
				branch_id = %request.branch_id,
				attempt,
				error = %err,
				"Branch failed, retrying"
			);
			tokio::time::sleep(budget.delay).await;
		}
	}
}

/// How far the run got before the statement being retried.
struct Progress<'a> {
	completed: &'a [BranchId],
	rows_completed: usize,
}

struct Budget {
	policy: RecoveryPolicy,
	max_retries: u32,
	delay: Duration,
}

#[async_trait]
impl<S: SqlExecutor> CompensationEngine for GraphExecutor<S> {
	async fn run(&self, graph: CompensationGraph) -> Result<(), EngineError> {
		let report = self.execute(&graph).await?;
		info!(
			applied = report.applied.len(),
			compensated = report.compensated.len(),
			skipped = report.skipped.len(),
			"Compensation graph completed"
		);
		Ok(())
	}
}
