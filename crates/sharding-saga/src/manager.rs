//! Saga transaction manager.
//!
//! The manager owns the setup-time registries (datasources and table primary
//! keys) and drives each [`TransactionContext`] through its lifecycle:
//!
//! 1. [`begin`](SagaTransactionManager::begin) installs a global transaction.
//! 2. For each logical statement, [`next_logic_sql`](SagaTransactionManager::next_logic_sql)
//!    opens a boundary and [`register_branch`](SagaTransactionManager::register_branch)
//!    records every routed branch with its revert statement.
//! 3. [`commit`](SagaTransactionManager::commit) or
//!    [`rollback`](SagaTransactionManager::rollback) hands the graph to the
//!    engine when needed and always clears the context.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SagaConfig;
use crate::engine::CompensationEngine;
use crate::graph::{GraphBuilder, RecoveryPolicy};
use crate::metadata::{TableMetadata, TableMetas};
use crate::revert::RevertContext;
use crate::routing::{RouteUnit, RoutingResult};
use crate::snapshot::{SnapshotAccessor, SnapshotQuery};
use crate::statement::DmlStatement;
use crate::transaction::{
	BranchId, BranchTransaction, GlobalTransaction, LogicSqlTransaction, OperationType,
	TransactionContext, TransactionStatus,
};
use crate::SagaError;

pub struct SagaTransactionManager<E: CompensationEngine> {
	config: SagaConfig,
	engine: Arc<E>,
	data_sources: HashSet<String>,
	table_metas: TableMetas,
}

impl<E: CompensationEngine> SagaTransactionManager<E> {
	pub fn new(config: SagaConfig, engine: Arc<E>) -> Self {
		Self {
			config,
			engine,
			data_sources: HashSet::new(),
			table_metas: TableMetas::new(),
		}
	}

	pub fn config(&self) -> &SagaConfig {
		&self.config
	}

	pub fn register_data_source(&mut self, name: impl Into<String>) -> Result<(), SagaError> {
		let name = name.into();
		if self.data_sources.contains(&name) {
			return Err(SagaError::DuplicateDataSource(name));
		}
		debug!(datasource = %name, "Registered datasource");
		self.data_sources.insert(name);
		Ok(())
	}

	/// Register a table that may be mutated inside saga transactions. Tables
	/// without a primary key are rejected.
	pub fn register_table(&mut self, table: TableMetadata) -> Result<(), SagaError> {
		self.table_metas.register(table)
	}

	/// Forget every registered datasource.
	pub fn close(&mut self) {
		self.data_sources.clear();
	}

	pub fn is_in_transaction(&self, ctx: &TransactionContext) -> bool {
		ctx.is_active()
	}

	/// Start a transaction on `ctx`. Does nothing if one is already active.
	pub fn begin(&self, ctx: &mut TransactionContext) -> Uuid {
		let active = ctx.is_active();
		let id = ctx.begin().id();
		if !active {
			info!(transaction_id = %id, "Began saga transaction");
		}
		id
	}

	/// Open the boundary for the next logical statement.
	pub fn next_logic_sql(
		&self,
		ctx: &TransactionContext,
		sql: impl Into<String>,
	) -> Result<Arc<LogicSqlTransaction>, SagaError> {
		let tx = ctx.current().ok_or(SagaError::NoActiveTransaction)?;
		Ok(tx.next_logic_sql_transaction(sql))
	}

	/// Flag the active transaction as containing a failure.
	pub fn record_failure(&self, ctx: &TransactionContext, reason: &str) -> Result<(), SagaError> {
		let tx = ctx.current().ok_or(SagaError::NoActiveTransaction)?;
		warn!(transaction_id = %tx.id(), reason, "Saga transaction marked as failed");
		tx.mark_failed();
		Ok(())
	}

	/// Record one routed branch of `statement` in `logic`.
	///
	/// The before-image is read through `accessor` here, so this must run
	/// before the forward statement does. Registration is refused with
	/// [`SagaError::NoActiveTransaction`] once `tx` has been committed or rolled
	/// back, including when that happens while the snapshot is being read. Any
	/// other error marks the transaction as failed.
	pub async fn register_branch<A>(
		&self,
		tx: &GlobalTransaction,
		logic: &LogicSqlTransaction,
		statement: &DmlStatement,
		routing: &RoutingResult,
		unit: &RouteUnit,
		accessor: &A,
	) -> Result<BranchId, SagaError>
	where
		A: SnapshotAccessor + ?Sized,
	{
		if tx.status() != TransactionStatus::Active {
			return Err(SagaError::NoActiveTransaction);
		}
		if logic.transaction_id() != tx.id() {
			return Err(SagaError::ForeignLogicSql(logic.transaction_id()));
		}

		let branch = match self
			.build_branch(tx, statement, routing, unit, accessor)
			.await
		{
			Ok(branch) => branch,
			Err(e) => {
				warn!(
					transaction_id = %tx.id(),
					datasource = %unit.datasource_name,
					error = %e,
					"Branch registration failed"
				);
				tx.mark_failed();
				return Err(e);
			},
		};

		let branch_id = branch.branch_id();
		let has_revert = branch.revert().is_some();
		if !tx.append_branch(logic, branch) {
			warn!(
				transaction_id = %tx.id(),
				branch_id = %branch_id,
				datasource = %unit.datasource_name,
				"Transaction completed while the branch was registering, dropping it"
			);
			return Err(SagaError::NoActiveTransaction);
		}
		debug!(
			transaction_id = %tx.id(),
			branch_id = %branch_id,
			datasource = %unit.datasource_name,
			has_revert,
			"Registered branch transaction"
		);
		Ok(branch_id)
	}

	async fn build_branch<A>(
		&self,
		tx: &GlobalTransaction,
		statement: &DmlStatement,
		routing: &RoutingResult,
		unit: &RouteUnit,
		accessor: &A,
	) -> Result<BranchTransaction, SagaError>
	where
		A: SnapshotAccessor + ?Sized,
	{
		if !self.data_sources.contains(&unit.datasource_name) {
			return Err(SagaError::UnknownDataSource(unit.datasource_name.clone()));
		}
		let logic_table = statement.logic_table().ok_or_else(|| {
			SagaError::UnsupportedStatement("saga transactions support single-table statements only".to_string())
		})?;
		let actual_table = routing.actual_table(&unit.datasource_name, logic_table)?;
		let primary_keys = self.table_metas.primary_keys(logic_table)?;

		let undo_data = if RevertContext::needs_snapshot(statement) {
			let query = SnapshotQuery {
				datasource: unit.datasource_name.clone(),
				table: actual_table.to_string(),
				predicate: statement.predicate().map(str::to_string),
				parameters: statement.predicate_parameters(&unit.parameters).to_vec(),
			};
			accessor.query_undo_data(&query).await?
		} else {
			Vec::new()
		};

		let revert =
			RevertContext::new(statement, actual_table, primary_keys, &unit.parameters, undo_data).synthesize();
		Ok(BranchTransaction::new(
			tx.next_branch_id(),
			unit.datasource_name.clone(),
			unit.sql.clone(),
			unit.parameters.clone(),
			revert,
		))
	}

	/// Finish the transaction on `ctx`.
	///
	/// Applied forward work stands as-is unless a failure was flagged, in which
	/// case the engine recovers forward. The context is cleared either way.
	pub async fn commit(&self, ctx: &mut TransactionContext) -> Result<(), SagaError> {
		let Some(tx) = ctx.take() else {
			return Ok(());
		};
		tx.set_operation_type(OperationType::Commit);

		if !tx.contains_failure() {
			info!(transaction_id = %tx.id(), "Committed saga transaction");
			tx.set_status(TransactionStatus::Inactive);
			return Ok(());
		}

		tx.set_status(TransactionStatus::Committing);
		info!(
			transaction_id = %tx.id(),
			branches = tx.branch_count(),
			"Committing saga transaction with forward recovery"
		);
		let graph = GraphBuilder::from_transaction(&tx, RecoveryPolicy::Forward, &self.config);
		self.run_graph(&tx, graph).await
	}

	/// Undo the transaction on `ctx` by running every revert statement in
	/// reverse order. The context is cleared even if the engine fails.
	pub async fn rollback(&self, ctx: &mut TransactionContext) -> Result<(), SagaError> {
		let Some(tx) = ctx.take() else {
			return Ok(());
		};
		tx.set_operation_type(OperationType::Rollback);
		tx.set_status(TransactionStatus::RollingBack);
		info!(
			transaction_id = %tx.id(),
			branches = tx.branch_count(),
			"Rolling back saga transaction"
		);
		let graph = GraphBuilder::from_transaction(&tx, RecoveryPolicy::Backward, &self.config);
		self.run_graph(&tx, graph).await
	}

	async fn run_graph(
		&self,
		tx: &GlobalTransaction,
		graph: crate::graph::CompensationGraph,
	) -> Result<(), SagaError> {
		let policy = graph.policy;
		let result = self.engine.run(graph).await;
		tx.set_status(TransactionStatus::Inactive);
		result.map_err(|e| {
			error!(
				transaction_id = %tx.id(),
				policy = %policy,
				error = %e,
				"Compensation engine failed"
			);
			SagaError::from(e)
		})
	}
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
