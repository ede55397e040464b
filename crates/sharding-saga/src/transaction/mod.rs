//! Bookkeeping for one saga unit of work.
//!
//! A [`GlobalTransaction`] owns one [`LogicSqlTransaction`] per logical
//! statement, and each of those owns one [`BranchTransaction`] per shard the
//! statement was routed to. Branches may be appended concurrently by shard
//! workers; they are kept ordered by [`BranchId`], which is allocated from a
//! single atomic counter so replay order does not depend on which shard
//! finished first.

mod context;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use context::TransactionContext;

use crate::revert::RevertUnit;

/// Identifier of a branch, unique and increasing within a global transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(u64);

impl BranchId {
	pub fn new(id: u64) -> Self {
		Self(id)
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for BranchId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// How the unit of work ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
	#[default]
	None,
	Commit,
	Rollback,
}

/// Lifecycle of a global transaction.
///
/// ```text
/// INACTIVE --begin--> ACTIVE --commit--> COMMITTING --> INACTIVE
///                            --rollback-> ROLLING_BACK -> INACTIVE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
	Active,
	Committing,
	RollingBack,
	Inactive,
}

/// Outcome of a branch's forward statement as reported by the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecuteStatus {
	/// Registered, outcome not reported (yet)
	#[default]
	Pending,
	Success,
	Failure,
}

/// One shard-local forward statement and the statement that undoes it.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchTransaction {
	branch_id: BranchId,
	datasource_name: String,
	sql: String,
	parameters: Vec<Value>,
	revert: Option<RevertUnit>,
}

impl BranchTransaction {
	pub fn new(
		branch_id: BranchId,
		datasource_name: impl Into<String>,
		sql: impl Into<String>,
		parameters: Vec<Value>,
		revert: Option<RevertUnit>,
	) -> Self {
		Self {
			branch_id,
			datasource_name: datasource_name.into(),
			sql: sql.into(),
			parameters,
			revert,
		}
	}

	pub fn branch_id(&self) -> BranchId {
		self.branch_id
	}

	pub fn datasource_name(&self) -> &str {
		&self.datasource_name
	}

	pub fn sql(&self) -> &str {
		&self.sql
	}

	pub fn parameters(&self) -> &[Value] {
		&self.parameters
	}

	pub fn revert(&self) -> Option<&RevertUnit> {
		self.revert.as_ref()
	}
}

/// The branches produced by routing one logical statement.
#[derive(Debug)]
pub struct LogicSqlTransaction {
	transaction_id: Uuid,
	sql: String,
	branches: Mutex<BTreeMap<BranchId, BranchTransaction>>,
}

impl LogicSqlTransaction {
	fn new(transaction_id: Uuid, sql: impl Into<String>) -> Self {
		Self {
			transaction_id,
			sql: sql.into(),
			branches: Mutex::new(BTreeMap::new()),
		}
	}

	/// Id of the global transaction this statement was opened in.
	pub fn transaction_id(&self) -> Uuid {
		self.transaction_id
	}

	pub fn sql(&self) -> &str {
		&self.sql
	}

	/// Append a branch. Safe to call from several shard workers at once.
	pub fn add_branch(&self, branch: BranchTransaction) {
		self.branches.lock().insert(branch.branch_id, branch);
	}

	/// Branches ordered by id.
	pub fn branches(&self) -> Vec<BranchTransaction> {
		self.branches.lock().values().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.branches.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.branches.lock().is_empty()
	}
}

/// One saga unit of work.
#[derive(Debug)]
pub struct GlobalTransaction {
	id: Uuid,
	logic_sql_transactions: RwLock<Vec<Arc<LogicSqlTransaction>>>,
	next_branch_id: AtomicU64,
	contains_failure: AtomicBool,
	operation_type: Mutex<OperationType>,
	status: Mutex<TransactionStatus>,
	execution_results: Mutex<HashMap<BranchId, ExecuteStatus>>,
}

impl Default for GlobalTransaction {
	fn default() -> Self {
		Self::new()
	}
}

impl GlobalTransaction {
	pub fn new() -> Self {
		Self {
			id: Uuid::new_v4(),
			logic_sql_transactions: RwLock::new(Vec::new()),
			next_branch_id: AtomicU64::new(1),
			contains_failure: AtomicBool::new(false),
			operation_type: Mutex::new(OperationType::None),
			status: Mutex::new(TransactionStatus::Active),
			execution_results: Mutex::new(HashMap::new()),
		}
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	/// Open the boundary for the next logical statement.
	pub fn next_logic_sql_transaction(&self, sql: impl Into<String>) -> Arc<LogicSqlTransaction> {
		let logic = Arc::new(LogicSqlTransaction::new(self.id, sql));
		self.logic_sql_transactions.write().push(logic.clone());
		logic
	}

	/// The statement currently being executed, if any.
	pub fn current_logic_sql_transaction(&self) -> Option<Arc<LogicSqlTransaction>> {
		self.logic_sql_transactions.read().last().cloned()
	}

	/// Logical statements in issuance order.
	pub fn logic_sql_transactions(&self) -> Vec<Arc<LogicSqlTransaction>> {
		self.logic_sql_transactions.read().clone()
	}

	pub fn next_branch_id(&self) -> BranchId {
		BranchId(self.next_branch_id.fetch_add(1, Ordering::SeqCst))
	}

	/// Flag the unit of work as containing a failure. Commit then recovers
	/// forward instead of treating the applied work as final.
	pub fn mark_failed(&self) {
		self.contains_failure.store(true, Ordering::SeqCst);
	}

	pub fn contains_failure(&self) -> bool {
		self.contains_failure.load(Ordering::SeqCst)
	}

	/// Record the outcome of a branch's forward statement.
	pub fn record_execution(&self, branch_id: BranchId, status: ExecuteStatus) {
		if status == ExecuteStatus::Failure {
			self.mark_failed();
		}
		self.execution_results.lock().insert(branch_id, status);
	}

	pub fn execution_status(&self, branch_id: BranchId) -> ExecuteStatus {
		self
			.execution_results
			.lock()
			.get(&branch_id)
			.copied()
			.unwrap_or_default()
	}

	/// Append `branch` to `logic` unless the transaction has left the active
	/// state. Holds the status lock so a concurrent commit or rollback either
	/// sees the branch or rejects it.
	pub(crate) fn append_branch(&self, logic: &LogicSqlTransaction, branch: BranchTransaction) -> bool {
		let status = self.status.lock();
		if *status != TransactionStatus::Active {
			return false;
		}
		logic.add_branch(branch);
		true
	}

	pub fn operation_type(&self) -> OperationType {
		*self.operation_type.lock()
	}

	pub(crate) fn set_operation_type(&self, operation_type: OperationType) {
		*self.operation_type.lock() = operation_type;
	}

	pub fn status(&self) -> TransactionStatus {
		*self.status.lock()
	}

	pub(crate) fn set_status(&self, status: TransactionStatus) {
		*self.status.lock() = status;
	}

	/// Total number of branches across all logical statements.
	pub fn branch_count(&self) -> usize {
		self
			.logic_sql_transactions
			.read()
			.iter()
			.map(|logic| logic.len())
			.sum()
	}
}
