//! Saga-based coordination of multi-shard transactions.
//!
//! Forward statements run directly against each shard. When the unit of work
//! fails, previously applied statements are undone by running synthesized
//! revert statements instead of using a two-phase commit.
//!
//! The crate is split into two halves:
//!
//! * [`revert`] derives the compensating statement for every forward
//!   insert, update or delete from its before-image.
//! * [`transaction`], [`graph`] and [`manager`] track how each logical
//!   statement fans out into shard-local branches and turn the result into a
//!   [`graph::CompensationGraph`] for a [`engine::CompensationEngine`].

pub mod config;
pub mod engine;
mod error;
pub mod graph;
pub mod manager;
pub mod metadata;
pub mod revert;
pub mod routing;
pub mod snapshot;
pub mod statement;
pub mod transaction;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::SagaConfig;
pub use engine::{CompensationEngine, EngineError, GraphExecutor, SqlError, SqlExecutor};
pub use error::SagaError;
pub use graph::{BranchRequest, CompensationGraph, GraphBuilder, LogicSqlNode, RecoveryPolicy};
pub use manager::SagaTransactionManager;
pub use metadata::{ColumnMetadata, TableMetadata, TableMetas};
pub use revert::{RevertContext, RevertUnit};
pub use routing::{RouteUnit, RoutingResult, RoutingUnit, TableUnit};
pub use snapshot::{AccessError, SnapshotAccessor, SnapshotQuery};
pub use statement::{DmlStatement, Row, ValueExpr};
pub use transaction::{
	BranchId, BranchTransaction, ExecuteStatus, GlobalTransaction, LogicSqlTransaction,
	OperationType, TransactionContext, TransactionStatus,
};
