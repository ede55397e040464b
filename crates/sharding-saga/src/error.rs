use thiserror::Error;

use crate::engine::EngineError;
use crate::snapshot::AccessError;

/// Errors surfaced by the transaction manager.
#[derive(Error, Debug)]
pub enum SagaError {
	#[error("table '{0}' has no primary key and cannot take part in a saga transaction")]
	MissingPrimaryKey(String),

	#[error("table '{0}' is not registered")]
	UnknownTable(String),

	#[error("datasource '{0}' has already been registered")]
	DuplicateDataSource(String),

	#[error("datasource '{0}' is not registered")]
	UnknownDataSource(String),

	#[error("could not match datasource '{datasource}' and logic table '{logic_table}' against routing results")]
	InconsistentRouting {
		datasource: String,
		logic_table: String,
	},

	#[error("unsupported statement: {0}")]
	UnsupportedStatement(String),

	#[error("no active saga transaction")]
	NoActiveTransaction,

	#[error("logical statement was opened in transaction {0}, not in the one it is registered against")]
	ForeignLogicSql(uuid::Uuid),

	#[error("snapshot read failed: {0}")]
	Access(#[from] AccessError),

	#[error("compensation engine failed: {0}")]
	Engine(#[from] EngineError),
}

impl SagaError {
	pub fn inconsistent_routing(datasource: impl Into<String>, logic_table: impl Into<String>) -> Self {
		Self::InconsistentRouting {
			datasource: datasource.into(),
			logic_table: logic_table.into(),
		}
	}

	/// Whether the error points at a bug in the surrounding pipeline rather
	/// than a transient condition.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			SagaError::InconsistentRouting { .. }
				| SagaError::UnsupportedStatement(_)
				| SagaError::ForeignLogicSql(_)
		)
	}
}
