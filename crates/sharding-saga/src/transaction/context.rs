use std::sync::Arc;

use super::GlobalTransaction;

/// Request-scoped handle to the active saga transaction.
///
/// Each session owns one context and passes it to every manager call. Shard
/// workers that need to append branches clone the [`Arc`] out of it.
#[derive(Debug, Default)]
pub struct TransactionContext {
	current: Option<Arc<GlobalTransaction>>,
}

impl TransactionContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_active(&self) -> bool {
		self.current.is_some()
	}

	pub fn current(&self) -> Option<&Arc<GlobalTransaction>> {
		self.current.as_ref()
	}

	/// Install a transaction unless one is already active. Returns the active
	/// transaction either way.
	pub(crate) fn begin(&mut self) -> &Arc<GlobalTransaction> {
		self
			.current
			.get_or_insert_with(|| Arc::new(GlobalTransaction::new()))
	}

	/// Detach the active transaction, leaving the context inactive.
	pub(crate) fn take(&mut self) -> Option<Arc<GlobalTransaction>> {
		self.current.take()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_begin_is_idempotent() {
		let mut ctx = TransactionContext::new();
		assert!(!ctx.is_active());

		let first = ctx.begin().id();
		let second = ctx.begin().id();
		assert_eq!(first, second);
		assert!(ctx.is_active());
	}

	#[test]
	fn test_take_clears() {
		let mut ctx = TransactionContext::new();
		ctx.begin();
		assert!(ctx.take().is_some());
		assert!(!ctx.is_active());
		assert!(ctx.take().is_none());
	}

	#[test]
	fn test_contexts_are_independent() {
		let mut a = TransactionContext::new();
		let mut b = TransactionContext::new();
		assert_ne!(a.begin().id(), b.begin().id());
	}
}
