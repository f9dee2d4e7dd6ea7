//! Storage contracts and built-in store implementations for delegated grants.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{DelegatedGrant, PrincipalId},
};

/// Boxed future returned by [`GrantStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for per-principal delegated grants.
///
/// Each principal holds at most one grant; saving replaces any previous one.
pub trait GrantStore
where
	Self: Send + Sync,
{
	/// Persists or replaces the grant for `grant.principal`.
	fn save(&self, grant: DelegatedGrant) -> StoreFuture<'_, ()>;

	/// Fetches the grant associated with the principal, if present.
	fn fetch<'a>(&'a self, principal: &'a PrincipalId) -> StoreFuture<'a, Option<DelegatedGrant>>;

	/// Atomically replaces the grant if its secret still equals `expected_secret`.
	fn compare_and_swap<'a>(
		&'a self,
		principal: &'a PrincipalId,
		expected_secret: &'a str,
		replacement: DelegatedGrant,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Removes and returns the principal's grant.
	fn remove<'a>(&'a self, principal: &'a PrincipalId)
	-> StoreFuture<'a, Option<DelegatedGrant>>;
}

/// Result of a grant compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The stored secret matched the expected value and the grant was replaced.
	Updated,
	/// A grant exists but its secret differs (for example after a fresh sign-in).
	SecretMismatch,
	/// No grant is stored for the principal.
	Missing,
}

/// Error type produced by [`GrantStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
