//! Thread-safe in-memory [`GrantStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{DelegatedGrant, PrincipalId},
	store::{CompareAndSwapOutcome, GrantStore, StoreError, StoreFuture},
};

type GrantMap = Arc<RwLock<HashMap<PrincipalId, DelegatedGrant>>>;

/// Thread-safe storage backend that keeps grants in-process; lost on restart.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(GrantMap);
impl MemoryStore {
	/// Number of principals with a stored grant.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no grant is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn save_now(map: GrantMap, grant: DelegatedGrant) -> Result<(), StoreError> {
		map.write().insert(grant.principal.clone(), grant);

		Ok(())
	}

	fn cas_now(
		map: GrantMap,
		principal: PrincipalId,
		expected_secret: &str,
		replacement: DelegatedGrant,
	) -> CompareAndSwapOutcome {
		let mut guard = map.write();
		let outcome = match guard.get(&principal) {
			Some(existing) if existing.secret.expose() == expected_secret =>
				CompareAndSwapOutcome::Updated,
			Some(_) => CompareAndSwapOutcome::SecretMismatch,
			None => CompareAndSwapOutcome::Missing,
		};

		if matches!(outcome, CompareAndSwapOutcome::Updated) {
			guard.insert(principal, replacement);
		}

		outcome
	}
}
impl GrantStore for MemoryStore {
	fn save(&self, grant: DelegatedGrant) -> StoreFuture<'_, ()> {
		let map = self.0.clone();

		Box::pin(async move { Self::save_now(map, grant) })
	}

	fn fetch<'a>(&'a self, principal: &'a PrincipalId) -> StoreFuture<'a, Option<DelegatedGrant>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(principal).cloned()) })
	}

	fn compare_and_swap<'a>(
		&'a self,
		principal: &'a PrincipalId,
		expected_secret: &'a str,
		replacement: DelegatedGrant,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		let map = self.0.clone();
		let principal = principal.to_owned();

		Box::pin(async move { Ok(Self::cas_now(map, principal, expected_secret, replacement)) })
	}

	fn remove<'a>(
		&'a self,
		principal: &'a PrincipalId,
	) -> StoreFuture<'a, Option<DelegatedGrant>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.write().remove(principal)) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn compare_and_swap_detects_concurrent_sign_in() {
		let store = MemoryStore::default();
		let principal = PrincipalId::new("user-cas").expect("Principal fixture should be valid.");

		assert_eq!(
			store
				.compare_and_swap(
					&principal,
					"refresh-1",
					DelegatedGrant::refresh_token(principal.clone(), "refresh-2"),
				)
				.await
				.expect("CAS on a missing grant should not fail."),
			CompareAndSwapOutcome::Missing
		);

		store
			.save(DelegatedGrant::refresh_token(principal.clone(), "refresh-1"))
			.await
			.expect("Saving the fixture grant should succeed.");

		let outcome = store
			.compare_and_swap(
				&principal,
				"stale",
				DelegatedGrant::refresh_token(principal.clone(), "refresh-x"),
			)
			.await
			.expect("CAS should not fail.");

		assert_eq!(outcome, CompareAndSwapOutcome::SecretMismatch);

		let outcome = store
			.compare_and_swap(
				&principal,
				"refresh-1",
				DelegatedGrant::refresh_token(principal.clone(), "refresh-2"),
			)
			.await
			.expect("CAS should not fail.");

		assert_eq!(outcome, CompareAndSwapOutcome::Updated);

		let stored = store
			.fetch(&principal)
			.await
			.expect("Fetch should succeed.")
			.expect("Grant should still be present.");

		assert_eq!(stored.secret.expose(), "refresh-2");
		assert_eq!(store.len(), 1);
	}
}
