//! Optional short-lived access-token cache keyed by principal + resource.
//!
//! Entries are served until a jittered preemptive window before the provider-reported
//! expiry, so concurrent principals do not all renew at the same instant.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, PrincipalId, ResourceId},
};

type CacheKey = (PrincipalId, ResourceId);

/// In-process cache of delegated access tokens.
#[derive(Debug)]
pub struct TokenCache {
	entries: RwLock<HashMap<CacheKey, AccessToken>>,
	preemptive_window: Duration,
}
impl TokenCache {
	const DEFAULT_PREEMPTIVE_WINDOW: Duration = Duration::seconds(60);

	/// Creates a cache that stops serving tokens `window` (minus jitter) before expiry.
	pub fn with_preemptive_window(window: Duration) -> Self {
		Self {
			entries: Default::default(),
			preemptive_window: if window.is_negative() { Duration::ZERO } else { window },
		}
	}

	/// Returns a cached token that is still fresh at `now`.
	pub fn get(
		&self,
		principal: &PrincipalId,
		resource: &ResourceId,
		now: OffsetDateTime,
	) -> Option<AccessToken> {
		let key = (principal.clone(), resource.clone());
		let entries = self.entries.read();
		let token = entries.get(&key)?;

		if self.should_renew(&key, token, now) { None } else { Some(token.clone()) }
	}

	/// Stores or replaces the token for its principal/resource pair.
	pub fn insert(&self, token: AccessToken) {
		self.entries.write().insert((token.principal.clone(), token.resource.clone()), token);
	}

	/// Drops every token cached for `principal`.
	pub fn evict_principal(&self, principal: &PrincipalId) {
		self.entries.write().retain(|(cached, _), _| cached != principal);
	}

	/// Number of cached tokens, fresh or not.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing is cached.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	fn should_renew(&self, key: &CacheKey, token: &AccessToken, now: OffsetDateTime) -> bool {
		if token.is_expired_at(now) {
			return true;
		}

		let effective_window = self.effective_preemptive_window(key);

		if effective_window.is_zero() {
			return false;
		}

		token.remaining_at(now) <= effective_window
	}

	fn effective_preemptive_window(&self, key: &CacheKey) -> Duration {
		self.preemptive_window.checked_sub(self.preemptive_jitter(key)).unwrap_or(Duration::ZERO)
	}

	fn preemptive_jitter(&self, key: &CacheKey) -> Duration {
		let window_secs = self.preemptive_window.whole_seconds();

		if window_secs <= 1 {
			return Duration::ZERO;
		}

		let modulus = u64::try_from(window_secs).unwrap_or(u64::MAX);
		let jitter_secs = jitter_seed(key) % modulus;

		// Keep at least half of the window so a token is never served to its last second.
		let jitter_secs = jitter_secs.min(modulus / 2);

		Duration::seconds(i64::try_from(jitter_secs).unwrap_or(i64::MAX))
	}
}
impl Default for TokenCache {
	fn default() -> Self {
		Self::with_preemptive_window(Self::DEFAULT_PREEMPTIVE_WINDOW)
	}
}

fn jitter_seed(key: &CacheKey) -> u64 {
	let mut hasher = DefaultHasher::new();

	key.hash(&mut hasher);

	hasher.finish()
}
