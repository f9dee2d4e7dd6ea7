//! Shared helpers for flow implementations (delegation requests, singleflight guards).

// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, ResourceId},
	flows::Broker,
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
};

/// Parameters for a delegated token acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DelegationRequest {
	/// Principal the token is minted for.
	pub principal: PrincipalId,
	/// Resource the token must be scoped to.
	pub resource: ResourceId,
	/// Skips the token cache (when enabled) and always contacts the provider.
	pub bypass_cache: bool,
}
impl DelegationRequest {
	/// Creates a request for the provided principal/resource pair.
	pub fn new(principal: PrincipalId, resource: ResourceId) -> Self {
		Self { principal, resource, bypass_cache: false }
	}

	/// Forces the broker to bypass the token cache.
	pub fn bypass_cache(mut self) -> Self {
		self.bypass_cache = true;

		self
	}
}

/// Returns (and creates on demand) the singleflight guard for a principal.
///
/// Holding the guard serializes grant reads and rotations for that principal.
pub(crate) fn flow_guard<C, M>(
	broker: &Broker<C, M>,
	principal: &PrincipalId,
) -> Arc<AsyncMutex<()>>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = broker.flow_guards.lock();

	guards.entry(principal.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}

/// Drops the guard for a principal that no longer holds a grant.
///
/// The caller must still own its clone of the guard; the entry survives while any other
/// flow holds or awaits it.
pub(crate) fn release_guard<C, M>(broker: &Broker<C, M>, principal: &PrincipalId)
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = broker.flow_guards.lock();

	// One reference for the map, one for the releasing caller.
	if guards.get(principal).is_some_and(|guard| Arc::strong_count(guard) <= 2) {
		guards.remove(principal);
	}
}
