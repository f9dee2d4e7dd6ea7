//! Delegated token acquisition with per-principal singleflight guards and grant rotation.
//!
//! [`Broker::acquire_token`] reads the principal's stored grant and performs exactly one
//! token endpoint call: `grant_type=refresh_token` for grants captured at sign-in, or the
//! on-behalf-of JWT bearer exchange for registered assertions. A refresh token returned by
//! the provider is rotated into the store via compare-and-swap; a grant the provider
//! rejects is removed so the caller is sent back to sign-in.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, DelegatedGrant, GrantKind, PrincipalId, TokenSecret},
	error::AuthenticationError,
	flows::{Broker, DelegationRequest, common},
	http::TokenHttpClient,
	oauth::TransportErrorMapper,
	obs::{self, FlowKind},
	provider::GrantType,
	store::{CompareAndSwapOutcome, GrantStore},
};

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Exchanges the principal's stored grant for an access token scoped to the requested
	/// resource.
	pub async fn acquire_token(&self, request: DelegationRequest) -> Result<AccessToken> {
		obs::observe(FlowKind::Delegation, "acquire_token", async move {
			let DelegationRequest { principal, resource, bypass_cache } = request;
			let guard = common::flow_guard(self, &principal);
			let _singleflight = guard.lock().await;

			let cached = match &self.cache {
				Some(cache) if !bypass_cache =>
					cache.get(&principal, &resource, OffsetDateTime::now_utc()),
				_ => None,
			};

			if let Some(token) = cached {
				return Ok(token);
			}

			let Some(grant) = <dyn GrantStore>::fetch(self.store.as_ref(), &principal).await? else {
				common::release_guard(self, &principal);

				return Err(AuthenticationError::MissingGrant { principal }.into());
			};
			let mut form = BTreeMap::new();

			form.insert("resource".into(), resource.to_string());

			let grant_type = match grant.kind {
				GrantKind::RefreshToken => {
					form.insert("refresh_token".into(), grant.secret.expose().to_owned());

					GrantType::RefreshToken
				},
				GrantKind::Assertion => {
					form.insert("assertion".into(), grant.secret.expose().to_owned());

					GrantType::OnBehalfOf
				},
			};
			let issued_at = OffsetDateTime::now_utc();
			let response = match self.token_endpoint().exchange(grant_type, form).await {
				Ok(response) => response,
				Err(err) => {
					if err.is_grant_rejected() {
						self.forget_principal(&principal).await;
					}

					return Err(err);
				},
			};

			let rotated = match (grant.kind, &response.refresh_token) {
				(GrantKind::RefreshToken, Some(rotated))
					if rotated.expose() != grant.secret.expose() =>
					Some(rotated.clone()),
				_ => None,
			};

			if let Some(rotated) = rotated {
				self.rotate_grant(&grant, rotated).await?;
			}

			let token = response.into_access_token(principal, resource, issued_at)?;

			if let Some(cache) = &self.cache {
				cache.insert(token.clone());
			}

			Ok(token)
		})
		.await
	}

	/// Stores a user assertion (for example the bearer JWT presented to an upstream API)
	/// as the principal's on-behalf-of grant.
	pub async fn register_assertion(
		&self,
		principal: PrincipalId,
		assertion: impl Into<TokenSecret>,
	) -> Result<()> {
		let assertion = assertion.into();

		if assertion.is_empty() {
			return Err(AuthenticationError::GrantRejected {
				reason: "user assertion is empty".into(),
			}
			.into());
		}

		let guard = common::flow_guard(self, &principal);
		let _singleflight = guard.lock().await;

		if let Some(cache) = &self.cache {
			cache.evict_principal(&principal);
		}

		<dyn GrantStore>::save(self.store.as_ref(), DelegatedGrant::assertion(principal, assertion))
			.await
			.map_err(Error::from)
	}

	/// Removes the principal's grant and cached tokens; returns whether a grant existed.
	pub async fn sign_out(&self, principal: &PrincipalId) -> Result<bool> {
		let guard = common::flow_guard(self, principal);
		let removed = {
			let _singleflight = guard.lock().await;

			if let Some(cache) = &self.cache {
				cache.evict_principal(principal);
			}

			<dyn GrantStore>::remove(self.store.as_ref(), principal).await?
		};

		common::release_guard(self, principal);

		Ok(removed.is_some())
	}

	async fn rotate_grant(&self, current: &DelegatedGrant, rotated: TokenSecret) -> Result<()> {
		let outcome = <dyn GrantStore>::compare_and_swap(
			self.store.as_ref(),
			&current.principal,
			current.secret.expose(),
			current.clone().rotated(rotated),
		)
		.await?;

		if !matches!(outcome, CompareAndSwapOutcome::Updated) {
			#[cfg(feature = "tracing")]
			{
				tracing::debug!(
					principal = current.principal.as_str(),
					?outcome,
					"grant changed during refresh; keeping the stored value"
				);
			}
		}

		Ok(())
	}

	async fn forget_principal(&self, principal: &PrincipalId) {
		if let Some(cache) = &self.cache {
			cache.evict_principal(principal);
		}

		// The rejection is the error worth surfacing; a failed cleanup only leaves a dead grant.
		let _ = <dyn GrantStore>::remove(self.store.as_ref(), principal).await;

		common::release_guard(self, principal);
	}
}
