//! Interactive sign-in: authorize redirect, code redemption, and grant storage.
//!
//! [`Broker::start_sign_in`] produces a [`SignInSession`] whose authorize URL the user
//! follows. Once Azure AD redirects back, [`Broker::complete_sign_in`] validates the
//! returned state, redeems the authorization code (with the PKCE verifier), resolves the
//! principal from the `oid` claim of the returned `id_token`, and stores the refresh
//! token as that principal's grant.

mod session;

pub use session::*;

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, DelegatedGrant, PrincipalId, ResourceId},
	error::{AuthenticationError, ConfigError},
	flows::{Broker, common},
	http::TokenHttpClient,
	oauth::{TokenResponse, TransportErrorMapper},
	obs::{self, FlowKind},
	provider::GrantType,
	store::GrantStore,
};

/// Result of a completed sign-in.
#[derive(Clone, Debug)]
pub struct SignInOutcome {
	/// Principal whose grant was stored.
	pub principal: PrincipalId,
	/// Access token issued alongside the grant, when the sign-in resource is known.
	pub access_token: Option<AccessToken>,
}

impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds the authorize URL plus state and PKCE material for a new sign-in.
	pub fn start_sign_in(&self, redirect_uri: Url) -> Result<SignInSession> {
		let _span = obs::FlowSpan::new(FlowKind::SignIn, "start_sign_in").entered();

		if !matches!(redirect_uri.scheme(), "http" | "https") || redirect_uri.cannot_be_a_base() {
			return Err(ConfigError::InvalidRedirect { url: redirect_uri.to_string() }.into());
		}

		Ok(session::build_session(
			&self.descriptor,
			&self.client_id,
			redirect_uri,
			self.sign_in_resource.clone(),
		))
	}

	/// Redeems the authorization code and stores the principal's grant.
	///
	/// The principal is read from the `oid` claim of the returned `id_token`.
	pub async fn complete_sign_in(
		&self,
		session: SignInSession,
		returned_state: &str,
		code: &str,
	) -> Result<SignInOutcome> {
		obs::observe(
			FlowKind::SignIn,
			"complete_sign_in",
			self.redeem(session, returned_state, code, None),
		)
		.await
	}

	/// Same as [`Broker::complete_sign_in`] but binds the grant to a caller-supplied principal.
	pub async fn complete_sign_in_as(
		&self,
		principal: PrincipalId,
		session: SignInSession,
		returned_state: &str,
		code: &str,
	) -> Result<SignInOutcome> {
		obs::observe(
			FlowKind::SignIn,
			"complete_sign_in_as",
			self.redeem(session, returned_state, code, Some(principal)),
		)
		.await
	}

	async fn redeem(
		&self,
		session: SignInSession,
		returned_state: &str,
		code: &str,
		principal: Option<PrincipalId>,
	) -> Result<SignInOutcome> {
		session.validate_state(returned_state)?;

		let mut form = BTreeMap::new();

		form.insert("code".into(), code.to_owned());
		form.insert("redirect_uri".into(), session.redirect_uri.to_string());
		form.insert("code_verifier".into(), session.code_verifier().to_owned());

		if let Some(resource) = &session.resource {
			form.insert("resource".into(), resource.to_string());
		}

		let issued_at = OffsetDateTime::now_utc();
		let response = self.token_endpoint().exchange(GrantType::AuthorizationCode, form).await?;
		let principal = match principal {
			Some(principal) => principal,
			None => principal_from_id_token(&response)?,
		};
		let refresh_token = response.refresh_token.clone().ok_or_else(|| {
			AuthenticationError::InvalidTokenResponse {
				reason: "sign-in response did not include a refresh token".into(),
			}
		})?;
		let guard = common::flow_guard(self, &principal);
		let _singleflight = guard.lock().await;

		<dyn GrantStore>::save(
			self.store.as_ref(),
			DelegatedGrant::refresh_token(principal.clone(), refresh_token),
		)
		.await?;

		if let Some(cache) = &self.cache {
			cache.evict_principal(&principal);
		}

		let resource = session
			.resource
			.clone()
			.or_else(|| response.resource.as_deref().and_then(|value| ResourceId::new(value).ok()));
		let access_token = match resource {
			Some(resource) =>
				Some(response.into_access_token(principal.clone(), resource, issued_at)?),
			None => None,
		};

		Ok(SignInOutcome { principal, access_token })
	}
}

#[derive(Deserialize)]
struct IdTokenClaims {
	oid: Option<String>,
}

/// Reads the `oid` claim from the (unverified) identity token payload.
///
/// The token arrived over TLS directly from the token endpoint, so its signature is not
/// re-checked here.
fn principal_from_id_token(response: &TokenResponse) -> Result<PrincipalId> {
	let id_token = response.id_token.as_ref().ok_or(AuthenticationError::MissingPrincipalClaim)?;
	let payload = id_token
		.expose()
		.split('.')
		.nth(1)
		.ok_or(AuthenticationError::MissingPrincipalClaim)?;
	let bytes = URL_SAFE_NO_PAD
		.decode(payload.trim_end_matches('='))
		.map_err(|_| AuthenticationError::MissingPrincipalClaim)?;
	let claims: IdTokenClaims =
		serde_json::from_slice(&bytes).map_err(|_| AuthenticationError::MissingPrincipalClaim)?;

	claims
		.oid
		.and_then(|oid| PrincipalId::new(oid).ok())
		.ok_or_else(|| AuthenticationError::MissingPrincipalClaim.into())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn response_with_id_token(claims: &str) -> TokenResponse {
		let id_token = format!(
			"{}.{}.",
			URL_SAFE_NO_PAD.encode(r#"{"typ":"JWT","alg":"none"}"#),
			URL_SAFE_NO_PAD.encode(claims)
		);

		serde_json::from_value(serde_json::json!({
			"access_token": "at",
			"expires_in": "3599",
			"id_token": id_token,
		}))
		.expect("Token response fixture should parse.")
	}

	#[test]
	fn oid_claim_becomes_principal() {
		let response =
			response_with_id_token(r#"{"oid":"5f1c7f0e-2d1a-4bb3-9a57-0b6f3c1e9d42","upn":"a@b"}"#);
		let principal = principal_from_id_token(&response).expect("The oid claim should resolve.");

		assert_eq!(principal.as_str(), "5f1c7f0e-2d1a-4bb3-9a57-0b6f3c1e9d42");
	}

	#[test]
	fn missing_or_garbled_claims_are_rejected() {
		for response in [
			response_with_id_token(r#"{"upn":"a@b"}"#),
			response_with_id_token("not json"),
			serde_json::from_str(r#"{"access_token":"at","expires_in":60}"#)
				.expect("Token response fixture should parse."),
		] {
			assert!(matches!(
				principal_from_id_token(&response),
				Err(Error::Authentication(AuthenticationError::MissingPrincipalClaim))
			));
		}
	}
}
