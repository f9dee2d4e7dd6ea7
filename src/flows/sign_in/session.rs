// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*, auth::ResourceId, error::AuthenticationError, provider::ProviderDescriptor,
};

const STATE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods surfaced via [`SignInSession`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// Sign-in handshake metadata returned by
/// [`Broker::start_sign_in`](crate::flows::Broker::start_sign_in).
///
/// Callers keep the session (usually keyed by [`SignInSession::state`]) until the
/// identity provider redirects back with the authorization code.
#[derive(Clone)]
pub struct SignInSession {
	/// Opaque state value that must round-trip via the redirect handler.
	pub state: String,
	/// Redirect URI supplied when constructing the authorize URL.
	pub redirect_uri: Url,
	/// Resource requested at sign-in, if any.
	pub resource: Option<ResourceId>,
	/// Fully-formed authorize URL that callers should send end-users to.
	pub authorize_url: Url,
	/// Instant the session was created.
	pub created_at: OffsetDateTime,
	pkce: PkcePair,
}
impl SignInSession {
	/// PKCE code challenge derived from the secret verifier.
	pub fn code_challenge(&self) -> &str {
		&self.pkce.challenge
	}

	/// PKCE challenge method (currently always `S256`).
	pub fn code_challenge_method(&self) -> PkceCodeChallengeMethod {
		self.pkce.method
	}

	/// Validates the returned `state` parameter after the authorization redirect.
	pub fn validate_state(&self, returned_state: &str) -> Result<()> {
		if returned_state == self.state {
			Ok(())
		} else {
			Err(AuthenticationError::StateMismatch.into())
		}
	}

	pub(super) fn code_verifier(&self) -> &str {
		&self.pkce.verifier
	}
}
impl Debug for SignInSession {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SignInSession")
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.field("resource", &self.resource)
			.field("authorize_url", &self.authorize_url)
			.field("created_at", &self.created_at)
			.field("code_challenge", &self.pkce.challenge)
			.field("code_challenge_method", &self.pkce.method)
			.finish()
	}
}

#[derive(Clone)]
struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}
}

pub(super) fn build_session(
	descriptor: &ProviderDescriptor,
	client_id: &str,
	redirect_uri: Url,
	resource: Option<ResourceId>,
) -> SignInSession {
	let state = random_string(STATE_LEN);
	let pkce = PkcePair::generate();
	let authorize_url =
		build_authorize_url(descriptor, client_id, &redirect_uri, resource.as_ref(), &state, &pkce);

	SignInSession {
		state,
		redirect_uri,
		resource,
		authorize_url,
		created_at: OffsetDateTime::now_utc(),
		pkce,
	}
}

fn build_authorize_url(
	descriptor: &ProviderDescriptor,
	client_id: &str,
	redirect_uri: &Url,
	resource: Option<&ResourceId>,
	state: &str,
	pkce: &PkcePair,
) -> Url {
	let mut url = descriptor.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", client_id);
	pairs.append_pair("redirect_uri", redirect_uri.as_str());

	if let Some(resource) = resource {
		pairs.append_pair("resource", resource.as_str());
	}

	pairs.append_pair("scope", "openid");
	pairs.append_pair("state", state);
	pairs.append_pair("code_challenge", &pkce.challenge);
	pairs.append_pair("code_challenge_method", pkce.method.as_str());

	drop(pairs);

	url
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	let mut hasher = Sha256::new();

	hasher.update(verifier.as_bytes());

	URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::auth::ProviderId;

	fn descriptor() -> ProviderDescriptor {
		ProviderDescriptor::builder(ProviderId::new("azure-ad").expect("Provider id should be valid."))
			.authorization_endpoint(
				Url::parse("https://login.windows.net/tenant/oauth2/authorize")
					.expect("Authorize URL should parse."),
			)
			.token_endpoint(
				Url::parse("https://login.windows.net/tenant/oauth2/token")
					.expect("Token URL should parse."),
			)
			.build()
			.expect("Descriptor should build.")
	}

	#[test]
	fn authorize_url_carries_resource_and_pkce() {
		let resource =
			ResourceId::new("https://graph.windows.net").expect("Resource fixture should be valid.");
		let session = build_session(
			&descriptor(),
			"client-1",
			Url::parse("https://app.example.com/signin/callback").expect("Redirect should parse."),
			Some(resource),
		);
		let pairs: HashMap<String, String> =
			session.authorize_url.query_pairs().into_owned().collect();

		assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
		assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-1"));
		assert_eq!(pairs.get("resource").map(String::as_str), Some("https://graph.windows.net"));
		assert_eq!(pairs.get("scope").map(String::as_str), Some("openid"));
		assert_eq!(pairs.get("state"), Some(&session.state));
		assert_eq!(pairs.get("code_challenge").map(String::as_str), Some(session.code_challenge()));
		assert_eq!(pairs.get("code_challenge_method").map(String::as_str), Some("S256"));
		assert_eq!(session.code_challenge(), compute_pkce_challenge(session.code_verifier()));
		assert!(!format!("{session:?}").contains(session.code_verifier()));
	}

	#[test]
	fn state_validation_errors_on_mismatch() {
		let session = build_session(
			&descriptor(),
			"client-1",
			Url::parse("https://app.example.com/cb").expect("Redirect should parse."),
			None,
		);
		let state = session.state.clone();

		assert!(session.validate_state(&state).is_ok());

		let err = session.validate_state("other").expect_err("State mismatch should fail.");

		assert!(matches!(err, Error::Authentication(AuthenticationError::StateMismatch)));
		assert!(!session.authorize_url.query_pairs().any(|(key, _)| key == "resource"));
	}
}
