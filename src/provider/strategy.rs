//! Provider strategy hooks that customize token exchanges.
//!
//! Implementations decorate outgoing token requests and normalize error mapping
//! without tying flows to any particular HTTP client.

// self
use crate::{_prelude::*, provider::descriptor::GrantType};

const AADSTS_INTERACTION: [&str; 4] = ["50076", "50079", "65001", "50058"];
const AADSTS_GRANT: [&str; 4] = ["70008", "70000", "700082", "50173"];
const AADSTS_CLIENT: [&str; 3] = ["7000215", "700016", "7000222"];

/// Strategy hook that allows providers to decorate requests and classify errors.
///
/// Implementors are required to be `Send + Sync`, and the hooks use crate-owned data
/// types so downstream crates never depend on reqwest-specific structures.
pub trait ProviderStrategy: Send + Sync {
	/// Maps a token endpoint error response into the gateway taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Gives providers a chance to add custom form parameters before dispatching.
	///
	/// The default implementation does nothing.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (bad code, expired refresh token, invalid assertion).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// User must interact again (consent, MFA) before a token can be issued.
	InteractionRequired,
	/// Failure is temporary and should be retried.
	Transient,
}

/// Context passed to provider strategies when classifying token errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
}
impl ProviderErrorContext {
	/// Creates a new context scoped to the provided grant type.
	pub fn new(grant_type: GrantType) -> Self {
		Self { grant_type, http_status: None, oauth_error: None, error_description: None }
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}
}

/// Azure AD (v1 endpoint) strategy.
///
/// `AADSTS` codes embedded in `error_description` take precedence over the generic OAuth
/// `error` field, which in turn takes precedence over the HTTP status.
#[derive(Debug, Default)]
pub struct AzureAdStrategy;
impl Display for AzureAdStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("azure-ad-strategy")
	}
}
impl ProviderStrategy for AzureAdStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if let Some(code) = ctx.error_description.as_deref().and_then(aadsts_code) {
			if AADSTS_INTERACTION.contains(&code) {
				return ProviderErrorKind::InteractionRequired;
			}
			if AADSTS_GRANT.contains(&code) {
				return ProviderErrorKind::InvalidGrant;
			}
			if AADSTS_CLIENT.contains(&code) {
				return ProviderErrorKind::InvalidClient;
			}
		}
		if let Some(kind) = ctx.oauth_error.as_deref().and_then(match_oauth_error) {
			return kind;
		}

		classify_status(ctx.http_status)
	}

	fn augment_token_request(&self, grant: GrantType, form: &mut BTreeMap<String, String>) {
		if matches!(grant, GrantType::OnBehalfOf) {
			form.entry("requested_token_use".into()).or_insert_with(|| "on_behalf_of".into());
		}
	}
}

/// Extracts the numeric part of the first `AADSTSnnnn` marker.
fn aadsts_code(description: &str) -> Option<&str> {
	let start = description.find("AADSTS")? + "AADSTS".len();
	let rest = &description[start..];
	let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());

	if end == 0 { None } else { Some(&rest[..end]) }
}

fn match_oauth_error(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("interaction_required")
		|| value.eq_ignore_ascii_case("consent_required")
		|| value.eq_ignore_ascii_case("login_required")
	{
		Some(ProviderErrorKind::InteractionRequired)
	} else if value.eq_ignore_ascii_case("temporarily_unavailable")
		|| value.eq_ignore_ascii_case("server_error")
	{
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn ctx() -> ProviderErrorContext {
		ProviderErrorContext::new(GrantType::OnBehalfOf).with_http_status(400)
	}

	#[test]
	fn aadsts_codes_take_precedence() {
		let strategy = AzureAdStrategy;
		let mfa = ctx().with_oauth_error("invalid_grant").with_error_description(
			"AADSTS50076: Due to a configuration change made by your administrator, you must use multi-factor authentication.",
		);
		let expired = ctx()
			.with_oauth_error("invalid_grant")
			.with_error_description("AADSTS70008: The provided authorization code or refresh token has expired.");
		let bad_secret = ctx()
			.with_oauth_error("invalid_request")
			.with_error_description("AADSTS7000215: Invalid client secret is provided.");

		assert_eq!(strategy.classify_token_error(&mfa), ProviderErrorKind::InteractionRequired);
		assert_eq!(strategy.classify_token_error(&expired), ProviderErrorKind::InvalidGrant);
		assert_eq!(strategy.classify_token_error(&bad_secret), ProviderErrorKind::InvalidClient);
	}

	#[test]
	fn falls_back_to_oauth_error_then_status() {
		let strategy = AzureAdStrategy;
		let consent = ProviderErrorContext::new(GrantType::RefreshToken)
			.with_oauth_error("consent_required");
		let throttled = ProviderErrorContext::new(GrantType::RefreshToken).with_http_status(429);
		let unknown = ProviderErrorContext::new(GrantType::RefreshToken)
			.with_oauth_error("invalid_resource")
			.with_http_status(401);

		assert_eq!(strategy.classify_token_error(&consent), ProviderErrorKind::InteractionRequired);
		assert_eq!(strategy.classify_token_error(&throttled), ProviderErrorKind::Transient);
		assert_eq!(strategy.classify_token_error(&unknown), ProviderErrorKind::InvalidClient);
	}

	#[test]
	fn aadsts_code_parser_handles_edges() {
		assert_eq!(aadsts_code("AADSTS65001: consent"), Some("65001"));
		assert_eq!(aadsts_code("Trace: AADSTS50058"), Some("50058"));
		assert_eq!(aadsts_code("AADSTS: nothing"), None);
		assert_eq!(aadsts_code("plain text"), None);
	}

	#[test]
	fn on_behalf_of_requests_gain_token_use() {
		let mut form = BTreeMap::new();

		AzureAdStrategy.augment_token_request(GrantType::RefreshToken, &mut form);

		assert!(form.is_empty());

		AzureAdStrategy.augment_token_request(GrantType::OnBehalfOf, &mut form);

		assert_eq!(form.get("requested_token_use").map(String::as_str), Some("on_behalf_of"));
	}
}
