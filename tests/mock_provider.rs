// std
use std::collections::BTreeMap;
// self
use powerbi_gateway::{
	auth::{ProviderId, TenantId},
	provider::{
		AzureAdStrategy, ClientAuthMethod, GrantType, ProviderDescriptor,
		ProviderDescriptorBuilder, ProviderDescriptorError, ProviderErrorContext,
		ProviderErrorKind, ProviderStrategy,
	},
	url::Url,
};

fn url(value: &str) -> Url {
	Url::parse(value).expect("Failed to parse mock provider URL.")
}

fn builder(id: &str) -> ProviderDescriptorBuilder {
	let provider_id =
		ProviderId::new(id).expect("Failed to build provider identifier for mock descriptor.");

	ProviderDescriptor::builder(provider_id)
}

#[test]
fn descriptor_rejects_insecure_and_missing_endpoints() {
	let err = builder("mock-missing")
		.authorization_endpoint(url("https://example.com/auth"))
		.build()
		.expect_err("Descriptor builder should reject a missing token endpoint.");

	assert!(matches!(err, ProviderDescriptorError::MissingTokenEndpoint));

	let err = builder("mock-insecure")
		.authorization_endpoint(url("http://example.com/auth"))
		.token_endpoint(url("https://example.com/token"))
		.build()
		.expect_err("Descriptor builder should reject insecure authorization endpoints.");

	assert!(matches!(
		err,
		ProviderDescriptorError::InsecureEndpoint { endpoint: "authorization", .. }
	));

	let descriptor = builder("mock-local")
		.authorization_endpoint(url("http://127.0.0.1:9000/auth"))
		.token_endpoint(url("http://127.0.0.1:9000/token"))
		.allow_insecure_endpoints()
		.build()
		.expect("Insecure endpoints should be accepted once explicitly allowed.");

	assert_eq!(descriptor.endpoints.token.as_str(), "http://127.0.0.1:9000/token");
}

#[test]
fn azure_ad_descriptor_targets_tenant_endpoints() {
	let tenant = TenantId::new("contoso.onmicrosoft.com").expect("Tenant fixture should be valid.");

	for authority in ["https://login.windows.net/", "https://login.windows.net"] {
		let descriptor = ProviderDescriptor::azure_ad(&url(authority), &tenant)
			.expect("Azure AD descriptor should build.");

		assert_eq!(
			descriptor.endpoints.authorization.as_str(),
			"https://login.windows.net/contoso.onmicrosoft.com/oauth2/authorize"
		);
		assert_eq!(
			descriptor.endpoints.token.as_str(),
			"https://login.windows.net/contoso.onmicrosoft.com/oauth2/token"
		);
		assert_eq!(descriptor.id.as_str(), "azure-ad:contoso.onmicrosoft.com");
		assert_eq!(descriptor.preferred_client_auth_method, ClientAuthMethod::ClientSecretPost);
	}
}

#[test]
fn azure_strategy_prefers_aadsts_codes() {
	let strategy = AzureAdStrategy;
	let ctx = ProviderErrorContext::new(GrantType::OnBehalfOf)
		.with_http_status(400)
		.with_oauth_error("invalid_grant")
		.with_error_description("AADSTS65001: The user or administrator has not consented.");

	assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InteractionRequired);

	let ctx = ProviderErrorContext::new(GrantType::RefreshToken)
		.with_http_status(400)
		.with_oauth_error("invalid_grant")
		.with_error_description("AADSTS70008: The provided refresh token has expired.");

	assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InvalidGrant);

	let ctx = ProviderErrorContext::new(GrantType::AuthorizationCode)
		.with_http_status(401)
		.with_oauth_error("invalid_client")
		.with_error_description("AADSTS7000215: Invalid client secret provided.");

	assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InvalidClient);
}

#[test]
fn azure_strategy_falls_back_to_oauth_error_and_status() {
	let strategy = AzureAdStrategy;
	let ctx =
		ProviderErrorContext::new(GrantType::RefreshToken).with_oauth_error("temporarily_unavailable");

	assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::Transient);

	let ctx = ProviderErrorContext::new(GrantType::RefreshToken).with_http_status(401);

	assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InvalidClient);

	let ctx = ProviderErrorContext::new(GrantType::RefreshToken).with_http_status(503);

	assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::Transient);
}

#[test]
fn on_behalf_of_requests_are_marked() {
	let strategy = AzureAdStrategy;
	let mut form = BTreeMap::new();

	strategy.augment_token_request(GrantType::OnBehalfOf, &mut form);

	assert_eq!(form.get("requested_token_use").map(String::as_str), Some("on_behalf_of"));

	let mut form = BTreeMap::new();

	strategy.augment_token_request(GrantType::RefreshToken, &mut form);

	assert!(form.is_empty());
}

#[test]
fn custom_strategy_can_augment_token_requests() {
	struct AudienceStrategy;
	impl ProviderStrategy for AudienceStrategy {
		fn classify_token_error(&self, _ctx: &ProviderErrorContext) -> ProviderErrorKind {
			ProviderErrorKind::InvalidGrant
		}

		fn augment_token_request(&self, grant: GrantType, form: &mut BTreeMap<String, String>) {
			form.insert("audience".into(), format!("for:{grant}"));
		}
	}

	let strategy = AudienceStrategy;
	let mut form = BTreeMap::new();

	strategy.augment_token_request(GrantType::RefreshToken, &mut form);

	assert_eq!(form.get("audience").map(String::as_str), Some("for:refresh_token"));
}
