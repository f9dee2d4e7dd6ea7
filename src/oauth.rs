//! Token endpoint client shared by the sign-in and delegation flows.
//!
//! Azure AD's v1 endpoint reports `expires_in`/`expires_on` as strings and accepts the
//! `resource` parameter, so requests and responses are handled here rather than through
//! `oauth2`'s typed client. The `oauth2` crate still supplies the transport contract
//! ([`AsyncHttpClient`]) and the RFC 6749 error body ([`BasicErrorResponse`]).

pub use oauth2;

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	basic::BasicErrorResponse,
	http::{
		Method,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, PrincipalId, ResourceId, TokenSecret},
	error::{AuthenticationError, ConfigError, Endpoint, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{
		ClientAuthMethod, GrantType, ProviderDescriptor, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};

/// Maps HTTP transport failures into gateway [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a gateway error.
	fn map_transport_error(
		&self,
		strategy: &dyn ProviderStrategy,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
///
/// Timeouts surface as [`Error::Timeout`], builder failures as configuration errors,
/// and everything else as [`TransportError`].
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_strategy: &dyn ProviderStrategy,
		_grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) =>
				crate::http::map_reqwest_error(Endpoint::IdentityProvider, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => provider_unavailable(
				format!("HTTP client error occurred while calling the token endpoint: {message}"),
				meta,
			),
			_ => provider_unavailable(
				"HTTP client error occurred while calling the token endpoint".into(),
				meta,
			),
		}
	}
}

/// Successful token endpoint payload.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
	/// Bearer value.
	pub access_token: TokenSecret,
	/// Token type (normally `Bearer`).
	#[serde(default)]
	pub token_type: Option<String>,
	/// Relative lifetime in seconds.
	#[serde(default, deserialize_with = "lenient_seconds")]
	pub expires_in: Option<i64>,
	/// Absolute expiry as Unix seconds.
	#[serde(default, deserialize_with = "lenient_seconds")]
	pub expires_on: Option<i64>,
	/// Rotated or newly issued refresh token.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// OpenID Connect identity token returned by the sign-in redemption.
	#[serde(default)]
	pub id_token: Option<TokenSecret>,
	/// Resource the token was issued for.
	#[serde(default)]
	pub resource: Option<String>,
}
impl TokenResponse {
	/// Converts the payload into an [`AccessToken`] issued at `issued_at`.
	///
	/// `expires_in` wins over `expires_on` when both are present.
	pub fn into_access_token(
		&self,
		principal: PrincipalId,
		resource: ResourceId,
		issued_at: OffsetDateTime,
	) -> Result<AccessToken> {
		let builder = AccessToken::builder(principal, resource)
			.secret(self.access_token.clone())
			.issued_at(issued_at);
		let builder = match (self.expires_in, self.expires_on) {
			(Some(secs), _) => builder.expires_in(Duration::seconds(secs)),
			(None, Some(unix)) => builder.expires_at(
				OffsetDateTime::from_unix_timestamp(unix).map_err(|e| {
					AuthenticationError::InvalidTokenResponse {
						reason: format!("expires_on is out of range ({e})"),
					}
				})?,
			),
			(None, None) => builder,
		};

		builder.build().map_err(|e| {
			AuthenticationError::InvalidTokenResponse { reason: e.to_string() }.into()
		})
	}
}
impl Debug for TokenResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenResponse")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("expires_on", &self.expires_on)
			.field("refresh_token_set", &self.refresh_token.is_some())
			.field("id_token_set", &self.id_token.is_some())
			.field("resource", &self.resource)
			.finish()
	}
}

/// Borrowed view over the broker's client configuration used for one exchange.
pub(crate) struct TokenEndpointClient<'a, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) http_client: &'a C,
	pub(crate) error_mapper: &'a M,
	pub(crate) descriptor: &'a ProviderDescriptor,
	pub(crate) strategy: &'a dyn ProviderStrategy,
	pub(crate) client_id: &'a str,
	pub(crate) client_secret: Option<&'a TokenSecret>,
}
impl<C, M> TokenEndpointClient<'_, C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Posts `form` with the given grant and parses the token response.
	pub(crate) async fn exchange(
		&self,
		grant: GrantType,
		mut form: BTreeMap<String, String>,
	) -> Result<TokenResponse> {
		form.insert("grant_type".into(), grant.as_str().into());

		self.strategy.augment_token_request(grant, &mut form);

		let request = self.build_request(form)?;
		let meta = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(meta.clone());
		let response = handle.call(request).await.map_err(|err| {
			self.error_mapper.map_transport_error(self.strategy, grant, meta.take().as_ref(), err)
		})?;
		let meta = meta.take();

		if response.status().is_success() {
			parse_token_response(&response)
		} else {
			Err(map_error_response(self.strategy, grant, &response, meta.as_ref()))
		}
	}

	fn build_request(&self, mut form: BTreeMap<String, String>) -> Result<HttpRequest> {
		let mut builder = oauth2::http::Request::builder()
			.method(Method::POST)
			.uri(self.descriptor.endpoints.token.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json");

		match self.descriptor.preferred_client_auth_method {
			ClientAuthMethod::ClientSecretPost => {
				form.insert("client_id".into(), self.client_id.into());

				if let Some(secret) = self.client_secret {
					form.insert("client_secret".into(), secret.expose().into());
				}
			},
			ClientAuthMethod::ClientSecretBasic => {
				let secret = self.client_secret.map(TokenSecret::expose).unwrap_or_default();
				let credentials = format!(
					"{}:{}",
					form_urlencoded::byte_serialize(self.client_id.as_bytes()).collect::<String>(),
					form_urlencoded::byte_serialize(secret.as_bytes()).collect::<String>()
				);

				builder = builder.header(AUTHORIZATION, format!("Basic {}", STANDARD.encode(credentials)));
			},
		}

		let body = form_urlencoded::Serializer::new(String::new()).extend_pairs(form.iter()).finish();

		builder.body(body.into_bytes()).map_err(|e| ConfigError::from(e).into())
	}
}

fn parse_token_response(response: &HttpResponse) -> Result<TokenResponse> {
	let status = response.status().as_u16();
	let mut deserializer = serde_json::Deserializer::from_slice(response.body());

	serde_path_to_error::deserialize(&mut deserializer).map_err(|source| {
		AuthenticationError::TokenResponseParse { source, status: Some(status) }.into()
	})
}

fn map_error_response(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: &HttpResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let status = response.status().as_u16();
	let mut ctx = ProviderErrorContext::new(grant).with_http_status(status);
	let message = match serde_json::from_slice::<BasicErrorResponse>(response.body()) {
		Ok(body) => {
			ctx = ctx.with_oauth_error(body.error().as_ref().to_string());

			if let Some(description) = body.error_description() {
				ctx = ctx.with_error_description(description.clone());
			}

			body.error_description()
				.map(|description| first_line(description).to_owned())
				.unwrap_or_else(|| body.error().as_ref().to_string())
		},
		Err(_) => format!("token endpoint returned HTTP {status}"),
	};
	let retry_after = meta.and_then(|value| value.retry_after);

	match strategy.classify_token_error(&ctx) {
		ProviderErrorKind::InvalidGrant => AuthenticationError::GrantRejected { reason: message },
		ProviderErrorKind::InvalidClient => AuthenticationError::ClientRejected { reason: message },
		ProviderErrorKind::InteractionRequired =>
			AuthenticationError::InteractionRequired { reason: message },
		ProviderErrorKind::Transient =>
			AuthenticationError::ProviderUnavailable { message, status: Some(status), retry_after },
	}
	.into()
}

fn provider_unavailable(message: String, meta: Option<&ResponseMetadata>) -> Error {
	AuthenticationError::ProviderUnavailable {
		message,
		status: meta.and_then(|value| value.status),
		retry_after: meta.and_then(|value| value.retry_after),
	}
	.into()
}

// Azure AD descriptions append "Trace ID"/"Correlation ID" lines.
fn first_line(description: &str) -> &str {
	description.lines().next().unwrap_or(description).trim_end()
}

fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Seconds {
		Number(i64),
		Text(String),
	}

	match Option::<Seconds>::deserialize(deserializer)? {
		None => Ok(None),
		Some(Seconds::Number(value)) => Ok(Some(value)),
		Some(Seconds::Text(text)) => text
			.trim()
			.parse::<i64>()
			.map(Some)
			.map_err(|_| serde::de::Error::custom(format!("`{text}` is not a number of seconds"))),
	}
}
