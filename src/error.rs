//! Gateway-wide error taxonomy shared by the broker, the dataset gateway, and the HTTP surface.

// self
use crate::{_prelude::*, auth::PrincipalId};

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type BodyParseError = serde_path_to_error::Error<serde_json::Error>;

/// Remote party a failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
	/// Azure AD token and authorization endpoints.
	IdentityProvider,
	/// Power BI REST API.
	AnalyticsApi,
}
impl Endpoint {
	/// Returns a stable label suitable for messages and span fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Endpoint::IdentityProvider => "identity provider",
			Endpoint::AnalyticsApi => "analytics API",
		}
	}
}
impl Display for Endpoint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Grant storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem; fatal at startup.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// No delegated token could be produced for the principal.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// Analytics API returned a non-success status or an unusable body.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
	/// Network failure reaching either remote party.
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Analytics API reported that the addressed entity does not exist.
	#[error("{resource} was not found.")]
	NotFound {
		/// Human-readable description of the missing entity.
		resource: String,
	},
	/// A remote call exceeded the configured request timeout.
	#[error("Request to the {endpoint} timed out.")]
	Timeout {
		/// Remote party that failed to answer in time.
		endpoint: Endpoint,
	},
}
impl Error {
	/// Returns `true` when the caller must restart the sign-in flow.
	pub fn requires_sign_in(&self) -> bool {
		matches!(
			self,
			Error::Authentication(
				AuthenticationError::MissingGrant { .. }
					| AuthenticationError::GrantRejected { .. }
					| AuthenticationError::InteractionRequired { .. }
					| AuthenticationError::StateMismatch
			)
		)
	}

	/// Returns `true` when the identity provider rejected the stored grant itself.
	pub(crate) fn is_grant_rejected(&self) -> bool {
		matches!(
			self,
			Error::Authentication(
				AuthenticationError::GrantRejected { .. }
					| AuthenticationError::InteractionRequired { .. }
			)
		)
	}
}

/// Configuration and validation failures; surfaced at startup or while building requests.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Identity provider descriptor failed validation.
	#[error(transparent)]
	InvalidDescriptor(#[from] crate::provider::ProviderDescriptorError),
	/// A required setting is absent.
	#[error("Required setting `{key}` is missing.")]
	MissingSetting {
		/// Setting name (environment variable or field).
		key: &'static str,
	},
	/// A setting is present but unusable.
	#[error("Setting `{key}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name (environment variable or field).
		key: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// Analytics API base URL cannot carry path segments.
	#[error("Analytics API base URL `{url}` cannot be used as a base.")]
	InvalidApiBase {
		/// Offending URL.
		url: String,
	},
	/// Sign-in redirect URI must use HTTP(S).
	#[error("Redirect URI `{url}` must use http or https.")]
	InvalidRedirect {
		/// Offending URL.
		url: String,
	},
	/// Outbound request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody {
		/// Serializer failure.
		#[source]
		source: serde_json::Error,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures that prevent the broker from producing a delegated token.
#[derive(Debug, ThisError)]
pub enum AuthenticationError {
	/// No grant has been stored for the principal.
	#[error("No authorization grant is stored for principal `{principal}`; sign-in is required.")]
	MissingGrant {
		/// Principal that has not signed in.
		principal: PrincipalId,
	},
	/// Sign-in callback carried a state value that does not match the session.
	#[error("Sign-in state mismatch.")]
	StateMismatch,
	/// Provider rejected the authorization code, refresh token, or assertion.
	#[error("Identity provider rejected the grant: {reason}.")]
	GrantRejected {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider rejected the application credential.
	#[error("Identity provider rejected the client credential: {reason}.")]
	ClientRejected {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider requires the user to interact (consent, MFA) before issuing tokens.
	#[error("Identity provider requires user interaction: {reason}.")]
	InteractionRequired {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider answered with an error that does not fit the other categories.
	#[error("Identity provider is unavailable: {message}.")]
	ProviderUnavailable {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from the provider, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: BodyParseError,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint response parsed but lacks required data.
	#[error("Token endpoint response is unusable: {reason}.")]
	InvalidTokenResponse {
		/// What was missing or out of range.
		reason: String,
	},
	/// Sign-in response does not identify the principal.
	#[error("Sign-in response does not carry an object identifier claim.")]
	MissingPrincipalClaim,
}

/// Analytics API failures.
#[derive(Debug, ThisError)]
pub enum UpstreamError {
	/// Non-success HTTP status.
	#[error("Analytics API returned HTTP {status}: {message}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Preview of the response body.
		message: String,
		/// Retry-After hint, if supplied.
		retry_after: Option<Duration>,
	},
	/// Response body could not be parsed into the expected shape.
	#[error("Analytics API returned a malformed body.")]
	MalformedBody {
		/// Structured parsing failure.
		#[source]
		source: BodyParseError,
		/// HTTP status code of the response.
		status: u16,
	},
	/// Dataset creation response did not carry the assigned identifier.
	#[error("Analytics API did not return an identifier for the created dataset.")]
	MissingDatasetId,
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the {endpoint}.")]
	Network {
		/// Remote party being called.
		endpoint: Endpoint,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(endpoint: Endpoint, src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn sign_in_is_required_only_for_grant_failures() {
		let principal = PrincipalId::new("user-1").expect("Principal fixture should be valid.");
		let missing: Error = AuthenticationError::MissingGrant { principal }.into();
		let rejected: Error = AuthenticationError::GrantRejected { reason: "expired".into() }.into();
		let client: Error = AuthenticationError::ClientRejected { reason: "bad secret".into() }.into();
		let timeout = Error::Timeout { endpoint: Endpoint::IdentityProvider };

		assert!(missing.requires_sign_in());
		assert!(rejected.requires_sign_in());
		assert!(rejected.is_grant_rejected());
		assert!(!missing.is_grant_rejected());
		assert!(!client.requires_sign_in());
		assert!(!timeout.requires_sign_in());
	}

	#[test]
	fn messages_name_the_remote_party() {
		let timeout = Error::Timeout { endpoint: Endpoint::AnalyticsApi };
		let network = TransportError::network(
			Endpoint::IdentityProvider,
			std::io::Error::other("connection reset"),
		);

		assert_eq!(timeout.to_string(), "Request to the analytics API timed out.");
		assert_eq!(network.to_string(), "Network error occurred while calling the identity provider.");
	}
}
