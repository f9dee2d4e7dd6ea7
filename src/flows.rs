//! Token broker: interactive sign-in, grant storage, and delegated token acquisition.

pub mod cache;
pub mod common;
pub mod sign_in;

mod delegation;

pub use cache::*;
pub use common::*;
pub use sign_in::*;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, PrincipalId, ResourceId, TokenSecret},
	http::TokenHttpClient,
	oauth::{TokenEndpointClient, TransportErrorMapper},
	provider::{ProviderDescriptor, ProviderStrategy},
	store::GrantStore,
};
#[cfg(feature = "reqwest")]
use crate::{
	config::GatewayConfig,
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	provider::AzureAdStrategy,
	store::{FileStore, MemoryStore},
};

#[cfg(feature = "reqwest")]
/// Broker specialized for the crate's default reqwest transport stack.
pub type ReqwestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Boxed future returned by [`TokenSource::access_token`].
pub type TokenSourceFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken>> + 'a + Send>>;

/// Anything that can mint a delegated access token for a principal and resource.
///
/// The dataset gateway depends on this trait rather than on [`Broker`] so tests and
/// embedders can substitute their own token source.
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Returns a bearer token scoped to `resource` on behalf of `principal`.
	fn access_token<'a>(
		&'a self,
		principal: &'a PrincipalId,
		resource: &'a ResourceId,
	) -> TokenSourceFuture<'a>;
}

/// Coordinates sign-in and delegated token exchanges against a single Azure AD tenant.
///
/// The broker owns the HTTP client, grant store, provider descriptor, and strategy
/// references so individual flow implementations can focus on grant-specific logic.
/// Client credentials are stored alongside the descriptor so the client-auth method is
/// applied consistently on every token endpoint call.
#[derive(Clone)]
pub struct Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every outbound provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Grant store holding each principal's refresh token or assertion.
	pub store: Arc<dyn GrantStore>,
	/// Provider descriptor that defines the OAuth endpoints.
	pub descriptor: ProviderDescriptor,
	/// Strategy responsible for provider-specific request adjustments and error mapping.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Application (client) identifier used in every grant.
	pub client_id: String,
	/// Client secret for confidential authentication.
	pub client_secret: Option<TokenSecret>,
	/// Resource requested while redeeming the sign-in authorization code.
	pub sign_in_resource: Option<ResourceId>,
	/// Optional short-lived access-token cache; `None` means every call hits the provider.
	pub cache: Option<Arc<TokenCache>>,
	flow_guards: Arc<Mutex<HashMap<PrincipalId, Arc<AsyncMutex<()>>>>>,
}
impl<C, M> Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a broker that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		store: Arc<dyn GrantStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store,
			descriptor,
			strategy,
			client_id: client_id.into(),
			client_secret: None,
			sign_in_resource: None,
			cache: None,
			flow_guards: Default::default(),
		}
	}

	/// Sets or replaces the client secret.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(TokenSecret::new(secret));

		self
	}

	/// Sets the resource requested when the sign-in authorization code is redeemed.
	pub fn with_sign_in_resource(mut self, resource: ResourceId) -> Self {
		self.sign_in_resource = Some(resource);

		self
	}

	/// Enables the access-token cache.
	pub fn with_token_cache(mut self, cache: TokenCache) -> Self {
		self.cache = Some(Arc::new(cache));

		self
	}

	pub(crate) fn token_endpoint(&self) -> TokenEndpointClient<'_, C, M> {
		TokenEndpointClient {
			http_client: self.http_client.as_ref(),
			error_mapper: self.transport_mapper.as_ref(),
			descriptor: &self.descriptor,
			strategy: self.strategy.as_ref(),
			client_id: &self.client_id,
			client_secret: self.client_secret.as_ref(),
		}
	}
}
#[cfg(feature = "reqwest")]
impl Broker<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a new broker for the provided descriptor and client identifier.
	///
	/// The broker provisions its own reqwest-backed transport so callers do not need
	/// to pass HTTP handles explicitly. Use [`Broker::with_client_secret`] to attach the
	/// confidential client secret.
	pub fn new(
		store: Arc<dyn GrantStore>,
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
	) -> Self {
		Self::with_http_client(
			store,
			descriptor,
			strategy,
			client_id,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}

	/// Builds the broker described by `config`: Azure AD descriptor, file or memory grant
	/// store, timeout-bounded transport, and the optional token cache.
	pub fn from_config(config: &GatewayConfig) -> Result<Self> {
		let descriptor = ProviderDescriptor::azure_ad(&config.authority, &config.tenant_id)
			.map_err(crate::error::ConfigError::from)?;
		let store: Arc<dyn GrantStore> = match &config.grant_store_path {
			Some(path) => Arc::new(FileStore::open(path)?),
			None => Arc::new(MemoryStore::default()),
		};
		let http_client = ReqwestHttpClient::with_timeout(config.request_timeout())?;
		let mut broker = Self::with_http_client(
			store,
			descriptor,
			Arc::new(AzureAdStrategy),
			config.client_id.clone(),
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		);

		broker.client_secret = Some(config.client_secret.clone());
		broker.sign_in_resource = config.sign_in_resource.clone();

		if config.token_cache {
			broker = broker.with_token_cache(TokenCache::default());
		}

		Ok(broker)
	}
}
impl<C, M> Debug for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("sign_in_resource", &self.sign_in_resource)
			.field("cache_enabled", &self.cache.is_some())
			.finish()
	}
}
impl<C, M> TokenSource for Broker<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn access_token<'a>(
		&'a self,
		principal: &'a PrincipalId,
		resource: &'a ResourceId,
	) -> TokenSourceFuture<'a> {
		Box::pin(self.acquire_token(DelegationRequest::new(principal.clone(), resource.clone())))
	}
}
