// self
use powerbi_gateway::{
	_preludet::*,
	auth::{DelegatedGrant, PrincipalId, ProviderId, ResourceId},
	error::{AuthenticationError, ConfigError, TransportError},
	flows::{Broker, DelegationRequest},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	oauth::{
		TransportErrorMapper,
		oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse},
	},
	provider::{AzureAdStrategy, GrantType, ProviderDescriptor, ProviderStrategy},
	store::{GrantStore, MemoryStore},
};

#[derive(Debug)]
enum FakeTransportError {
	Throttled,
}
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Throttled => write!(f, "Transport throttled."),
		}
	}
}
impl StdError for FakeTransportError {}

#[derive(Clone, Copy)]
struct FakeHttpClient {
	retry_after: Duration,
}
impl FakeHttpClient {
	fn throttled(retry_after: Duration) -> Self {
		Self { retry_after }
	}
}
impl TokenHttpClient for FakeHttpClient {
	type Handle = FakeHttpHandle;
	type TransportError = FakeTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		FakeHttpHandle { slot, retry_after: self.retry_after }
	}
}

struct FakeHttpHandle {
	slot: ResponseMetadataSlot,
	retry_after: Duration,
}
impl<'a> AsyncHttpClient<'a> for FakeHttpHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'a + Send + Sync>>;

	fn call(&'a self, _request: HttpRequest) -> Self::Future {
		let slot = self.slot.clone();
		let retry_after = self.retry_after;

		Box::pin(async move {
			assert!(
				slot.take().is_none(),
				"ResponseMetadataSlot must be clear before dispatching a request."
			);
			slot.store(ResponseMetadata { status: Some(429), retry_after: Some(retry_after) });

			Err(HttpClientError::Reqwest(Box::new(FakeTransportError::Throttled)))
		})
	}
}

#[derive(Clone, Default)]
struct RecordingTransportErrorMapper {
	metadata: Arc<Mutex<Vec<Option<ResponseMetadata>>>>,
}
impl RecordingTransportErrorMapper {
	fn recorded_metadata(&self) -> Vec<Option<ResponseMetadata>> {
		self.metadata.lock().clone()
	}
}
impl TransportErrorMapper<FakeTransportError> for RecordingTransportErrorMapper {
	fn map_transport_error(
		&self,
		strategy: &dyn ProviderStrategy,
		grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<FakeTransportError>,
	) -> Error {
		let status = meta.and_then(|value| value.status);
		let retry_after = meta.and_then(|value| value.retry_after);

		self.metadata.lock().push(meta.cloned());

		let _ = (strategy, grant);

		match err {
			HttpClientError::Reqwest(inner) => AuthenticationError::ProviderUnavailable {
				message: format!("Fake transport error: {inner}"),
				status,
				retry_after,
			}
			.into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			other => AuthenticationError::ProviderUnavailable {
				message: format!("Unhandled HTTP client error variant: {other:?}"),
				status,
				retry_after,
			}
			.into(),
		}
	}
}

fn build_descriptor() -> ProviderDescriptor {
	let provider_id =
		ProviderId::new("mock-token-http").expect("Failed to build mock provider identifier.");

	ProviderDescriptor::builder(provider_id)
		.authorization_endpoint(
			Url::parse("https://mock.example.com/authorize")
				.expect("Failed to parse mock authorization endpoint URL."),
		)
		.token_endpoint(
			Url::parse("https://mock.example.com/token")
				.expect("Failed to parse mock token endpoint URL."),
		)
		.build()
		.expect("Failed to build mock provider descriptor.")
}

async fn throttled_broker(
	retry_after: Duration,
	mapper: Arc<RecordingTransportErrorMapper>,
) -> (Broker<FakeHttpClient, RecordingTransportErrorMapper>, DelegationRequest) {
	let store_backend = Arc::new(MemoryStore::default());
	let principal =
		PrincipalId::new("mock-principal").expect("Failed to build mock principal identifier.");

	store_backend
		.save(DelegatedGrant::refresh_token(principal.clone(), "refresh-throttled"))
		.await
		.expect("Failed to seed the throttled grant.");

	let store: Arc<dyn GrantStore> = store_backend;
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(AzureAdStrategy);
	let http_client = Arc::new(FakeHttpClient::throttled(retry_after));
	let broker = Broker::with_http_client(
		store,
		build_descriptor(),
		strategy,
		"throttled-client",
		http_client,
		mapper,
	)
	.with_client_secret("throttled-secret");
	let request = DelegationRequest::new(
		principal,
		ResourceId::new("https://analysis.windows.net/powerbi/api")
			.expect("Failed to build resource identifier."),
	);

	(broker, request)
}

#[tokio::test]
async fn fake_token_http_client_surfaces_metadata() {
	let mapper = Arc::new(RecordingTransportErrorMapper::default());
	let (broker, request) = throttled_broker(Duration::seconds(5), mapper).await;
	let err = broker
		.acquire_token(request)
		.await
		.expect_err("Request should be throttled with HTTP 429.");

	match err {
		Error::Authentication(AuthenticationError::ProviderUnavailable {
			status,
			retry_after,
			..
		}) => {
			assert_eq!(status, Some(429));
			assert_eq!(retry_after, Some(Duration::seconds(5)));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}
}

#[tokio::test]
async fn fake_mapper_captures_response_metadata() {
	let mapper = Arc::new(RecordingTransportErrorMapper::default());
	let (broker, request) = throttled_broker(Duration::seconds(30), mapper.clone()).await;
	let principal = request.principal.clone();
	let err = broker
		.acquire_token(request)
		.await
		.expect_err("Request should be throttled with HTTP 429.");

	assert!(!err.requires_sign_in(), "Transport failures must not discard the grant.");

	let observed = mapper.recorded_metadata();

	assert_eq!(observed.len(), 1, "Mapper must record a single request.");

	let meta = observed
		.first()
		.and_then(|value| value.clone())
		.expect("Response metadata should be recorded exactly once.");

	assert_eq!(meta.status, Some(429));
	assert_eq!(meta.retry_after, Some(Duration::seconds(30)));
	assert!(
		broker.store.fetch(&principal).await.expect("Store lookup should succeed.").is_some(),
		"A throttled exchange must keep the stored grant."
	);
}
