//! Inbound HTTP surface mapping routes onto broker and gateway operations.
//!
//! Handlers read the caller's [`Principal`] from request extensions. The bundled router
//! fills that extension from a trusted header (see [`AppState::principal_header`]) set by
//! an authenticating reverse proxy; embedders with their own session layer can insert the
//! extension themselves and leave the header unset.

// crates.io
use axum::{
	Json, Router,
	extract::{FromRequestParts, Path, Query, Request, State},
	http::{
		HeaderMap, HeaderName, StatusCode,
		header::{HOST, LOCATION},
		request::Parts,
	},
	middleware::{self, Next},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use tokio::net::TcpListener;
// self
use crate::{
	_prelude::*,
	auth::{DatasetId, PrincipalId},
	config::GatewayConfig,
	error::AuthenticationError,
	flows::{ReqwestBroker, SignInSession, TokenSource},
	gateway::{Dataset, DatasetGateway, RowBatch, TableReference},
};

const SIGN_IN_PATH: &str = "/signin";
const CALLBACK_PATH: &str = "/signin/callback";
const PENDING_SIGN_IN_TTL: Duration = Duration::minutes(10);

/// Authenticated caller attached to a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal(pub PrincipalId);
impl<S> FromRequestParts<S> for Principal
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
		parts.extensions.get::<Principal>().cloned().ok_or(ApiError::MissingPrincipal)
	}
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
	/// Token broker handling sign-in and delegated exchanges.
	pub broker: Arc<ReqwestBroker>,
	/// Dataset gateway backed by the broker.
	pub gateway: Arc<DatasetGateway<dyn TokenSource>>,
	/// Header trusted to carry the principal; `None` expects an upstream layer to set
	/// the [`Principal`] extension.
	pub principal_header: Option<HeaderName>,
	/// Fixed sign-in callback URL; derived from the `Host` header when absent.
	pub redirect_uri: Option<Url>,
	pending_sign_ins: Arc<Mutex<HashMap<String, SignInSession>>>,
}
impl AppState {
	/// Wires state from already-built components.
	pub fn new(broker: Arc<ReqwestBroker>, gateway: Arc<DatasetGateway<dyn TokenSource>>) -> Self {
		Self {
			broker,
			gateway,
			principal_header: None,
			redirect_uri: None,
			pending_sign_ins: Default::default(),
		}
	}

	/// Builds the broker and gateway described by `config`, sharing one HTTP client.
	pub fn from_config(config: &GatewayConfig) -> Result<Self> {
		let broker = Arc::new(ReqwestBroker::from_config(config)?);
		let tokens: Arc<dyn TokenSource> = broker.clone();
		let gateway =
			DatasetGateway::from_config(tokens, (*broker.http_client).clone(), config)?;
		let principal_header = HeaderName::from_bytes(config.principal_header.as_bytes())
			.map_err(|e| crate::error::ConfigError::InvalidSetting {
				key: "POWERBI_PRINCIPAL_HEADER",
				reason: e.to_string(),
			})?;

		Ok(Self::new(broker, Arc::new(gateway)).with_principal_header(principal_header))
	}

	/// Trusts `header` as the source of the caller's principal.
	pub fn with_principal_header(mut self, header: HeaderName) -> Self {
		self.principal_header = Some(header);

		self
	}

	/// Pins the sign-in callback URL.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	fn remember(&self, session: SignInSession) {
		let cutoff = OffsetDateTime::now_utc() - PENDING_SIGN_IN_TTL;
		let mut pending = self.pending_sign_ins.lock();

		pending.retain(|_, session| session.created_at > cutoff);
		pending.insert(session.state.clone(), session);
	}

	fn take(&self, state: &str) -> Option<SignInSession> {
		self.pending_sign_ins.lock().remove(state)
	}
}
impl Debug for AppState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppState")
			.field("broker", &self.broker)
			.field("gateway", &self.gateway)
			.field("principal_header", &self.principal_header)
			.field("redirect_uri", &self.redirect_uri)
			.finish()
	}
}

/// Error rendered as a JSON body with a mapped status code.
#[derive(Debug, ThisError)]
pub enum ApiError {
	/// Broker or gateway failure.
	#[error(transparent)]
	Gateway(#[from] Error),
	/// No principal was attached to the request.
	#[error("Request is not associated with a signed-in principal.")]
	MissingPrincipal,
	/// Request parameters could not be used.
	#[error("{0}")]
	BadRequest(String),
}
impl ApiError {
	/// HTTP status for this error.
	pub fn status(&self) -> StatusCode {
		match self {
			ApiError::Gateway(err) => status_for(err),
			ApiError::MissingPrincipal => StatusCode::UNAUTHORIZED,
			ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
		}
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		let sign_in = (status == StatusCode::UNAUTHORIZED).then_some(SIGN_IN_PATH);

		if status.is_server_error() {
			tracing::error!(%status, error = %self, "request failed");
		} else {
			tracing::debug!(%status, error = %self, "request rejected");
		}

		(status, Json(ErrorBody { error: self.to_string(), sign_in })).into_response()
	}
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
	error: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	sign_in: Option<&'static str>,
}

#[derive(Deserialize)]
struct CallbackQuery {
	code: Option<String>,
	state: Option<String>,
	error: Option<String>,
	error_description: Option<String>,
}

#[derive(Serialize)]
struct SignedIn {
	principal: PrincipalId,
}

/// Maps a crate error onto the HTTP status returned to callers.
pub fn status_for(err: &Error) -> StatusCode {
	match err {
		Error::Authentication(_) => StatusCode::UNAUTHORIZED,
		Error::NotFound { .. } => StatusCode::NOT_FOUND,
		Error::Upstream(_) => StatusCode::BAD_GATEWAY,
		Error::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
		Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
		Error::Config(_) | Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

/// Builds the router with every dataset and sign-in route.
pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/datasets", get(list_datasets).post(create_dataset))
		.route("/datasets/{id}", get(get_dataset))
		.route("/tables/clear", post(clear_table))
		.route("/tables/rows", post(add_table_rows))
		.route(SIGN_IN_PATH, get(start_sign_in))
		.route(CALLBACK_PATH, get(complete_sign_in))
		.layer(middleware::from_fn_with_state(state.clone(), principal_from_header))
		.with_state(state)
}

/// Serves `router(state)` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
	F: 'static + Send + Future<Output = ()>,
{
	tracing::info!(address = ?listener.local_addr().ok(), "serving dataset gateway");

	axum::serve(listener, router(state)).with_graceful_shutdown(shutdown).await
}

async fn principal_from_header(
	State(state): State<AppState>,
	mut request: Request,
	next: Next,
) -> Response {
	let principal = match &state.principal_header {
		Some(header) if request.extensions().get::<Principal>().is_none() => request
			.headers()
			.get(header)
			.and_then(|value| value.to_str().ok())
			.and_then(|value| PrincipalId::new(value.trim()).ok()),
		_ => None,
	};

	if let Some(principal) = principal {
		request.extensions_mut().insert(Principal(principal));
	}

	next.run(request).await
}

async fn list_datasets(
	State(state): State<AppState>,
	Principal(principal): Principal,
) -> Result<Json<Vec<Dataset>>, ApiError> {
	Ok(Json(state.gateway.list_datasets(&principal).await?))
}

async fn get_dataset(
	State(state): State<AppState>,
	Principal(principal): Principal,
	Path(id): Path<String>,
) -> Result<Json<Dataset>, ApiError> {
	let id = DatasetId::new(&id).map_err(|e| ApiError::BadRequest(e.to_string()))?;

	Ok(Json(state.gateway.get_dataset(&principal, &id).await?))
}

async fn create_dataset(
	State(state): State<AppState>,
	Principal(principal): Principal,
	Json(dataset): Json<Dataset>,
) -> Result<Json<Dataset>, ApiError> {
	Ok(Json(state.gateway.create_dataset(&principal, dataset).await?))
}

async fn clear_table(
	State(state): State<AppState>,
	Principal(principal): Principal,
	Json(table): Json<TableReference>,
) -> Result<Json<bool>, ApiError> {
	Ok(Json(state.gateway.clear_table(&principal, &table).await?))
}

async fn add_table_rows(
	State(state): State<AppState>,
	Principal(principal): Principal,
	Json(batch): Json<RowBatch>,
) -> Result<Json<bool>, ApiError> {
	Ok(Json(state.gateway.add_table_rows(&principal, &batch).await?))
}

async fn start_sign_in(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Response, ApiError> {
	let redirect_uri = callback_url(&state, &headers)?;
	let session = state.broker.start_sign_in(redirect_uri)?;
	let location = session.authorize_url.to_string();

	state.remember(session);

	Ok((StatusCode::FOUND, [(LOCATION, location)]).into_response())
}

async fn complete_sign_in(
	State(state): State<AppState>,
	Query(query): Query<CallbackQuery>,
) -> Result<Json<SignedIn>, ApiError> {
	if let Some(error) = query.error {
		let reason = query.error_description.unwrap_or(error);

		return Err(Error::from(AuthenticationError::GrantRejected { reason }).into());
	}

	let (Some(code), Some(returned_state)) = (query.code, query.state) else {
		return Err(ApiError::BadRequest("callback requires `code` and `state`".into()));
	};
	let session = state
		.take(&returned_state)
		.ok_or_else(|| Error::from(AuthenticationError::StateMismatch))?;
	let outcome = state.broker.complete_sign_in(session, &returned_state, &code).await?;

	tracing::info!(principal = outcome.principal.as_str(), "principal signed in");

	Ok(Json(SignedIn { principal: outcome.principal }))
}

fn callback_url(state: &AppState, headers: &HeaderMap) -> Result<Url, ApiError> {
	if let Some(url) = &state.redirect_uri {
		return Ok(url.clone());
	}

	let host = headers
		.get(HOST)
		.and_then(|value| value.to_str().ok())
		.ok_or_else(|| ApiError::BadRequest("request carries no Host header".into()))?;
	let scheme = headers
		.get("x-forwarded-proto")
		.and_then(|value| value.to_str().ok())
		.filter(|value| matches!(*value, "http" | "https"))
		.unwrap_or("http");

	Url::parse(&format!("{scheme}://{host}{CALLBACK_PATH}"))
		.map_err(|e| ApiError::BadRequest(format!("cannot build callback URL: {e}")))
}
