// crates.io
use reqwest::{
	Method, Response, StatusCode,
	header::{ACCEPT, CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{DatasetId, PrincipalId, ResourceId},
	config::GatewayConfig,
	error::{ConfigError, Endpoint, UpstreamError},
	flows::TokenSource,
	gateway::{Dataset, RowBatch, RowEncoding, Table, TableReference},
	http::{self, ReqwestHttpClient},
	obs::{self, FlowKind},
};

const ERROR_PREVIEW_LEN: usize = 256;

/// Client for the dataset API acting on behalf of explicit principals.
pub struct DatasetGateway<T>
where
	T: ?Sized + TokenSource,
{
	tokens: Arc<T>,
	http_client: ReqwestHttpClient,
	base_url: Url,
	resource: ResourceId,
	row_encoding: RowEncoding,
}
impl<T> DatasetGateway<T>
where
	T: ?Sized + TokenSource,
{
	/// Creates a gateway rooted at `base_url` that requests tokens for `resource`.
	pub fn new(
		tokens: Arc<T>,
		http_client: ReqwestHttpClient,
		base_url: Url,
		resource: ResourceId,
	) -> Result<Self> {
		if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
			return Err(ConfigError::InvalidApiBase { url: base_url.to_string() }.into());
		}

		Ok(Self { tokens, http_client, base_url, resource, row_encoding: RowEncoding::default() })
	}

	/// Builds the gateway described by `config`, sharing `http_client` with the broker.
	pub fn from_config(
		tokens: Arc<T>,
		http_client: ReqwestHttpClient,
		config: &GatewayConfig,
	) -> Result<Self> {
		Ok(Self::new(tokens, http_client, config.api_base_url.clone(), config.resource.clone())?
			.with_row_encoding(config.row_encoding))
	}

	/// Overrides the row value encoding used by [`DatasetGateway::add_table_rows`].
	pub fn with_row_encoding(mut self, row_encoding: RowEncoding) -> Self {
		self.row_encoding = row_encoding;

		self
	}

	/// Base URL every request path is appended to.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Active row value encoding.
	pub fn row_encoding(&self) -> RowEncoding {
		self.row_encoding
	}

	/// Lists the datasets visible to `principal`.
	pub async fn list_datasets(&self, principal: &PrincipalId) -> Result<Vec<Dataset>> {
		obs::observe(FlowKind::ListDatasets, "list_datasets", async move {
			let url = self.endpoint(&["datasets"])?;
			let response = self.send(principal, Method::GET, url, None).await?;
			let list = read_json::<DatasetList>(response).await?;

			Ok(list.datasets)
		})
		.await
	}

	/// Fetches a single dataset.
	///
	/// A 404 from the API surfaces as [`Error::NotFound`].
	pub async fn get_dataset(&self, principal: &PrincipalId, id: &DatasetId) -> Result<Dataset> {
		obs::observe(FlowKind::GetDataset, "get_dataset", async move {
			let url = self.endpoint(&["datasets", id.as_str()])?;
			let response = self.send(principal, Method::GET, url, None).await?;

			if response.status() == StatusCode::NOT_FOUND {
				return Err(Error::NotFound { resource: format!("Dataset `{id}`") });
			}

			read_json(response).await
		})
		.await
	}

	/// Creates `dataset` and returns it with the identifier assigned by the API.
	///
	/// Any identifier already present on `dataset` is never sent.
	pub async fn create_dataset(&self, principal: &PrincipalId, dataset: Dataset) -> Result<Dataset> {
		obs::observe(FlowKind::CreateDataset, "create_dataset", async move {
			let body = serde_json::to_vec(&NewDataset { name: &dataset.name, tables: &dataset.tables })
				.map_err(|source| ConfigError::RequestBody { source })?;
			let url = self.endpoint(&["datasets"])?;
			let response = self.send(principal, Method::POST, url, Some(body)).await?;
			let created = read_json::<CreatedDataset>(response).await?;
			let id = created.id.ok_or(UpstreamError::MissingDatasetId)?;

			Ok(Dataset { id: Some(id), ..dataset })
		})
		.await
	}

	/// Deletes every row of the referenced table.
	///
	/// Returns `true` once the API answered; a non-success status is logged, not raised.
	pub async fn clear_table(&self, principal: &PrincipalId, table: &TableReference) -> Result<bool> {
		obs::observe(FlowKind::ClearTable, "clear_table", async move {
			let url = self.rows_endpoint(table)?;
			let response = self.send(principal, Method::DELETE, url, None).await?;

			tolerate(FlowKind::ClearTable, response).await
		})
		.await
	}

	/// Appends `batch.rows` to the referenced table using the configured [`RowEncoding`].
	///
	/// Returns `true` once the API answered; a non-success status is logged, not raised.
	pub async fn add_table_rows(&self, principal: &PrincipalId, batch: &RowBatch) -> Result<bool> {
		obs::observe(FlowKind::AddTableRows, "add_table_rows", async move {
			let body = self.row_encoding.encode(&batch.rows)?;
			let url = self.rows_endpoint(&batch.table)?;
			let response = self.send(principal, Method::POST, url, Some(body)).await?;

			tolerate(FlowKind::AddTableRows, response).await
		})
		.await
	}

	fn rows_endpoint(&self, table: &TableReference) -> Result<Url> {
		self.endpoint(&["datasets", table.dataset_id.as_str(), "tables", &table.table_name, "rows"])
	}

	fn endpoint(&self, segments: &[&str]) -> Result<Url> {
		let mut url = self.base_url.clone();

		url.path_segments_mut()
			.map_err(|_| ConfigError::InvalidApiBase { url: self.base_url.to_string() })?
			.pop_if_empty()
			.extend(segments);

		Ok(url)
	}

	async fn send(
		&self,
		principal: &PrincipalId,
		method: Method,
		url: Url,
		body: Option<Vec<u8>>,
	) -> Result<Response> {
		let token = self.tokens.access_token(principal, &self.resource).await?;
		let mut request = self
			.http_client
			.request(method, url)
			.bearer_auth(token.bearer())
			.header(ACCEPT, "application/json");

		if let Some(body) = body {
			request = request.header(CONTENT_TYPE, "application/json").body(body);
		}

		request.send().await.map_err(|e| http::map_reqwest_error(Endpoint::AnalyticsApi, e))
	}
}
impl<T> Debug for DatasetGateway<T>
where
	T: ?Sized + TokenSource,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DatasetGateway")
			.field("base_url", &self.base_url.as_str())
			.field("resource", &self.resource)
			.field("row_encoding", &self.row_encoding)
			.finish()
	}
}

#[derive(Deserialize)]
struct DatasetList {
	#[serde(alias = "value")]
	datasets: Vec<Dataset>,
}

#[derive(Serialize)]
struct NewDataset<'a> {
	name: &'a str,
	tables: &'a [Table],
}

#[derive(Deserialize)]
struct CreatedDataset {
	#[serde(default)]
	id: Option<DatasetId>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
	error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
	code: String,
	#[serde(default)]
	message: Option<String>,
}

async fn read_body(response: Response) -> Result<(StatusCode, Option<Duration>, Vec<u8>)> {
	let status = response.status();
	let retry_after = http::parse_retry_after(response.headers());
	let body = response
		.bytes()
		.await
		.map_err(|e| http::map_reqwest_error(Endpoint::AnalyticsApi, e))?;

	Ok((status, retry_after, body.to_vec()))
}

async fn read_json<D>(response: Response) -> Result<D>
where
	D: DeserializeOwned,
{
	let (status, retry_after, body) = read_body(response).await?;

	if !status.is_success() {
		return Err(UpstreamError::Status {
			status: status.as_u16(),
			message: error_message(&body),
			retry_after,
		}
		.into());
	}

	let mut deserializer = serde_json::Deserializer::from_slice(&body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| UpstreamError::MalformedBody { source, status: status.as_u16() }.into())
}

async fn tolerate(kind: FlowKind, response: Response) -> Result<bool> {
	let (status, _, body) = read_body(response).await?;

	if !status.is_success() {
		obs::warn_tolerated(kind, status.as_u16(), &error_message(&body));
	}

	Ok(true)
}

fn error_message(body: &[u8]) -> String {
	if let Ok(parsed) = serde_json::from_slice::<ApiErrorBody>(body) {
		return match parsed.error.message {
			Some(message) => format!("{}: {message}", parsed.error.code),
			None => parsed.error.code,
		};
	}

	let text = String::from_utf8_lossy(body);
	let text = text.trim();

	if text.is_empty() {
		return "empty response body".into();
	}

	text.chars().take(ERROR_PREVIEW_LEN).collect()
}
