#![cfg(feature = "reqwest")]

// std
use std::sync::atomic::{AtomicUsize, Ordering};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use powerbi_gateway::{
	_preludet::*,
	auth::{AccessToken, DatasetId, DelegatedGrant, PrincipalId, ProviderId, ResourceId},
	error::{AuthenticationError, Endpoint, UpstreamError},
	flows::{TokenSource, TokenSourceFuture},
	gateway::{Column, Dataset, DatasetGateway, RowBatch, RowEncoding, Table, TableReference},
	http::ReqwestHttpClient,
	provider::ProviderDescriptor,
	store::GrantStore,
};

const API_BASE: &str = "/beta/myorg/";
const BEARER: &str = "access-static";

/// Token source that always returns the same bearer and counts invocations.
#[derive(Default)]
struct StaticTokens {
	calls: AtomicUsize,
}
impl TokenSource for StaticTokens {
	fn access_token<'a>(
		&'a self,
		principal: &'a PrincipalId,
		resource: &'a ResourceId,
	) -> TokenSourceFuture<'a> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			let token = AccessToken::builder(principal.clone(), resource.clone())
				.secret(BEARER)
				.expires_in(Duration::hours(1))
				.build()
				.expect("Static token fixture should build.");

			Ok(token)
		})
	}
}

/// Token source standing in for a broker with no grant for the principal.
struct SignedOutTokens;
impl TokenSource for SignedOutTokens {
	fn access_token<'a>(
		&'a self,
		principal: &'a PrincipalId,
		_resource: &'a ResourceId,
	) -> TokenSourceFuture<'a> {
		Box::pin(async move {
			Err(AuthenticationError::MissingGrant { principal: principal.clone() }.into())
		})
	}
}

fn principal() -> PrincipalId {
	PrincipalId::new("oid-gateway").expect("Principal fixture should be valid.")
}

fn dataset_id(value: &str) -> DatasetId {
	DatasetId::new(value).expect("Dataset identifier fixture should be valid.")
}

fn static_gateway(server: &MockServer) -> (DatasetGateway<StaticTokens>, Arc<StaticTokens>) {
	let tokens = Arc::new(StaticTokens::default());

	(build_test_gateway(tokens.clone(), &server.url(API_BASE)), tokens)
}

fn sales_dataset() -> Dataset {
	Dataset::new(
		"Sales",
		vec![Table::new(
			"Orders",
			vec![Column::new("id", "numeric"), Column::new("amount", "numeric")],
		)],
	)
}

#[tokio::test]
async fn list_datasets_sends_bearer_and_preserves_order() {
	let server = MockServer::start_async().await;
	let (gateway, tokens) = static_gateway(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/beta/myorg/datasets")
				.header("authorization", format!("Bearer {BEARER}"))
				.header("accept", "application/json");
			then.status(200).header("content-type", "application/json").json_body(json!({
				"datasets": [
					{ "id": "ds-2", "name": "Beta" },
					{ "id": "ds-1", "name": "Alpha", "tables": [{ "name": "T", "columns": [] }] },
				],
			}));
		})
		.await;
	let datasets = gateway.list_datasets(&principal()).await.expect("Listing should succeed.");

	mock.assert_async().await;

	let names: Vec<_> = datasets.iter().map(|dataset| dataset.name.as_str()).collect();

	assert_eq!(names, ["Beta", "Alpha"]);
	assert_eq!(datasets[0].id, Some(dataset_id("ds-2")));
	assert_eq!(datasets[1].tables.len(), 1);
	assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_list_reports_the_json_path() {
	let server = MockServer::start_async().await;
	let (gateway, _tokens) = static_gateway(&server);
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/beta/myorg/datasets");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "datasets": [{ "id": "ds-1", "name": 5 }] }));
		})
		.await;
	let err = gateway.list_datasets(&principal()).await.expect_err("Malformed body must fail.");

	match err {
		Error::Upstream(UpstreamError::MalformedBody { source, status }) => {
			assert_eq!(status, 200);
			assert_eq!(source.path().to_string(), "datasets[0].name");
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}
}

#[tokio::test]
async fn get_dataset_maps_not_found_and_upstream_failures() {
	let server = MockServer::start_async().await;
	let (gateway, _tokens) = static_gateway(&server);
	let _missing = server
		.mock_async(|when, then| {
			when.method(GET).path("/beta/myorg/datasets/ds-missing");
			then.status(404)
				.header("content-type", "application/json")
				.json_body(json!({ "error": { "code": "ItemNotFound" } }));
		})
		.await;
	let _broken = server
		.mock_async(|when, then| {
			when.method(GET).path("/beta/myorg/datasets/ds-broken");
			then.status(500).header("retry-after", "3").json_body(json!({
				"error": { "code": "InternalError", "message": "try later" },
			}));
		})
		.await;
	let err = gateway
		.get_dataset(&principal(), &dataset_id("ds-missing"))
		.await
		.expect_err("Unknown datasets must be reported.");

	assert!(matches!(err, Error::NotFound { .. }));

	let err = gateway
		.get_dataset(&principal(), &dataset_id("ds-broken"))
		.await
		.expect_err("Server errors must be reported.");

	match err {
		Error::Upstream(UpstreamError::Status { status, message, retry_after }) => {
			assert_eq!(status, 500);
			assert_eq!(message, "InternalError: try later");
			assert_eq!(retry_after, Some(Duration::seconds(3)));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}
}

#[tokio::test]
async fn create_dataset_never_sends_a_client_id_and_round_trips() {
	let server = MockServer::start_async().await;
	let (gateway, _tokens) = static_gateway(&server);
	let create = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/beta/myorg/datasets")
				.header("content-type", "application/json")
				.json_body(json!({
					"name": "Sales",
					"tables": [{
						"name": "Orders",
						"columns": [
							{ "name": "id", "dataType": "numeric" },
							{ "name": "amount", "dataType": "numeric" },
						],
					}],
				}));
			then.status(201)
				.header("content-type", "application/json")
				.json_body(json!({ "id": "srv-1", "name": "Sales", "defaultRetentionPolicy": "None" }));
		})
		.await;
	let fetch = server
		.mock_async(|when, then| {
			when.method(GET).path("/beta/myorg/datasets/srv-1");
			then.status(200)
				.header("content-type", "application/json")
				.json_body(json!({ "id": "srv-1", "name": "Sales" }));
		})
		.await;
	let mut submitted = sales_dataset();

	submitted.id = Some(dataset_id("client-made"));

	let created = gateway
		.create_dataset(&principal(), submitted)
		.await
		.expect("Dataset creation should succeed.");

	create.assert_async().await;

	assert_eq!(created.id, Some(dataset_id("srv-1")), "Only the server-assigned id is kept.");
	assert_eq!(created.tables, sales_dataset().tables);

	let id = created.id.clone().expect("Created dataset should carry an identifier.");
	let fetched =
		gateway.get_dataset(&principal(), &id).await.expect("Created dataset should be readable.");

	fetch.assert_async().await;

	assert_eq!(fetched.name, created.name);
}

#[tokio::test]
async fn create_dataset_requires_an_assigned_id() {
	let server = MockServer::start_async().await;
	let (gateway, _tokens) = static_gateway(&server);
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/beta/myorg/datasets");
			then.status(201)
				.header("content-type", "application/json")
				.json_body(json!({ "name": "Sales" }));
		})
		.await;
	let err = gateway
		.create_dataset(&principal(), sales_dataset())
		.await
		.expect_err("A response without an id is unusable.");

	assert!(matches!(err, Error::Upstream(UpstreamError::MissingDatasetId)));
}

#[tokio::test]
async fn clear_table_issues_one_delete_and_tolerates_failures() {
	let server = MockServer::start_async().await;
	let (gateway, _tokens) = static_gateway(&server);
	let ok = server
		.mock_async(|when, then| {
			when.method(DELETE)
				.path("/beta/myorg/datasets/ds-1/tables/Orders/rows")
				.header("authorization", format!("Bearer {BEARER}"));
			then.status(200);
		})
		.await;
	let failing = server
		.mock_async(|when, then| {
			when.method(DELETE).path("/beta/myorg/datasets/ds-2/tables/Orders/rows");
			then.status(404).json_body(json!({ "error": { "code": "ItemNotFound" } }));
		})
		.await;

	assert!(
		gateway
			.clear_table(&principal(), &TableReference::new(dataset_id("ds-1"), "Orders"))
			.await
			.expect("Clearing should complete.")
	);
	assert!(
		gateway
			.clear_table(&principal(), &TableReference::new(dataset_id("ds-2"), "Orders"))
			.await
			.expect("Non-success statuses are tolerated.")
	);

	ok.assert_calls_async(1).await;
	failing.assert_calls_async(1).await;
}

#[tokio::test]
async fn add_table_rows_keeps_row_keys_and_types() {
	let server = MockServer::start_async().await;
	let (gateway, _tokens) = static_gateway(&server);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/beta/myorg/datasets/ds-1/tables/Orders/rows")
				.header("content-type", "application/json")
				.json_body(json!({
					"rows": [
						{ "id": 1, "amount": 100.5, "paid": true },
						{ "id": 2, "note": null },
					],
				}));
			then.status(200);
		})
		.await;
	let batch: RowBatch = serde_json::from_value(json!({
		"datasetId": "ds-1",
		"tableName": "Orders",
		"rows": [
			{ "id": 1, "amount": 100.5, "paid": true },
			{ "id": 2, "note": null },
		],
	}))
	.expect("Row batch fixture should parse.");

	assert!(
		gateway.add_table_rows(&principal(), &batch).await.expect("Row upload should complete.")
	);

	mock.assert_async().await;
}

#[tokio::test]
async fn token_failure_prevents_every_api_call() {
	let server = MockServer::start_async().await;
	let gateway = build_test_gateway(Arc::new(SignedOutTokens), &server.url(API_BASE));
	let mock = server
		.mock_async(|when, then| {
			when.path_includes("/beta/myorg/");
			then.status(200).json_body(json!({ "datasets": [] }));
		})
		.await;
	let user = principal();
	let table = TableReference::new(dataset_id("ds-1"), "Orders");
	let batch = RowBatch::new(table.clone(), Vec::new());
	let results = [
		gateway.list_datasets(&user).await.map(|_| ()),
		gateway.get_dataset(&user, &dataset_id("ds-1")).await.map(|_| ()),
		gateway.create_dataset(&user, sales_dataset()).await.map(|_| ()),
		gateway.clear_table(&user, &table).await.map(|_| ()),
		gateway.add_table_rows(&user, &batch).await.map(|_| ()),
	];

	for result in results {
		let err = result.expect_err("Operations must fail without a token.");

		assert!(err.requires_sign_in(), "Unexpected error: {err:?}.");
	}

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn slow_api_calls_time_out() {
	let server = MockServer::start_async().await;
	let http_client = ReqwestHttpClient::with_timeout(std::time::Duration::from_millis(200))
		.expect("Timeout-bounded client should build.");
	let gateway = DatasetGateway::new(
		Arc::new(StaticTokens::default()),
		http_client,
		Url::parse(&server.url(API_BASE)).expect("Mock API base should parse."),
		ResourceId::new(TEST_RESOURCE).expect("Resource fixture should be valid."),
	)
	.expect("Gateway should build.");
	let _mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/beta/myorg/datasets");
			then.status(200)
				.delay(std::time::Duration::from_secs(2))
				.json_body(json!({ "datasets": [] }));
		})
		.await;
	let err = gateway.list_datasets(&principal()).await.expect_err("Slow responses must time out.");

	assert!(matches!(err, Error::Timeout { endpoint: Endpoint::AnalyticsApi }), "{err:?}");
}

#[tokio::test]
async fn unreachable_api_is_a_transport_failure() {
	let gateway =
		build_test_gateway(Arc::new(StaticTokens::default()), "http://127.0.0.1:9/beta/myorg/");
	let err = gateway
		.clear_table(&principal(), &TableReference::new(dataset_id("ds-1"), "Orders"))
		.await
		.expect_err("Connection failures must not report success.");

	assert!(matches!(err, Error::Transport(_) | Error::Timeout { .. }), "{err:?}");

	let batch = RowBatch::new(
		TableReference::new(dataset_id("ds-1"), "Orders"),
		vec![[("id", 1_i64)].into_iter().collect()],
	);
	let err = gateway
		.add_table_rows(&principal(), &batch)
		.await
		.expect_err("Connection failures must not report a successful upload.");

	assert!(matches!(err, Error::Transport(_) | Error::Timeout { .. }), "{err:?}");
}

fn broker_descriptor(server: &MockServer) -> ProviderDescriptor {
	ProviderDescriptor::builder(
		ProviderId::new("mock-end-to-end").expect("Provider identifier should be valid."),
	)
	.authorization_endpoint(
		Url::parse(&server.url("/tenant/oauth2/authorize"))
			.expect("Mock authorize endpoint should parse."),
	)
	.token_endpoint(
		Url::parse(&server.url("/tenant/oauth2/token")).expect("Mock token endpoint should parse."),
	)
	.allow_insecure_endpoints()
	.build()
	.expect("Provider descriptor should build.")
}

async fn end_to_end(encoding: RowEncoding, expected_body: &'static str) {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(broker_descriptor(&server), "client", "secret");
	let user = principal();

	store
		.save(DelegatedGrant::assertion(user.clone(), "user.assertion.jwt"))
		.await
		.expect("Assertion grant should be stored.");

	let token = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/tenant/oauth2/token")
				.form_urlencoded_tuple("assertion", "user.assertion.jwt")
				.form_urlencoded_tuple("resource", TEST_RESOURCE);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"access-e2e\",\"expires_in\":\"3599\"}");
		})
		.await;
	let create = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/beta/myorg/datasets")
				.header("authorization", "Bearer access-e2e");
			then.status(201)
				.header("content-type", "application/json")
				.json_body(json!({ "id": "e2e-1", "name": "Sales" }));
		})
		.await;
	let rows = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/beta/myorg/datasets/e2e-1/tables/Orders/rows")
				.header("authorization", "Bearer access-e2e")
				.body(expected_body);
			then.status(200);
		})
		.await;
	let gateway = build_test_gateway(Arc::new(broker), &server.url(API_BASE))
		.with_row_encoding(encoding);
	let created =
		gateway.create_dataset(&user, sales_dataset()).await.expect("Dataset creation should succeed.");
	let id = created.id.expect("Created dataset should carry the server id.");
	let batch: RowBatch = serde_json::from_value(json!({
		"datasetId": id,
		"tableName": "Orders",
		"rows": [{ "id": 1, "amount": 100 }],
	}))
	.expect("Row batch fixture should parse.");

	assert!(gateway.add_table_rows(&user, &batch).await.expect("Row upload should complete."));

	create.assert_async().await;
	rows.assert_async().await;
	token.assert_calls_async(2).await;
}

#[tokio::test]
async fn end_to_end_legacy_rows_are_stringified() {
	end_to_end(RowEncoding::Stringified, r#"{"rows":[{"id":"1","amount":"100"}]}"#).await;
}

#[tokio::test]
async fn end_to_end_typed_rows_keep_numbers() {
	end_to_end(RowEncoding::Typed, r#"{"rows":[{"id":1,"amount":100}]}"#).await;
}
