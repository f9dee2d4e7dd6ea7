//! Delegated Power BI dataset gateway.
//!
//! The [`flows::Broker`] signs users in against Azure AD and exchanges each principal's stored
//! grant for Power BI access tokens; the [`gateway`] module wraps the dataset, table, and row
//! endpoints on top of any [`flows::TokenSource`]. The `server` feature adds an axum surface
//! and the `powerbi-gateway` binary.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod gateway;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
#[cfg(feature = "server")] pub mod server;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::ResourceId,
		flows::{Broker, TokenSource},
		gateway::DatasetGateway,
		http::ReqwestHttpClient,
		oauth::ReqwestTransportErrorMapper,
		provider::{AzureAdStrategy, ProviderDescriptor, ProviderStrategy},
		store::{GrantStore, MemoryStore},
	};

	/// Broker type alias used by reqwest-backed integration tests.
	pub type ReqwestTestBroker = Broker<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Resource identifier used by tests that exercise the gateway.
	pub const TEST_RESOURCE: &str = "https://analysis.windows.net/powerbi/api";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.timeout(std::time::Duration::from_secs(5))
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Constructs a [`Broker`] backed by an in-memory grant store, the Azure AD strategy, and the
	/// reqwest transport used across integration tests.
	pub fn build_reqwest_test_broker(
		descriptor: ProviderDescriptor,
		client_id: &str,
		client_secret: &str,
	) -> (ReqwestTestBroker, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn GrantStore> = store_backend.clone();
		let strategy: Arc<dyn ProviderStrategy> = Arc::new(AzureAdStrategy);
		let http_client = test_reqwest_http_client();
		let mapper = Arc::new(ReqwestTransportErrorMapper);
		let broker =
			Broker::with_http_client(store, descriptor, strategy, client_id, http_client, mapper)
				.with_client_secret(client_secret);

		(broker, store_backend)
	}

	/// Constructs a [`DatasetGateway`] that talks to `base_url` with the insecure test transport.
	pub fn build_test_gateway<T>(tokens: Arc<T>, base_url: &str) -> DatasetGateway<T>
	where
		T: ?Sized + TokenSource,
	{
		let base_url = Url::parse(base_url).expect("Failed to parse test API base URL.");
		let resource =
			ResourceId::new(TEST_RESOURCE).expect("Failed to build test resource identifier.");

		DatasetGateway::new(tokens, test_reqwest_http_client(), base_url, resource)
			.expect("Failed to build test dataset gateway.")
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, hash_map::DefaultHasher},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		hash::{Hash, Hasher},
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
#[cfg(feature = "server")] use {color_eyre as _, tracing_subscriber as _};
