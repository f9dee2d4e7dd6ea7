//! Provider descriptor data structures and helpers shared by all flows.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Grant helpers wired into provider descriptors.
pub mod grant;

pub use builder::*;
pub use grant::*;

// self
use crate::{
	_prelude::*,
	auth::{ProviderId, TenantId},
};

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
}

/// Endpoint set declared by a provider descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
	/// Authorization endpoint used by the interactive sign-in.
	pub authorization: Url,
	/// Token endpoint used for code redemption, refreshes, and on-behalf-of exchanges.
	pub token: Url,
}

/// Immutable provider descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Descriptor identifier.
	pub id: ProviderId,
	/// Endpoint definitions exposed by the provider.
	pub endpoints: ProviderEndpoints,
	/// Preferred client authentication mechanism.
	pub preferred_client_auth_method: ClientAuthMethod,
}
impl ProviderDescriptor {
	/// Creates a new builder for the provided identifier.
	pub fn builder(id: ProviderId) -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new(id)
	}

	/// Builds the descriptor for an Azure AD tenant under `authority`
	/// (for example `https://login.windows.net/`).
	///
	/// Endpoints resolve to `{authority}/{tenant}/oauth2/authorize` and
	/// `{authority}/{tenant}/oauth2/token`.
	pub fn azure_ad(authority: &Url, tenant: &TenantId) -> Result<Self, ProviderDescriptorError> {
		let endpoint = |leaf: &str| {
			let mut url = authority.clone();

			url.path_segments_mut()
				.map_err(|_| ProviderDescriptorError::InvalidAuthority {
					url: authority.to_string(),
				})?
				.pop_if_empty()
				.extend([tenant.as_str(), "oauth2", leaf]);

			Ok::<_, ProviderDescriptorError>(url)
		};
		let id = ProviderId::new(format!("azure-ad:{tenant}")).map_err(|_| {
			ProviderDescriptorError::InvalidAuthority { url: authority.to_string() }
		})?;

		Self::builder(id)
			.authorization_endpoint(endpoint("authorize")?)
			.token_endpoint(endpoint("token")?)
			.preferred_client_auth_method(ClientAuthMethod::ClientSecretPost)
			.build()
	}
}
