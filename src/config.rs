//! Process configuration resolved once at startup.
//!
//! [`GatewayConfig::from_env`] reads `POWERBI_*` environment variables; embedders can also
//! deserialize the struct from any serde format and call [`GatewayConfig::validate`].

// std
use std::{net::SocketAddr, path::PathBuf};
// self
use crate::{
	_prelude::*,
	auth::{ResourceId, TenantId, TokenSecret},
	error::ConfigError,
	gateway::RowEncoding,
};

/// Resource identifier of the Power BI REST API.
pub const POWER_BI_RESOURCE: &str = "https://analysis.windows.net/powerbi/api";
/// Resource identifier requested when redeeming the sign-in code.
pub const AZURE_AD_GRAPH_RESOURCE: &str = "https://graph.windows.net";
/// Azure AD authority hosting the v1 endpoints.
pub const DEFAULT_AUTHORITY: &str = "https://login.windows.net/";
/// Base URL of the Power BI dataset API.
pub const DEFAULT_API_BASE: &str = "https://api.powerbi.com/beta/myorg/";

const ENV_CLIENT_ID: &str = "POWERBI_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "POWERBI_CLIENT_SECRET";
const ENV_TENANT_ID: &str = "POWERBI_TENANT_ID";
const ENV_AUTHORITY: &str = "POWERBI_AUTHORITY";
const ENV_RESOURCE: &str = "POWERBI_RESOURCE";
const ENV_SIGN_IN_RESOURCE: &str = "POWERBI_SIGN_IN_RESOURCE";
const ENV_API_BASE_URL: &str = "POWERBI_API_BASE_URL";
const ENV_REQUEST_TIMEOUT_SECS: &str = "POWERBI_REQUEST_TIMEOUT_SECS";
const ENV_BIND_ADDRESS: &str = "POWERBI_BIND_ADDRESS";
const ENV_ROW_ENCODING: &str = "POWERBI_ROW_ENCODING";
const ENV_TOKEN_CACHE: &str = "POWERBI_TOKEN_CACHE";
const ENV_GRANT_STORE: &str = "POWERBI_GRANT_STORE";
const ENV_PRINCIPAL_HEADER: &str = "POWERBI_PRINCIPAL_HEADER";

/// Validated gateway settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
	/// Azure AD application (client) identifier.
	pub client_id: String,
	/// Azure AD application secret.
	pub client_secret: TokenSecret,
	/// Azure AD tenant (directory) identifier.
	pub tenant_id: TenantId,
	/// Authority hosting `{tenant}/oauth2/authorize` and `{tenant}/oauth2/token`.
	#[serde(default = "default_authority")]
	pub authority: Url,
	/// Resource delegated tokens are requested for.
	#[serde(default = "default_resource")]
	pub resource: ResourceId,
	/// Resource requested while redeeming the sign-in code; `None` omits the parameter.
	#[serde(default = "default_sign_in_resource")]
	pub sign_in_resource: Option<ResourceId>,
	/// Base URL of the dataset API; must end with `/` semantics (it is treated as a directory).
	#[serde(default = "default_api_base_url")]
	pub api_base_url: Url,
	/// Timeout applied to every outbound request, in seconds.
	#[serde(default = "default_request_timeout_secs")]
	pub request_timeout_secs: u64,
	/// Address the bundled HTTP server binds to.
	#[serde(default = "default_bind_address")]
	pub bind_address: SocketAddr,
	/// Row value encoding used by `AddTableRows`.
	#[serde(default)]
	pub row_encoding: RowEncoding,
	/// Enables the short-lived access-token cache.
	#[serde(default)]
	pub token_cache: bool,
	/// JSON file persisting grants across restarts; in-memory when absent.
	#[serde(default)]
	pub grant_store_path: Option<PathBuf>,
	/// Header carrying the authenticated principal, set by the fronting session layer.
	#[serde(default = "default_principal_header")]
	pub principal_header: String,
}
impl GatewayConfig {
	/// Builds a config with defaults for everything except the three required settings.
	pub fn new(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
		tenant_id: TenantId,
	) -> Result<Self> {
		let config = Self {
			client_id: client_id.into(),
			client_secret: TokenSecret::new(client_secret),
			tenant_id,
			authority: default_authority(),
			resource: default_resource(),
			sign_in_resource: default_sign_in_resource(),
			api_base_url: default_api_base_url(),
			request_timeout_secs: default_request_timeout_secs(),
			bind_address: default_bind_address(),
			row_encoding: RowEncoding::default(),
			token_cache: false,
			grant_store_path: None,
			principal_header: default_principal_header(),
		};

		config.validate()?;

		Ok(config)
	}

	/// Resolves the configuration from process environment variables.
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Resolves the configuration through `lookup`, which maps a variable name to its value.
	///
	/// Empty values count as absent.
	pub fn from_lookup<F>(lookup: F) -> Result<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |key: &'static str| lookup(key).filter(|value| !value.trim().is_empty());
		let require = |key: &'static str| get(key).ok_or(ConfigError::MissingSetting { key });
		let tenant_id = TenantId::new(require(ENV_TENANT_ID)?.trim())
			.map_err(|e| invalid(ENV_TENANT_ID, e))?;
		let mut config =
			Self::new(require(ENV_CLIENT_ID)?.trim(), require(ENV_CLIENT_SECRET)?, tenant_id)?;

		if let Some(value) = get(ENV_AUTHORITY) {
			config.authority = parse_url(ENV_AUTHORITY, &value)?;
		}
		if let Some(value) = get(ENV_RESOURCE) {
			config.resource = ResourceId::new(value.trim()).map_err(|e| invalid(ENV_RESOURCE, e))?;
		}
		if let Some(value) = get(ENV_SIGN_IN_RESOURCE) {
			config.sign_in_resource = if value.trim().eq_ignore_ascii_case("none") {
				None
			} else {
				Some(ResourceId::new(value.trim()).map_err(|e| invalid(ENV_SIGN_IN_RESOURCE, e))?)
			};
		}
		if let Some(value) = get(ENV_API_BASE_URL) {
			config.api_base_url = parse_url(ENV_API_BASE_URL, &value)?;
		}
		if let Some(value) = get(ENV_REQUEST_TIMEOUT_SECS) {
			config.request_timeout_secs =
				value.trim().parse().map_err(|e| invalid(ENV_REQUEST_TIMEOUT_SECS, e))?;
		}
		if let Some(value) = get(ENV_BIND_ADDRESS) {
			config.bind_address = value.trim().parse().map_err(|e| invalid(ENV_BIND_ADDRESS, e))?;
		}
		if let Some(value) = get(ENV_ROW_ENCODING) {
			config.row_encoding = value.trim().parse().map_err(|e| invalid(ENV_ROW_ENCODING, e))?;
		}
		if let Some(value) = get(ENV_TOKEN_CACHE) {
			config.token_cache = parse_flag(ENV_TOKEN_CACHE, &value)?;
		}
		if let Some(value) = get(ENV_GRANT_STORE) {
			config.grant_store_path = Some(PathBuf::from(value.trim()));
		}
		if let Some(value) = get(ENV_PRINCIPAL_HEADER) {
			config.principal_header = value.trim().to_ascii_lowercase();
		}

		config.validate()?;

		Ok(config)
	}

	/// Checks cross-field invariants; called by every constructor.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.client_id.trim().is_empty() {
			return Err(ConfigError::MissingSetting { key: ENV_CLIENT_ID });
		}
		if self.client_secret.is_empty() {
			return Err(ConfigError::MissingSetting { key: ENV_CLIENT_SECRET });
		}
		if self.authority.scheme() != "https" {
			return Err(ConfigError::InvalidSetting {
				key: ENV_AUTHORITY,
				reason: "authority must use https".into(),
			});
		}
		if self.api_base_url.cannot_be_a_base()
			|| !matches!(self.api_base_url.scheme(), "http" | "https")
		{
			return Err(ConfigError::InvalidApiBase { url: self.api_base_url.to_string() });
		}
		if self.request_timeout_secs == 0 {
			return Err(ConfigError::InvalidSetting {
				key: ENV_REQUEST_TIMEOUT_SECS,
				reason: "timeout must be at least one second".into(),
			});
		}
		if self.principal_header.is_empty()
			|| !self.principal_header.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
		{
			return Err(ConfigError::InvalidSetting {
				key: ENV_PRINCIPAL_HEADER,
				reason: format!("`{}` is not a valid header name", self.principal_header),
			});
		}

		Ok(())
	}

	/// Request timeout as a standard duration.
	pub fn request_timeout(&self) -> std::time::Duration {
		std::time::Duration::from_secs(self.request_timeout_secs)
	}
}

fn invalid(key: &'static str, reason: impl Display) -> ConfigError {
	ConfigError::InvalidSetting { key, reason: reason.to_string() }
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
	Url::parse(value.trim()).map_err(|e| invalid(key, e))
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		other => Err(invalid(key, format!("`{other}` is not a boolean"))),
	}
}

fn default_authority() -> Url {
	Url::parse(DEFAULT_AUTHORITY).unwrap_or_else(|_| unreachable!("authority constant parses"))
}

fn default_api_base_url() -> Url {
	Url::parse(DEFAULT_API_BASE).unwrap_or_else(|_| unreachable!("API base constant parses"))
}

fn default_resource() -> ResourceId {
	ResourceId::new(POWER_BI_RESOURCE)
		.unwrap_or_else(|_| unreachable!("resource constant is valid"))
}

fn default_sign_in_resource() -> Option<ResourceId> {
	ResourceId::new(AZURE_AD_GRAPH_RESOURCE).ok()
}

fn default_request_timeout_secs() -> u64 {
	30
}

fn default_bind_address() -> SocketAddr {
	SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_principal_header() -> String {
	"x-principal-id".into()
}
