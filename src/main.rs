//! Dataset gateway server binary.

// crates.io
use color_eyre::eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
// self
use powerbi_gateway::{
	config::GatewayConfig,
	server::{self, AppState},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let config = GatewayConfig::from_env().wrap_err("failed to resolve gateway configuration")?;
	let state = AppState::from_config(&config).wrap_err("failed to build gateway components")?;
	let listener = TcpListener::bind(config.bind_address)
		.await
		.wrap_err_with(|| format!("failed to bind {}", config.bind_address))?;

	server::serve(listener, state, async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			tracing::warn!(error = %e, "failed to listen for shutdown signal");
		}
	})
	.await?;

	Ok(())
}
