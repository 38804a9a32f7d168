//! Startup composition: configuration to a ready [`AppState`].
//!
//! Every step is fatal. A proxy that cannot discover one of its issuers or
//! load its signing key never binds a listener.

use irsa_auth::{JwtError, JwtSigner, ProviderError, ProviderRegistry, SigningIdentity};
use irsa_core::ProxyConfig;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::rewrite::RequestRewriter;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] irsa_core::Error),

    #[error("Failed to load signing key: {0}")]
    SigningKey(#[from] JwtError),

    #[error("Failed to register OIDC provider: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Discover every configured issuer with a client bounded by the discovery timeout.
pub async fn build_registry(config: &ProxyConfig) -> Result<ProviderRegistry, StartupError> {
    let http = reqwest::Client::builder()
        .timeout(config.discovery_timeout())
        .build()?;
    let registry = ProviderRegistry::discover(&http, &config.oidc_providers).await?;
    Ok(registry)
}

/// Load the signing key, build the registry and wire the transport.
pub async fn build_state(config: &ProxyConfig) -> Result<AppState, StartupError> {
    let sts_endpoint = config.sts_endpoint_url()?;

    let identity = SigningIdentity::load(&config.signing_key)?;
    info!(
        algorithm = ?identity.algorithm(),
        key_id = identity.key_id().unwrap_or("-"),
        "Loaded signing key"
    );

    let registry = build_registry(config).await?;
    info!(providers = registry.len(), "Provider registry ready");

    let rewriter = RequestRewriter::new(
        Arc::new(registry),
        Arc::new(JwtSigner::new(identity)),
        sts_endpoint,
    );
    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout())
        .build()?;

    Ok(AppState::new(Arc::new(rewriter), http, config.max_body_bytes))
}
