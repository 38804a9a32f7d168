//! Registry of trusted issuers and first-match token selection.

use irsa_core::ProviderConfig;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use super::{ProviderError, TokenVerifier};
use crate::jwt::RegisteredClaims;
use crate::oidc::{self, OidcVerifier};

/// One issuer's reason for rejecting a token.
#[derive(Debug, Clone)]
pub struct ProviderRejection {
    pub issuer: String,
    pub reason: String,
}

impl fmt::Display for ProviderRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.issuer, self.reason)
    }
}

/// Every registered provider rejected the token.
#[derive(Debug, Error)]
#[error("token rejected by all {} providers: [{}]", .rejections.len(), join(.rejections))]
pub struct VerificationError {
    pub rejections: Vec<ProviderRejection>,
}

fn join(rejections: &[ProviderRejection]) -> String {
    rejections
        .iter()
        .map(ProviderRejection::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

struct RegisteredProvider {
    verifier: Arc<dyn TokenVerifier>,
    config: ProviderConfig,
}

/// Ordered (verifier, policy) pairs, built once at startup and read-only afterwards.
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
}

impl ProviderRegistry {
    /// Build a registry from already constructed verifiers, keeping their order.
    pub fn new(providers: Vec<(Arc<dyn TokenVerifier>, ProviderConfig)>) -> Self {
        Self {
            providers: providers
                .into_iter()
                .map(|(verifier, config)| RegisteredProvider { verifier, config })
                .collect(),
        }
    }

    /// Discover every configured issuer and bind a verifier to each.
    ///
    /// Any discovery or key set failure aborts the whole build.
    pub async fn discover(
        http: &reqwest::Client,
        configs: &[ProviderConfig],
    ) -> Result<Self, ProviderError> {
        let mut providers: Vec<(Arc<dyn TokenVerifier>, ProviderConfig)> =
            Vec::with_capacity(configs.len());

        for config in configs {
            if is_insecure(&config.issuer_url) {
                warn!(
                    issuer = %config.issuer_url,
                    "Issuer URL is not HTTPS, allowing insecure discovery for this issuer"
                );
            }

            let document = oidc::discover(http, &config.issuer_url).await?;
            check_discovered_issuer(config, &document.issuer)?;

            let jwks = oidc::fetch_jwks(http, &document.jwks_uri).await?;
            let verifier = OidcVerifier::new(&document, &jwks, config)?;

            if config.expected_audiences().is_empty() {
                warn!(
                    issuer = %config.issuer_url,
                    "No clientID or audience configured, audience check disabled"
                );
            }

            info!(
                issuer = %config.issuer_url,
                keys = verifier.key_count(),
                cluster = %config.cluster_name,
                rewrite_subject = config.rewrite_subject,
                "Registered OIDC provider"
            );
            providers.push((Arc::new(verifier), config.clone()));
        }

        Ok(Self::new(providers))
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers in selection order.
    pub fn iter(&self) -> impl Iterator<Item = (&dyn TokenVerifier, &ProviderConfig)> {
        self.providers
            .iter()
            .map(|p| (p.verifier.as_ref(), &p.config))
    }

    /// Try the token against each provider in order; the first acceptance wins.
    pub async fn select(
        &self,
        token: &str,
    ) -> Result<(RegisteredClaims, &ProviderConfig), VerificationError> {
        let mut rejections = Vec::with_capacity(self.providers.len());

        for provider in &self.providers {
            match provider.verifier.verify(token).await {
                Ok(claims) => return Ok((claims, &provider.config)),
                Err(e) => rejections.push(ProviderRejection {
                    issuer: provider.verifier.issuer().to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        Err(VerificationError { rejections })
    }
}

fn is_insecure(issuer_url: &str) -> bool {
    Url::parse(issuer_url)
        .map(|url| url.scheme() != "https")
        .unwrap_or(true)
}

/// A discovery document naming another issuer is fatal for HTTPS issuers
/// and only logged for insecure ones.
fn check_discovered_issuer(config: &ProviderConfig, discovered: &str) -> Result<(), ProviderError> {
    if oidc::issuer_matches(discovered, &config.issuer_url) {
        return Ok(());
    }
    if !is_insecure(&config.issuer_url) {
        return Err(ProviderError::IssuerMismatch {
            configured: config.issuer_url.clone(),
            discovered: discovered.to_string(),
        });
    }
    warn!(
        configured = %config.issuer_url,
        discovered = %discovered,
        "Discovery document names a different issuer"
    );
    Ok(())
}
