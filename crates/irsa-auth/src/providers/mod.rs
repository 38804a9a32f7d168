//! Token verification capability and the registry of trusted issuers.

pub mod registry;

use async_trait::async_trait;
use thiserror::Error;

use crate::jwt::{JwtError, RegisteredClaims};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Discovery failed for {issuer}: {reason}")]
    Discovery { issuer: String, reason: String },
    #[error("Issuer mismatch: configured {configured}, discovery document reports {discovered}")]
    IssuerMismatch {
        configured: String,
        discovered: String,
    },
    #[error("Invalid key set from {uri}: {reason}")]
    Jwks { uri: String, reason: String },
}

/// Verifies a compact token on behalf of one issuer.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Check signature and policy, returning the token's registered claims.
    async fn verify(&self, token: &str) -> Result<RegisteredClaims, JwtError>;

    /// Issuer name used when reporting rejections.
    fn issuer(&self) -> &str;
}
