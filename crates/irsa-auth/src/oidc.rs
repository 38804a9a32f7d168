//! OIDC discovery and per-issuer token verification.

use async_trait::async_trait;
use irsa_core::ProviderConfig;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use crate::jwt::{JwtError, RegisteredClaims};
use crate::providers::{ProviderError, TokenVerifier};

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// OIDC discovery document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcDiscoveryDocument {
    pub issuer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
    pub jwks_uri: String,
    #[serde(default)]
    pub response_types_supported: Vec<String>,
    #[serde(default)]
    pub subject_types_supported: Vec<String>,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
    #[serde(default)]
    pub claims_supported: Vec<String>,
}

impl OidcDiscoveryDocument {
    /// Minimal document as published by a Kubernetes service account issuer.
    pub fn new(issuer: &str, jwks_uri: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: None,
            token_endpoint: None,
            jwks_uri: jwks_uri.to_string(),
            response_types_supported: vec!["id_token".to_string()],
            subject_types_supported: vec!["public".to_string()],
            id_token_signing_alg_values_supported: vec!["RS256".to_string()],
            claims_supported: Vec::new(),
        }
    }

    /// Algorithms tokens from this issuer may be signed with. Defaults to RS256.
    pub fn signing_algorithms(&self) -> Vec<Algorithm> {
        let algorithms: Vec<Algorithm> = self
            .id_token_signing_alg_values_supported
            .iter()
            .filter_map(|alg| Algorithm::from_str(alg).ok())
            .filter(|alg| !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
            .collect();

        if algorithms.is_empty() {
            vec![Algorithm::RS256]
        } else {
            algorithms
        }
    }
}

/// Discovery URL for an issuer.
pub fn discovery_url(issuer_url: &str) -> String {
    format!("{}{}", issuer_url.trim_end_matches('/'), DISCOVERY_PATH)
}

/// Whether the discovery document's issuer names the configured issuer.
pub fn issuer_matches(discovered: &str, configured: &str) -> bool {
    discovered.trim_end_matches('/') == configured.trim_end_matches('/')
}

/// Fetch and parse an issuer's discovery document.
pub async fn discover(
    http: &reqwest::Client,
    issuer_url: &str,
) -> Result<OidcDiscoveryDocument, ProviderError> {
    let url = discovery_url(issuer_url);
    debug!(url = %url, "Fetching OIDC discovery document");

    let response = http.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(ProviderError::Discovery {
            issuer: issuer_url.to_string(),
            reason: format!("{} returned {}", url, response.status()),
        });
    }

    response.json().await.map_err(|e| ProviderError::Discovery {
        issuer: issuer_url.to_string(),
        reason: format!("malformed discovery document: {}", e),
    })
}

/// Fetch and parse an issuer's JSON Web Key Set.
pub async fn fetch_jwks(http: &reqwest::Client, jwks_uri: &str) -> Result<JwkSet, ProviderError> {
    debug!(url = %jwks_uri, "Fetching JWKS");

    let response = http.get(jwks_uri).send().await?;
    if !response.status().is_success() {
        return Err(ProviderError::Jwks {
            uri: jwks_uri.to_string(),
            reason: format!("returned {}", response.status()),
        });
    }

    response.json().await.map_err(|e| ProviderError::Jwks {
        uri: jwks_uri.to_string(),
        reason: e.to_string(),
    })
}

struct VerificationKey {
    kid: Option<String>,
    key: DecodingKey,
}

/// Verifies tokens against one issuer's key set and policy.
pub struct OidcVerifier {
    issuer: String,
    keys: Vec<VerificationKey>,
    algorithms: Vec<Algorithm>,
    expected_issuer: Option<String>,
    audiences: Vec<String>,
}

impl OidcVerifier {
    /// Bind a verifier to a discovered issuer, its key set and the provider policy.
    pub fn new(
        document: &OidcDiscoveryDocument,
        jwks: &JwkSet,
        config: &ProviderConfig,
    ) -> Result<Self, ProviderError> {
        let keys: Vec<VerificationKey> = jwks
            .keys
            .iter()
            .filter_map(|jwk| match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some(VerificationKey {
                    kid: jwk.common.key_id.clone(),
                    key,
                }),
                Err(e) => {
                    debug!(issuer = %document.issuer, kid = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
                    None
                }
            })
            .collect();

        if keys.is_empty() {
            return Err(ProviderError::Jwks {
                uri: document.jwks_uri.clone(),
                reason: JwtError::EmptyKeySet.to_string(),
            });
        }

        Ok(Self {
            issuer: document.issuer.clone(),
            keys,
            algorithms: document.signing_algorithms(),
            expected_issuer: (!config.skip_issuer_check).then(|| document.issuer.clone()),
            audiences: config
                .expected_audiences()
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.validate_nbf = true;

        if let Some(issuer) = &self.expected_issuer {
            validation.set_issuer(&[issuer]);
        }

        if self.audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&self.audiences);
        }

        validation
    }

    fn verify_token(&self, token: &str) -> Result<RegisteredClaims, JwtError> {
        let header = decode_header(token)?;
        if !self.algorithms.contains(&header.alg) {
            return Err(JwtError::DisallowedAlgorithm(header.alg));
        }

        let candidates: Vec<&VerificationKey> = match &header.kid {
            Some(kid) => {
                let matching: Vec<_> = self
                    .keys
                    .iter()
                    .filter(|key| key.kid.as_deref() == Some(kid.as_str()))
                    .collect();
                if matching.is_empty() {
                    return Err(JwtError::UnknownKeyId(kid.clone()));
                }
                matching
            }
            None => self.keys.iter().collect(),
        };

        let validation = self.validation(header.alg);
        let mut last_error = None;
        for candidate in candidates {
            match decode::<RegisteredClaims>(token, &candidate.key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.map(JwtError::from).unwrap_or(JwtError::EmptyKeySet))
    }
}

#[async_trait]
impl TokenVerifier for OidcVerifier {
    async fn verify(&self, token: &str) -> Result<RegisteredClaims, JwtError> {
        self.verify_token(token)
    }

    fn issuer(&self) -> &str {
        &self.issuer
    }
}
