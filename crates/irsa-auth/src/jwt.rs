//! Registered JWT claims and re-signing.

use jsonwebtoken::{Algorithm, Header, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::SigningIdentity;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT error: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Key has no private component and cannot sign")]
    PublicKeyOnly,
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("No key with id {0:?} in the issuer's key set")]
    UnknownKeyId(String),
    #[error("Algorithm {0:?} is not allowed by the issuer")]
    DisallowedAlgorithm(Algorithm),
    #[error("Key set contains no usable keys")]
    EmptyKeySet,
}

/// The `aud` claim, which may be a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == audience,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == audience),
        }
    }
}

/// Registered claims carried over from a verified token.
///
/// Only `sub` is ever changed between the inbound and outbound token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClaims {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

impl RegisteredClaims {
    pub fn subject(&self) -> &str {
        self.sub.as_deref().unwrap_or_default()
    }

    pub fn issuer(&self) -> &str {
        self.iss.as_deref().unwrap_or_default()
    }
}

/// Produces compact signed tokens from claims.
pub trait ClaimsSigner: Send + Sync {
    /// Serialize and sign `claims`, returning `header.payload.signature`.
    fn sign(&self, claims: &RegisteredClaims) -> Result<String, JwtError>;

    /// The `kid` placed in signed headers, if any.
    fn key_id(&self) -> Option<&str> {
        None
    }
}

/// Signs claims with the proxy's signing identity.
pub struct JwtSigner {
    identity: SigningIdentity,
}

impl JwtSigner {
    pub fn new(identity: SigningIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }
}

impl ClaimsSigner for JwtSigner {
    fn sign(&self, claims: &RegisteredClaims) -> Result<String, JwtError> {
        let mut header = Header::new(self.identity.algorithm());
        header.kid = self.identity.key_id().map(str::to_string);

        let token = encode(&header, claims, self.identity.encoding_key())?;
        Ok(token)
    }

    fn key_id(&self) -> Option<&str> {
        self.identity.key_id()
    }
}
