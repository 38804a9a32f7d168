//! Test issuers with throwaway P-256 keys.
//!
//! Available to other crates through the `test-util` feature.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use irsa_core::ProviderConfig;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use serde::Serialize;
use serde_json::{Value, json};

use crate::jwt::{Audience, RegisteredClaims};
use crate::keys::SigningIdentity;
use crate::oidc::{OidcDiscoveryDocument, OidcVerifier};

/// An OIDC issuer that signs tokens with ES256.
pub struct TestIssuer {
    pub issuer: String,
    pub kid: String,
    secret: p256::SecretKey,
}

impl TestIssuer {
    pub fn new(issuer: &str, kid: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            kid: kid.to_string(),
            secret: p256::SecretKey::random(&mut rand::thread_rng()),
        }
    }

    pub fn secret(&self) -> &p256::SecretKey {
        &self.secret
    }

    fn coordinates(&self) -> (String, String) {
        let point = self.secret.public_key().to_encoded_point(false);
        let x = point.x().expect("uncompressed point has x");
        let y = point.y().expect("uncompressed point has y");
        (URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y))
    }

    /// Public key set as served from the issuer's `jwks_uri`.
    pub fn jwks(&self) -> Value {
        let (x, y) = self.coordinates();
        json!({
            "keys": [{
                "kty": "EC",
                "crv": "P-256",
                "use": "sig",
                "alg": "ES256",
                "kid": self.kid,
                "x": x,
                "y": y,
            }]
        })
    }

    pub fn jwk_set(&self) -> JwkSet {
        serde_json::from_value(self.jwks()).expect("valid JWKS")
    }

    /// Private JWK, usable as the proxy's signing key.
    pub fn private_jwk(&self) -> String {
        let (x, y) = self.coordinates();
        json!({
            "kty": "EC",
            "crv": "P-256",
            "alg": "ES256",
            "kid": self.kid,
            "x": x,
            "y": y,
            "d": URL_SAFE_NO_PAD.encode(self.secret.to_bytes()),
        })
        .to_string()
    }

    pub fn signing_identity(&self) -> SigningIdentity {
        SigningIdentity::from_jwk(&self.private_jwk(), None, None).expect("valid private JWK")
    }

    pub fn discovery_document(&self, jwks_uri: &str) -> OidcDiscoveryDocument {
        self.discovery_document_for(&self.issuer, jwks_uri)
    }

    /// Discovery document that advertises `issuer` instead of this issuer's own name.
    pub fn discovery_document_for(&self, issuer: &str, jwks_uri: &str) -> OidcDiscoveryDocument {
        let mut document = OidcDiscoveryDocument::new(issuer, jwks_uri);
        document.id_token_signing_alg_values_supported = vec!["ES256".to_string()];
        document
    }

    /// Verifier bound to this issuer without any network round trip.
    pub fn verifier(&self, config: &ProviderConfig) -> OidcVerifier {
        let document = self.discovery_document(&format!("{}/keys", self.issuer));
        OidcVerifier::new(&document, &self.jwk_set(), config).expect("verifier")
    }

    /// Sign arbitrary claims with this issuer's key.
    pub fn mint<T: Serialize>(&self, claims: &T) -> String {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.kid.clone());
        self.sign(&header, claims)
    }

    /// Sign with a header that carries no `kid`.
    pub fn mint_without_kid<T: Serialize>(&self, claims: &T) -> String {
        self.sign(&Header::new(Algorithm::ES256), claims)
    }

    fn sign<T: Serialize>(&self, header: &Header, claims: &T) -> String {
        let der = self.secret.to_pkcs8_der().expect("pkcs8");
        encode(header, claims, &EncodingKey::from_ec_der(der.as_bytes())).expect("sign")
    }
}

/// Claims valid for the next ten minutes.
pub fn claims(issuer: &str, subject: &str, audience: &str) -> RegisteredClaims {
    let now = get_current_timestamp() as i64;
    RegisteredClaims {
        iss: Some(issuer.to_string()),
        sub: Some(subject.to_string()),
        aud: Some(Audience::Single(audience.to_string())),
        exp: Some(now + 600),
        nbf: Some(now - 5),
        iat: Some(now),
        jti: None,
    }
}

fn decode_segment(token: &str, index: usize) -> Value {
    let segment = token.split('.').nth(index).expect("token segment");
    let bytes = URL_SAFE_NO_PAD.decode(segment).expect("base64url segment");
    serde_json::from_slice(&bytes).expect("JSON segment")
}

/// Decode a token's header without verifying it.
pub fn decode_header_json(token: &str) -> Value {
    decode_segment(token, 0)
}

/// Decode a token's payload without verifying it.
pub fn decode_payload(token: &str) -> Value {
    decode_segment(token, 1)
}
