//! Mock issuers, a mock STS and proxy configurations wired to them.

use irsa_auth::testing::{TestIssuer, claims};
use irsa_core::{ProviderConfig, ProxyConfig, SigningKeyConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const STS_AUDIENCE: &str = "sts.amazonaws.com";
pub const STS_SUCCESS_BODY: &str = "<AssumeRoleWithWebIdentityResponse xmlns=\"https://sts.amazonaws.com/doc/2011-06-15/\"/>";

/// An OIDC issuer served over plain HTTP by wiremock.
pub struct MockIssuer {
    pub server: MockServer,
    pub keys: TestIssuer,
}

impl MockIssuer {
    /// Serve discovery and JWKS for a fresh key with id `kid`.
    pub async fn start(kid: &str) -> Self {
        let server = MockServer::start().await;
        let keys = TestIssuer::new(&server.uri(), kid);
        let jwks_uri = format!("{}/keys", server.uri());

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(keys.discovery_document(&jwks_uri)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/keys"))
            .respond_with(ResponseTemplate::new(200).set_body_json(keys.jwks()))
            .mount(&server)
            .await;

        Self { server, keys }
    }

    pub fn issuer_url(&self) -> String {
        self.server.uri()
    }

    /// Provider entry accepting this issuer's tokens for the STS audience.
    pub fn provider(&self) -> ProviderConfig {
        ProviderConfig::new(self.issuer_url()).with_client_id(STS_AUDIENCE)
    }

    /// A valid token for `subject`.
    pub fn token(&self, subject: &str) -> String {
        self.keys.mint(&claims(&self.issuer_url(), subject, STS_AUDIENCE))
    }
}

/// An STS endpoint that answers every POST with a fixed success body.
pub struct MockSts {
    pub server: MockServer,
}

impl MockSts {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/xml")
                    .set_body_string(STS_SUCCESS_BODY),
            )
            .mount(&server)
            .await;
        Self { server }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Raw bodies of every request STS received, in arrival order.
    pub async fn received_bodies(&self) -> Vec<Vec<u8>> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|request| request.body)
            .collect()
    }

    /// Decoded form fields of every request STS received.
    pub async fn received_forms(&self) -> Vec<Vec<(String, String)>> {
        self.received_bodies()
            .await
            .iter()
            .map(|body| serde_urlencoded::from_bytes(body).unwrap_or_default())
            .collect()
    }
}

/// The proxy's private signing key written to a temporary JWK file.
pub struct SigningKeyFile {
    _dir: TempDir,
    pub path: PathBuf,
    pub keys: TestIssuer,
}

impl SigningKeyFile {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("temp dir");
        let keys = TestIssuer::new("https://proxy.example.com", "proxy-key");
        let path = dir.path().join("private.jwk");
        std::fs::write(&path, keys.private_jwk()).expect("write JWK");
        Self {
            _dir: dir,
            path,
            keys,
        }
    }
}

impl Default for SigningKeyFile {
    fn default() -> Self {
        Self::new()
    }
}

/// A configuration that listens on an ephemeral port and forwards to `sts_endpoint`.
pub fn proxy_config(sts_endpoint: &str, key: &SigningKeyFile, providers: Vec<ProviderConfig>) -> ProxyConfig {
    ProxyConfig {
        sts_endpoint: sts_endpoint.to_string(),
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        max_body_bytes: 64 * 1024,
        upstream_timeout_secs: 5,
        discovery_timeout_secs: 5,
        signing_key: SigningKeyConfig {
            private_jwk_path: Some(key.path.clone()),
            ..Default::default()
        },
        oidc_providers: providers,
    }
}

/// Form body of an `AssumeRoleWithWebIdentity` call carrying `token`.
pub fn assume_role_form(token: &str) -> String {
    serde_urlencoded::to_string([
        ("Action", "AssumeRoleWithWebIdentity"),
        ("Version", "2011-06-15"),
        ("RoleArn", "arn:aws:iam::123456789012:role/app"),
        ("RoleSessionName", "e2e"),
        ("WebIdentityToken", token),
    ])
    .expect("form encoding")
}

/// Value of the first field called `name`.
pub fn form_field<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}
