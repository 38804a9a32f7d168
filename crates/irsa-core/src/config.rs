//! Proxy configuration.
//!
//! The configuration is a YAML document. Provider order is significant: it is
//! the order in which the verifier selector tries each issuer.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Default STS endpoint that rewritten requests are delivered to.
pub const DEFAULT_STS_ENDPOINT: &str = "https://sts.amazonaws.com";

/// Top-level proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    /// STS endpoint every request is forwarded to.
    #[serde(default = "default_sts_endpoint")]
    pub sts_endpoint: String,
    /// Address the proxy listens on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// Maximum inbound body size that is buffered for rewriting.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Timeout for the outbound STS request.
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout_secs: u64,
    /// Timeout for each discovery and key set fetch at startup.
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
    /// Key the proxy re-signs tokens with.
    #[serde(flatten)]
    pub signing_key: SigningKeyConfig,
    /// Issuers whose tokens are accepted, in selection order.
    #[serde(default)]
    pub oidc_providers: Vec<ProviderConfig>,
}

/// Where the proxy's private signing key comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningKeyConfig {
    /// Path to a private JWK (RSA or EC P-256).
    #[serde(rename = "privateJWKPath", default, skip_serializing_if = "Option::is_none")]
    pub private_jwk_path: Option<PathBuf>,
    /// Path to a PEM encoded private key.
    #[serde(rename = "privateKeyPath", default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    /// Key identifier placed in the `kid` header. Overrides the JWK's own `kid`.
    #[serde(rename = "keyID", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Signing algorithm (e.g. `RS256`, `ES256`). Overrides the JWK's own `alg`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
}

/// One trusted OIDC issuer and the policy applied to its tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "issuerURL")]
    pub issuer_url: String,
    #[serde(rename = "clientID", default)]
    pub client_id: String,
    #[serde(default)]
    pub audience: String,
    #[serde(rename = "skipIssuerCheck", default)]
    pub skip_issuer_check: bool,
    #[serde(rename = "clusterName", default)]
    pub cluster_name: String,
    #[serde(rename = "rewriteSubject", default)]
    pub rewrite_subject: bool,
}

fn default_sts_endpoint() -> String {
    DEFAULT_STS_ENDPOINT.to_string()
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_upstream_timeout() -> u64 {
    30
}

fn default_discovery_timeout() -> u64 {
    10
}

impl ProviderConfig {
    /// Create a provider entry for the given issuer with every check enabled.
    pub fn new(issuer_url: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into(),
            ..Default::default()
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    pub fn skip_issuer_check(mut self, skip: bool) -> Self {
        self.skip_issuer_check = skip;
        self
    }

    /// Prefix subjects with `cluster_name` when `rewrite` is set.
    pub fn with_cluster(mut self, cluster_name: impl Into<String>, rewrite: bool) -> Self {
        self.cluster_name = cluster_name.into();
        self.rewrite_subject = rewrite;
        self
    }

    /// Audiences a token must carry (at least one of). Empty means unchecked.
    pub fn expected_audiences(&self) -> Vec<&str> {
        [self.client_id.as_str(), self.audience.as_str()]
            .into_iter()
            .filter(|aud| !aud.is_empty())
            .collect()
    }
}

impl ProxyConfig {
    /// Load configuration from a YAML file and validate it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string and validate it.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.sts_endpoint_url()?;

        let key = &self.signing_key;
        match (&key.private_jwk_path, &key.private_key_path) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidConfig(
                    "privateJWKPath and privateKeyPath are mutually exclusive".to_string(),
                ));
            }
            (None, None) => {
                return Err(Error::InvalidConfig(
                    "one of privateJWKPath or privateKeyPath is required".to_string(),
                ));
            }
            _ => {}
        }

        if self.oidc_providers.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one entry in oidcProviders is required".to_string(),
            ));
        }

        for provider in &self.oidc_providers {
            Url::parse(&provider.issuer_url).map_err(|e| {
                Error::InvalidConfig(format!("invalid issuerURL {:?}: {}", provider.issuer_url, e))
            })?;
            if provider.rewrite_subject && provider.cluster_name.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "provider {} sets rewriteSubject without a clusterName",
                    provider.issuer_url
                )));
            }
        }

        Ok(())
    }

    /// The parsed STS endpoint.
    pub fn sts_endpoint_url(&self) -> Result<Url> {
        Url::parse(&self.sts_endpoint).map_err(|e| {
            Error::InvalidConfig(format!("invalid stsEndpoint {:?}: {}", self.sts_endpoint, e))
        })
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FULL: &str = r#"
stsEndpoint: https://sts.us-west-2.amazonaws.com
listenAddr: 127.0.0.1:9090
privateJWKPath: /etc/sts-irsa-proxy/private.jwk
oidcProviders:
  - issuerURL: https://oidc.cluster-a.example.com
    clientID: sts.amazonaws.com
    clusterName: cluster-a
    rewriteSubject: true
  - issuerURL: http://localhost:8000
    audience: https://kubernetes.default.svc.cluster.local
    skipIssuerCheck: true
    clusterName: cluster-b
"#;

    #[test]
    fn test_parse_full_config() {
        let config = ProxyConfig::parse(FULL).expect("parse");

        assert_eq!(config.sts_endpoint, "https://sts.us-west-2.amazonaws.com");
        assert_eq!(config.listen_addr, "127.0.0.1:9090".parse().unwrap());
        assert_eq!(
            config.signing_key.private_jwk_path,
            Some(PathBuf::from("/etc/sts-irsa-proxy/private.jwk"))
        );
        assert_eq!(config.oidc_providers.len(), 2);

        let first = &config.oidc_providers[0];
        assert_eq!(first.issuer_url, "https://oidc.cluster-a.example.com");
        assert!(first.rewrite_subject);
        assert!(!first.skip_issuer_check);

        let second = &config.oidc_providers[1];
        assert!(second.skip_issuer_check);
        assert!(!second.rewrite_subject);
        assert_eq!(second.cluster_name, "cluster-b");
    }

    #[test]
    fn test_defaults() {
        let config = ProxyConfig::parse(
            "privateKeyPath: private.key\noidcProviders:\n  - issuerURL: https://issuer.example.com\n",
        )
        .expect("parse");

        assert_eq!(config.sts_endpoint, DEFAULT_STS_ENDPOINT);
        assert_eq!(config.listen_addr, default_listen_addr());
        assert_eq!(config.max_body_bytes, 1024 * 1024);
        assert_eq!(config.upstream_timeout(), Duration::from_secs(30));
        assert_eq!(config.discovery_timeout(), Duration::from_secs(10));
        assert_eq!(config.signing_key.algorithm, None);
    }

    #[test]
    fn test_provider_order_is_preserved() {
        let config = ProxyConfig::parse(FULL).expect("parse");
        let issuers: Vec<_> = config
            .oidc_providers
            .iter()
            .map(|p| p.issuer_url.as_str())
            .collect();
        assert_eq!(
            issuers,
            vec!["https://oidc.cluster-a.example.com", "http://localhost:8000"]
        );
    }

    #[test]
    fn test_rejects_missing_providers() {
        let err = ProxyConfig::parse("privateKeyPath: private.key\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_missing_signing_key() {
        let err = ProxyConfig::parse("oidcProviders:\n  - issuerURL: https://issuer.example.com\n")
            .unwrap_err();
        assert!(err.to_string().contains("privateJWKPath"));
    }

    #[test]
    fn test_rejects_both_signing_keys() {
        let err = ProxyConfig::parse(
            "privateKeyPath: a.pem\nprivateJWKPath: a.jwk\noidcProviders:\n  - issuerURL: https://issuer.example.com\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_rejects_rewrite_without_cluster_name() {
        let err = ProxyConfig::parse(
            "privateKeyPath: a.pem\noidcProviders:\n  - issuerURL: https://issuer.example.com\n    rewriteSubject: true\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("clusterName"));
    }

    #[test]
    fn test_rejects_invalid_urls() {
        let err = ProxyConfig::parse(
            "stsEndpoint: not a url\nprivateKeyPath: a.pem\noidcProviders:\n  - issuerURL: https://issuer.example.com\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("stsEndpoint"));

        let err = ProxyConfig::parse("privateKeyPath: a.pem\noidcProviders:\n  - issuerURL: issuer\n")
            .unwrap_err();
        assert!(err.to_string().contains("issuerURL"));
    }

    #[test]
    fn test_expected_audiences() {
        let provider = ProviderConfig::new("https://issuer.example.com");
        assert!(provider.expected_audiences().is_empty());

        let provider = provider
            .with_client_id("sts.amazonaws.com")
            .with_audience("https://kubernetes.default.svc");
        assert_eq!(
            provider.expected_audiences(),
            vec!["sts.amazonaws.com", "https://kubernetes.default.svc"]
        );
    }

    #[test]
    fn test_example_config_is_valid() {
        let config = ProxyConfig::parse(include_str!("../../../config.example.yaml")).unwrap();
        assert_eq!(config.oidc_providers.len(), 2);
        assert!(config.oidc_providers[1].skip_issuer_check);
        assert_eq!(config.oidc_providers[1].cluster_name, "dev");
    }
}
