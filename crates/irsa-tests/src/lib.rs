//! End-to-end test infrastructure for sts-irsa-proxy.
//!
//! Issuers and STS are wiremock servers; the proxy itself runs on a real
//! listener bound to an ephemeral port.
//!
//! # Usage
//!
//! ```ignore
//! use irsa_tests::{MockIssuer, MockSts, SigningKeyFile, TestProxy, proxy_config};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let issuer = MockIssuer::start("cluster-key").await;
//!     let sts = MockSts::start().await;
//!     let key = SigningKeyFile::new();
//!     let config = proxy_config(&sts.uri(), &key, vec![issuer.provider()]);
//!     let proxy = TestProxy::start(&config).await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,irsa_api=debug,irsa_auth=debug")),
        )
        .with_test_writer()
        .try_init();
}
