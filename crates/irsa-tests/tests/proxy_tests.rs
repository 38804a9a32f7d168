//! End-to-end tests: real listener, mock issuers, mock STS.

use irsa_auth::testing::{TestIssuer, decode_header_json, decode_payload};
use irsa_auth::{RegisteredClaims, TokenVerifier};
use irsa_core::{ProviderConfig, SigningKeyConfig};
use irsa_tests::*;
use pretty_assertions::assert_eq;
use wiremock::MockServer;

fn outbound_token(form: &[(String, String)]) -> &str {
    form_field(form, "WebIdentityToken").expect("token forwarded")
}

#[tokio::test]
async fn test_rewritten_token_reaches_sts() {
    init_test_logging();

    let issuer = MockIssuer::start("cluster-key").await;
    let sts = MockSts::start().await;
    let key = SigningKeyFile::new();
    let config = proxy_config(
        &sts.uri(),
        &key,
        vec![issuer.provider().with_cluster("test-cluster", true)],
    );
    let proxy = TestProxy::start(&config).await.unwrap();

    let inbound = issuer.token("system:serviceaccount:default:app");
    let response = proxy.post_form(assume_role_form(&inbound)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), STS_SUCCESS_BODY);

    let forms = sts.received_forms().await;
    assert_eq!(forms.len(), 1);
    let token = outbound_token(&forms[0]);
    assert_ne!(token, inbound);
    assert_eq!(
        decode_payload(token)["sub"],
        "test-cluster/system:serviceaccount:default:app"
    );
    assert_eq!(decode_header_json(token)["kid"], "proxy-key");
    assert_eq!(form_field(&forms[0], "RoleArn"), Some("arn:aws:iam::123456789012:role/app"));

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rewritten_token_verifies_with_proxy_key() {
    init_test_logging();

    let issuer = MockIssuer::start("cluster-key").await;
    let sts = MockSts::start().await;
    let key = SigningKeyFile::new();
    let config = proxy_config(&sts.uri(), &key, vec![issuer.provider()]);
    let proxy = TestProxy::start(&config).await.unwrap();

    proxy
        .post_form(assume_role_form(&issuer.token("subject")))
        .await
        .unwrap();

    // STS trusts the proxy's key set, not the cluster's.
    let sts_view = key.keys.verifier(
        &ProviderConfig::new(key.keys.issuer.clone())
            .with_client_id(STS_AUDIENCE)
            .skip_issuer_check(true),
    );
    let forms = sts.received_forms().await;
    let claims: RegisteredClaims = sts_view.verify(outbound_token(&forms[0])).await.unwrap();
    assert_eq!(claims.subject(), "subject");
    assert_eq!(claims.issuer(), issuer.issuer_url());

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unregistered_issuer_passes_through_unchanged() {
    init_test_logging();

    let issuer = MockIssuer::start("cluster-key").await;
    let sts = MockSts::start().await;
    let key = SigningKeyFile::new();
    let config = proxy_config(&sts.uri(), &key, vec![issuer.provider()]);
    let proxy = TestProxy::start(&config).await.unwrap();

    let outsider = TestIssuer::new("https://oidc.outsider.example.com", "outsider");
    let token = outsider.mint(&irsa_auth::testing::claims(
        &outsider.issuer,
        "subject",
        STS_AUDIENCE,
    ));
    let body = assume_role_form(&token);
    let response = proxy.post_form(body.clone()).await.unwrap();
    assert_eq!(response.status(), 200);

    assert_eq!(sts.received_bodies().await, vec![body.into_bytes()]);

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_other_actions_pass_through_unchanged() {
    init_test_logging();

    let issuer = MockIssuer::start("cluster-key").await;
    let sts = MockSts::start().await;
    let key = SigningKeyFile::new();
    let config = proxy_config(&sts.uri(), &key, vec![issuer.provider()]);
    let proxy = TestProxy::start(&config).await.unwrap();

    let body = "Action=GetCallerIdentity&Version=2011-06-15";
    proxy.post_form(body).await.unwrap();

    assert_eq!(sts.received_bodies().await, vec![body.as_bytes().to_vec()]);

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_second_provider_matches_when_first_rejects() {
    init_test_logging();

    let first = MockIssuer::start("first-key").await;
    let second = MockIssuer::start("second-key").await;
    let sts = MockSts::start().await;
    let key = SigningKeyFile::new();
    let config = proxy_config(
        &sts.uri(),
        &key,
        vec![
            first.provider().with_cluster("first", true),
            second.provider().with_cluster("second", true),
        ],
    );
    let proxy = TestProxy::start(&config).await.unwrap();

    proxy
        .post_form(assume_role_form(&second.token("subject")))
        .await
        .unwrap();

    let forms = sts.received_forms().await;
    assert_eq!(decode_payload(outbound_token(&forms[0]))["sub"], "second/subject");

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_subject_kept_without_rewrite() {
    init_test_logging();

    let issuer = MockIssuer::start("cluster-key").await;
    let sts = MockSts::start().await;
    let key = SigningKeyFile::new();
    let config = proxy_config(
        &sts.uri(),
        &key,
        vec![issuer.provider().with_cluster("test-cluster", false)],
    );
    let proxy = TestProxy::start(&config).await.unwrap();

    let inbound = issuer.token("subject");
    proxy.post_form(assume_role_form(&inbound)).await.unwrap();

    let forms = sts.received_forms().await;
    let token = outbound_token(&forms[0]);
    assert_ne!(token, inbound);
    assert_eq!(decode_payload(token)["sub"], "subject");

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rsa_pem_signing_key() {
    init_test_logging();

    let issuer = MockIssuer::start("cluster-key").await;
    let sts = MockSts::start().await;
    let key = SigningKeyFile::new();
    let mut config = proxy_config(&sts.uri(), &key, vec![issuer.provider()]);
    config.signing_key = SigningKeyConfig {
        private_key_path: Some(
            [env!("CARGO_MANIFEST_DIR"), "..", "irsa-auth", "testdata", "rsa-private.pem"]
                .iter()
                .collect(),
        ),
        key_id: Some("pem-key".to_string()),
        ..Default::default()
    };
    let proxy = TestProxy::start(&config).await.unwrap();

    proxy
        .post_form(assume_role_form(&issuer.token("subject")))
        .await
        .unwrap();

    let forms = sts.received_forms().await;
    let header = decode_header_json(outbound_token(&forms[0]));
    assert_eq!(header["alg"], "RS256");
    assert_eq!(header["kid"], "pem-key");

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_health_is_served_locally() {
    init_test_logging();

    let issuer = MockIssuer::start("cluster-key").await;
    let sts = MockSts::start().await;
    let key = SigningKeyFile::new();
    let config = proxy_config(&sts.uri(), &key, vec![issuer.provider()]);
    let proxy = TestProxy::start(&config).await.unwrap();

    let response = proxy.get("/health").await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert!(sts.received_bodies().await.is_empty());

    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_startup_fails_when_discovery_fails() {
    init_test_logging();

    let issuer = MockIssuer::start("cluster-key").await;
    let broken = MockServer::start().await;
    let sts = MockSts::start().await;
    let key = SigningKeyFile::new();
    let config = proxy_config(
        &sts.uri(),
        &key,
        vec![issuer.provider(), ProviderConfig::new(broken.uri())],
    );

    let err = irsa_api::build_state(&config).await.err().expect("startup must fail");
    assert!(matches!(err, irsa_api::StartupError::Provider(_)));
}

#[tokio::test]
async fn test_startup_fails_without_usable_signing_key() {
    init_test_logging();

    let issuer = MockIssuer::start("cluster-key").await;
    let sts = MockSts::start().await;
    let key = SigningKeyFile::new();
    let mut config = proxy_config(&sts.uri(), &key, vec![issuer.provider()]);
    config.signing_key.private_jwk_path = Some(key.path.with_file_name("missing.jwk"));

    let err = irsa_api::build_state(&config).await.err().expect("startup must fail");
    assert!(matches!(err, irsa_api::StartupError::SigningKey(_)));
}
