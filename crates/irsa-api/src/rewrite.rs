//! Per-request rewrite decision.
//!
//! A request either leaves the proxy byte-for-byte as it arrived
//! ([`RewritePlan::Passthrough`]) or with its `WebIdentityToken` replaced by a
//! token the proxy signed ([`RewritePlan::Rewritten`]). Nothing in between is
//! ever handed to the transport. Failures never reject the request; STS gets
//! the original and decides for itself.

use bytes::Bytes;
use http::Method;
use irsa_auth::{
    ClaimsSigner, JwtError, ProviderRegistry, VerificationError, transform_claims,
};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::{Url, form_urlencoded};

pub const ASSUME_ROLE_WITH_WEB_IDENTITY: &str = "AssumeRoleWithWebIdentity";
pub const ACTION_FIELD: &str = "Action";
pub const TOKEN_FIELD: &str = "WebIdentityToken";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A fully buffered inbound request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl InboundRequest {
    /// A form-encoded POST, the shape STS clients send.
    pub fn form_post(body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            content_type: Some(FORM_CONTENT_TYPE.to_string()),
            body: body.into(),
        }
    }

    fn is_form_encoded(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
    }
}

/// What the transport should send upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewritePlan {
    /// Forward the original body unchanged.
    Passthrough,
    /// Forward `body` to `target` with `content_length` as its length.
    Rewritten {
        target: Url,
        body: Bytes,
        content_length: usize,
    },
}

/// Why a request was not rewritten.
#[derive(Debug)]
enum Skip {
    NotPost(Method),
    NotFormEncoded(Option<String>),
    MalformedForm(String),
    OtherAction(String),
    MissingToken,
    Unverified(VerificationError),
    SigningFailed(JwtError),
}

impl Skip {
    fn log(&self) {
        match self {
            Skip::NotPost(method) => info!(%method, "Method is not POST, skipping rewrite"),
            Skip::NotFormEncoded(content_type) => {
                info!(content_type = ?content_type, "Body is not form encoded, skipping rewrite")
            }
            Skip::MalformedForm(e) => info!(error = %e, "Failed to parse form body, skipping rewrite"),
            Skip::OtherAction(action) => {
                info!(action = %action, "Action is not AssumeRoleWithWebIdentity, skipping rewrite")
            }
            Skip::MissingToken => info!("Missing web identity token, skipping rewrite"),
            Skip::Unverified(e) => warn!(error = %e, "Failed to verify token, skipping rewrite"),
            Skip::SigningFailed(e) => warn!(error = %e, "Failed to sign claims, skipping rewrite"),
        }
    }
}

/// Verifies, transforms and re-signs `AssumeRoleWithWebIdentity` requests.
pub struct RequestRewriter {
    registry: Arc<ProviderRegistry>,
    signer: Arc<dyn ClaimsSigner>,
    sts_endpoint: Url,
}

impl RequestRewriter {
    pub fn new(registry: Arc<ProviderRegistry>, signer: Arc<dyn ClaimsSigner>, sts_endpoint: Url) -> Self {
        Self {
            registry,
            signer,
            sts_endpoint,
        }
    }

    pub fn sts_endpoint(&self) -> &Url {
        &self.sts_endpoint
    }

    /// Number of issuers tokens are checked against.
    pub fn provider_count(&self) -> usize {
        self.registry.len()
    }

    pub fn signing_key_id(&self) -> Option<&str> {
        self.signer.key_id()
    }

    /// Decide how `request` leaves the proxy.
    pub async fn rewrite(&self, request: &InboundRequest) -> RewritePlan {
        match self.try_rewrite(request).await {
            Ok(plan) => plan,
            Err(skip) => {
                skip.log();
                RewritePlan::Passthrough
            }
        }
    }

    async fn try_rewrite(&self, request: &InboundRequest) -> Result<RewritePlan, Skip> {
        if request.method != Method::POST {
            return Err(Skip::NotPost(request.method.clone()));
        }
        if !request.is_form_encoded() {
            return Err(Skip::NotFormEncoded(request.content_type.clone()));
        }

        // Parsing works on the buffered copy; `request.body` stays intact for passthrough.
        let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(&request.body)
            .map_err(|e| Skip::MalformedForm(e.to_string()))?;

        let action = first_value(&fields, ACTION_FIELD).unwrap_or_default();
        if action != ASSUME_ROLE_WITH_WEB_IDENTITY {
            return Err(Skip::OtherAction(action.to_string()));
        }

        let token = match first_value(&fields, TOKEN_FIELD) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(Skip::MissingToken),
        };

        let (claims, provider) = self.registry.select(token).await.map_err(Skip::Unverified)?;
        let claims = transform_claims(claims, provider);

        let signed = self.signer.sign(&claims).map_err(Skip::SigningFailed)?;
        debug!(
            issuer = %provider.issuer_url,
            subject = %claims.subject(),
            "Re-signed web identity token"
        );

        let body = Bytes::from(replace_token(&request.body, &signed));
        Ok(RewritePlan::Rewritten {
            target: self.sts_endpoint.clone(),
            content_length: body.len(),
            body,
        })
    }
}

fn first_value<'a>(fields: &'a [(String, String)], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Rebuild the raw form with `token` as the only `WebIdentityToken` value.
///
/// The first token pair is replaced in place and later ones are dropped.
/// Every other pair, including empty ones, is copied byte for byte.
fn replace_token(body: &[u8], token: &str) -> Vec<u8> {
    let mut encoded_token: Option<String> = Some(form_urlencoded::byte_serialize(token.as_bytes()).collect());
    let mut out = Vec::with_capacity(body.len() + token.len());
    let mut first = true;

    for pair in body.split(|byte| *byte == b'&') {
        let is_token = form_urlencoded::parse(pair)
            .next()
            .is_some_and(|(name, _)| name == TOKEN_FIELD);
        let replacement = match (is_token, encoded_token.take_if(|_| is_token)) {
            (true, None) => continue,
            (_, replacement) => replacement,
        };

        if !first {
            out.push(b'&');
        }
        first = false;

        match replacement {
            Some(value) => {
                out.extend_from_slice(TOKEN_FIELD.as_bytes());
                out.push(b'=');
                out.extend_from_slice(value.as_bytes());
            }
            None => out.extend_from_slice(pair),
        }
    }
    out
}
