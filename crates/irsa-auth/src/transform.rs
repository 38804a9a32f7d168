//! Subject rewriting driven by provider policy.

use irsa_core::ProviderConfig;

use crate::jwt::RegisteredClaims;

/// Apply the provider's subject policy to verified claims.
///
/// With `rewrite_subject` set the subject becomes `{cluster_name}/{sub}`;
/// every other claim is returned untouched. Callers apply this exactly once
/// per verified token.
pub fn transform_claims(mut claims: RegisteredClaims, provider: &ProviderConfig) -> RegisteredClaims {
    if provider.rewrite_subject {
        claims.sub = Some(format!("{}/{}", provider.cluster_name, claims.subject()));
    }
    claims
}
