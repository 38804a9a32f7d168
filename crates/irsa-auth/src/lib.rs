//! Token verification and re-signing for sts-irsa-proxy.
//!
//! Tokens arriving at the proxy are checked against every configured OIDC
//! issuer, their subject is optionally rewritten per issuer policy, and the
//! resulting claims are signed with the proxy's own key so that STS accepts
//! them.

pub mod jwt;
pub mod keys;
pub mod oidc;
pub mod providers;
pub mod transform;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use jwt::{Audience, ClaimsSigner, JwtError, JwtSigner, RegisteredClaims};
pub use keys::SigningIdentity;
pub use oidc::{OidcDiscoveryDocument, OidcVerifier};
pub use providers::{
    ProviderError, TokenVerifier,
    registry::{ProviderRegistry, ProviderRejection, VerificationError},
};
pub use transform::transform_claims;
