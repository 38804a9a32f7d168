//! HTTP surface of sts-irsa-proxy.
//!
//! Every inbound request is buffered, handed to the [`RequestRewriter`], and
//! the resulting [`RewritePlan`] is forwarded to the configured STS endpoint.
//! The upstream response is relayed back unchanged.

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod proxy;
pub mod rewrite;
pub mod routes;
pub mod server;
pub mod state;

pub use bootstrap::{StartupError, build_registry, build_state};
pub use error::ProxyError;
pub use rewrite::{InboundRequest, RequestRewriter, RewritePlan};
pub use routes::create_router;
pub use server::{serve, serve_with_shutdown};
pub use state::AppState;
