//! Application state shared across handlers.

use std::sync::Arc;
use url::Url;

use crate::rewrite::RequestRewriter;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub rewriter: Arc<RequestRewriter>,
    pub http: reqwest::Client,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(rewriter: Arc<RequestRewriter>, http: reqwest::Client, max_body_bytes: usize) -> Self {
        Self {
            rewriter,
            http,
            max_body_bytes,
        }
    }

    /// Base URL every request is forwarded to.
    pub fn sts_endpoint(&self) -> &Url {
        self.rewriter.sts_endpoint()
    }
}
