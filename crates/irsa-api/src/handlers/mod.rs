//! Request handlers that are answered by the proxy itself.

pub mod health;
