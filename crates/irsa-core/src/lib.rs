//! sts-irsa-proxy core
//!
//! Configuration model and error handling shared by the proxy crates.
//! This crate has minimal dependencies and performs no I/O beyond reading
//! the configuration file.

pub mod config;
pub mod error;

pub use config::{ProviderConfig, ProxyConfig, SigningKeyConfig};
pub use error::{Error, Result};
