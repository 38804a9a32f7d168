//! CLI command definitions.

use clap::{Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the proxy
    Serve {
        /// Path to the proxy configuration
        #[arg(short, long)]
        config: PathBuf,

        /// Listen address, overrides listenAddr from the configuration
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },

    /// Verify a token read from stdin against the configured issuers
    ValidateToken {
        /// Path to the proxy configuration
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
