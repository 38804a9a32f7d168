//! Command handlers.

use console::style;
use irsa_core::ProxyConfig;
use std::io::Read;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Load everything, bind, and serve until shutdown.
pub async fn serve(config_path: &Path, listen: Option<SocketAddr>) -> Result<(), Box<dyn std::error::Error>> {
    let config = ProxyConfig::from_file(config_path)?;
    info!(
        path = %config_path.display(),
        providers = config.oidc_providers.len(),
        "Loaded configuration"
    );

    let state = irsa_api::build_state(&config).await?;
    let addr = listen.unwrap_or(config.listen_addr);
    let listener = TcpListener::bind(addr).await?;

    irsa_api::serve(listener, Arc::new(state)).await?;
    Ok(())
}

/// Check a token from stdin the way the proxy would and report the outcome.
pub async fn validate_token(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = ProxyConfig::from_file(config_path)?;

    let mut token = String::new();
    std::io::stdin().read_to_string(&mut token)?;
    let token = token.trim();
    if token.is_empty() {
        return Err("no token on stdin".into());
    }

    let registry = irsa_api::build_registry(&config).await?;
    match registry.select(token).await {
        Ok((claims, provider)) => {
            println!(
                "{} Token accepted by {}",
                style("✓").green(),
                provider.issuer_url
            );
            if provider.rewrite_subject {
                println!("  Subject will be rewritten for cluster {}", provider.cluster_name);
            }
            println!("{}", serde_json::to_string_pretty(&claims)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} Token rejected", style("✗").red());
            for rejection in &e.rejections {
                eprintln!("  - {}", rejection);
            }
            Err(e.into())
        }
    }
}
