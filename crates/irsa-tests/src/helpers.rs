//! Running the proxy on a real listener.

use irsa_core::ProxyConfig;
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A proxy started from a configuration, stopped with [`TestProxy::shutdown`].
pub struct TestProxy {
    pub addr: SocketAddr,
    client: Client,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<std::io::Result<()>>,
}

impl TestProxy {
    /// Run the full startup path and serve on `config.listen_addr`.
    pub async fn start(config: &ProxyConfig) -> anyhow::Result<Self> {
        let state = irsa_api::build_state(config).await?;
        let listener = TcpListener::bind(config.listen_addr).await?;
        let addr = listener.local_addr()?;

        let (shutdown, signal) = oneshot::channel::<()>();
        let handle = tokio::spawn(irsa_api::serve_with_shutdown(
            listener,
            Arc::new(state),
            async move {
                let _ = signal.await;
            },
        ));

        Ok(Self {
            addr,
            client: test_client(),
            shutdown,
            handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// POST a form body the way an AWS SDK calls STS.
    pub async fn post_form(&self, body: impl Into<String>) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(self.url("/"))
            .header("content-type", "application/x-www-form-urlencoded; charset=utf-8")
            .body(body.into())
            .send()
            .await
    }

    pub async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client.get(self.url(path)).send().await
    }

    /// Signal shutdown and wait for the server task to drain.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(());
        self.handle.await??;
        Ok(())
    }
}

/// Create an HTTP client for testing.
pub fn test_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .expect("Failed to create test client")
}
