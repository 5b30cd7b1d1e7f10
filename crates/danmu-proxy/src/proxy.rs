//! MITM proxy server.
//!
//! Terminates TLS for the allowed Douyin hosts and routes their traffic
//! through [`WebcastHandler`].

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use danmu_core::{EventSink, InterceptionAdapter, LineSink, RoomTracker};
use hudsucker::certificate_authority::RcgenAuthority;
use hudsucker::Proxy;
use tokio::sync::broadcast;

use crate::ca::CaManager;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::handler::WebcastHandler;
use crate::tls::{upstream_connector, UpstreamConnector};

/// MITM proxy server emitting live events to a sink.
pub struct ProxyServer {
    config: ProxyConfig,
    ca_manager: CaManager,
    sink: Arc<dyn EventSink>,
    tracker: Arc<RoomTracker>,
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("config", &self.config)
            .field("ca_manager", &self.ca_manager)
            .field("sink", &"EventSink")
            .finish()
    }
}

impl ProxyServer {
    /// Creates a server writing events to stdout.
    ///
    /// The CA is generated here if it does not exist yet.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let ca_manager = config.ca_manager()?;
        ca_manager.ensure_ca()?;

        Ok(Self {
            config,
            ca_manager,
            sink: Arc::new(LineSink::stdout()),
            tracker: Arc::new(RoomTracker::new()),
        })
    }

    /// Replaces the event sink.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.listen_addr
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Room registry shared by every connection.
    pub fn tracker(&self) -> &Arc<RoomTracker> {
        &self.tracker
    }

    /// CA certificate path for user installation.
    pub fn ca_cert_path(&self) -> PathBuf {
        self.ca_manager.cert_path()
    }

    /// Runs until the process is killed.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Runs until `shutdown` completes, then drains open connections.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let parts = self.into_parts()?;
        parts.serve(shutdown).await
    }

    /// Starts the proxy in the background.
    ///
    /// Setup errors (CA, TLS) are returned here; bind and runtime errors are
    /// logged by the spawned task.
    pub fn start(self) -> Result<ProxyHandle> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let addr = self.config.listen_addr;

        let parts = self.into_parts()?;

        let handle = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.recv().await;
                tracing::info!("Proxy shutdown signal received");
            };

            if let Err(e) = parts.serve(shutdown).await {
                tracing::error!("Proxy error: {}", e);
            }
        });

        Ok(ProxyHandle {
            shutdown_tx,
            addr,
            handle,
        })
    }

    fn into_parts(self) -> Result<ServeParts> {
        let authority = self.ca_manager.load_authority()?;
        let connector = upstream_connector(self.config.insecure_upstream)?;

        let adapter = InterceptionAdapter::new(
            self.config.adapter.clone(),
            self.tracker,
            self.sink,
        );
        let handler = WebcastHandler::new(
            Arc::new(adapter),
            self.config.host_allow_list(),
            self.config.stream_large_bodies,
        );

        tracing::info!("CA certificate: {:?}", self.ca_manager.cert_path());

        Ok(ServeParts {
            addr: self.config.listen_addr,
            authority,
            connector,
            handler,
        })
    }
}

struct ServeParts {
    addr: SocketAddr,
    authority: RcgenAuthority,
    connector: UpstreamConnector,
    handler: WebcastHandler,
}

impl ServeParts {
    async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let proxy = Proxy::builder()
            .with_addr(self.addr)
            .with_ca(self.authority)
            .with_http_connector(self.connector)
            .with_http_handler(self.handler.clone())
            .with_websocket_handler(self.handler)
            .with_graceful_shutdown(shutdown)
            .build()
            .map_err(|e| ProxyError::Proxy(e.to_string()))?;

        tracing::info!("Starting MITM proxy on {}", self.addr);

        proxy
            .start()
            .await
            .map_err(|e| ProxyError::Proxy(e.to_string()))?;

        tracing::info!("Proxy server stopped");
        Ok(())
    }
}

/// Handle for controlling a running proxy server.
pub struct ProxyHandle {
    shutdown_tx: broadcast::Sender<()>,
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl ProxyHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signals the proxy to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Waits for the proxy to finish.
    pub async fn wait(self) {
        let _ = self.handle.await;
    }

    /// Shuts down the proxy and waits for it to finish.
    pub async fn stop(self) {
        self.shutdown();
        self.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use danmu_core::NullSink;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> ProxyConfig {
        ProxyConfig::default()
            .with_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_ca_dir(temp_dir.path().join("ca"))
    }

    #[test]
    fn new_generates_ca() {
        let temp_dir = TempDir::new().unwrap();
        let server = ProxyServer::new(test_config(&temp_dir)).unwrap();

        assert!(server.ca_cert_path().exists());
        assert!(server
            .ca_cert_path()
            .to_string_lossy()
            .ends_with("danmu-ca.crt"));
    }

    #[test]
    fn server_reports_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir).with_port(18081);
        let server = ProxyServer::new(config).unwrap();

        assert_eq!(server.addr().port(), 18081);
        assert!(server.config().insecure_upstream);
        assert_eq!(server.tracker().known_rooms(), 0);
    }

    #[tokio::test]
    async fn handle_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let server = ProxyServer::new(test_config(&temp_dir))
            .unwrap()
            .with_sink(Arc::new(NullSink));

        let handle = server.start().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        handle.stop().await;
    }

    #[tokio::test]
    async fn run_until_returns_after_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let server = ProxyServer::new(test_config(&temp_dir))
            .unwrap()
            .with_sink(Arc::new(NullSink));

        let result = server.run_until(async {}).await;
        assert!(result.is_ok());
    }
}
