//! Lifecycle of the management endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use simplemx_core::{Dispatcher, Managed, Registry, StructuredName};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::listener::{self, Catalog, Endpoint};
use crate::stats::ListenerStats;

struct Running {
    registry: Arc<Registry>,
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept: JoinHandle<()>,
}

/// A TCP endpoint serving one registry of managed objects.
///
/// Each `start` creates a fresh registry; `stop` unregisters everything in it.
pub struct ManagementServer {
    config: ServerConfig,
    stats: Arc<ListenerStats>,
    state: Mutex<Option<Running>>,
}

impl ManagementServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            stats: Arc::new(ListenerStats::new()),
            state: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Counters of this endpoint, shared across restarts.
    pub fn stats(&self) -> &Arc<ListenerStats> {
        &self.stats
    }

    /// Bind the configured address and start accepting clients.
    ///
    /// Returns the bound address, which differs from the configured one
    /// when port 0 was requested.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let addr = self.config.socket_addr().ok_or(ServerError::NotConfigured)?;
        self.config.validate()?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let catalog = Arc::new(Catalog::new());
        let registry = Arc::new(Registry::with_publisher(catalog.clone()));
        let endpoint = Arc::new(Endpoint {
            dispatcher: Dispatcher::new(registry.clone()),
            catalog,
            stats: self.stats.clone(),
            max_message_size: self.config.max_message_size,
            connections: Arc::new(Semaphore::new(self.config.max_connections)),
        });

        let (shutdown, shutdown_rx) = watch::channel(false);
        let accept = tokio::spawn(listener::serve(listener, endpoint, shutdown_rx));

        info!(%local_addr, "management listener started");
        *state = Some(Running {
            registry,
            local_addr,
            shutdown,
            accept,
        });
        Ok(local_addr)
    }

    /// Stop accepting clients, close open connections and unregister every
    /// object.
    pub async fn stop(&self) -> Result<()> {
        let running = self.state.lock().await.take().ok_or(ServerError::NotRunning)?;

        if running.shutdown.send(true).is_err() {
            warn!("accept loop already gone");
        }
        if let Err(e) = running.accept.await {
            warn!("accept loop ended abnormally: {}", e);
        }

        for name in running.registry.names() {
            running.registry.unregister_name(&name)?;
        }

        info!(local_addr = %running.local_addr, "management listener stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Address the running listener is bound to.
    pub async fn local_addr(&self) -> Result<SocketAddr> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|r| r.local_addr)
            .ok_or(ServerError::NotRunning)
    }

    /// Registry of the running listener.
    pub async fn registry(&self) -> Result<Arc<Registry>> {
        self.state
            .lock()
            .await
            .as_ref()
            .map(|r| r.registry.clone())
            .ok_or(ServerError::NotRunning)
    }

    /// Register `object` with the running listener.
    pub async fn register<T: Managed>(&self, object: &Arc<T>) -> Result<StructuredName> {
        Ok(self.registry().await?.register(object)?)
    }

    /// Unregister `object` from the running listener.
    pub async fn unregister<T: Managed>(&self, object: &Arc<T>) -> Result<()> {
        Ok(self.registry().await?.unregister(object)?)
    }
}
