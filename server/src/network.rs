//! Listener, accept loop, and task wiring.

use crate::config::ServerConfig;
use crate::connection::{run_connection, ConnHandle, ConnId};
use crate::matchmaker::{run_matchmaker, Matchmaker};
use crate::registry::Registry;
use log::{info, warn};
use shared::GREETING;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Main server: owns the listener and the shared state every task hangs
/// off of (matchmaking queue, session registry, configuration).
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    matchmaker: Arc<Matchmaker>,
    registry: Arc<Registry>,
    next_conn_id: ConnId,
}

impl Server {
    /// Binds the listener. Fails only on bind errors; everything after
    /// this point is session-local.
    pub async fn bind(config: ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            matchmaker: Arc::new(Matchmaker::new(config.eligibility)),
            registry: Arc::new(Registry::new()),
            config: Arc::new(config),
            next_conn_id: 1,
        })
    }

    /// The actual bound address; useful when binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Registry handle for shutdown cleanup.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accepts clients until the process is stopped.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        tokio::spawn(run_matchmaker(
            Arc::clone(&self.matchmaker),
            Arc::clone(&self.registry),
            Arc::clone(&self.config),
        ));

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let id = self.next_conn_id;
                    self.next_conn_id += 1;
                    info!("Client {} connected from {}", id, addr);

                    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
                    let handle = ConnHandle::new(id, cmd_tx);
                    handle.deliver(GREETING);

                    // Enqueue before the task can run: an instant EOF
                    // must find its queue entry to remove, never insert a
                    // dead handle after its own self-removal.
                    self.matchmaker.enqueue(handle).await;
                    tokio::spawn(run_connection(
                        stream,
                        id,
                        cmd_rx,
                        Arc::clone(&self.matchmaker),
                        self.config.diagnostics,
                    ));
                }
                Err(e) => warn!("Accept failed: {}", e),
            }
        }
    }
}
