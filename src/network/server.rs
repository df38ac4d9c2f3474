use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{net::TcpListener, select};
use tracing::{debug, error, info, warn};

use super::connection::ConnectionManager;

/// TCP-сервер: принимает соединения и отдаёт их [`ConnectionManager`].
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    manager: Arc<ConnectionManager>,
}

impl Server {
    pub async fn bind(
        addr: SocketAddr,
        manager: Arc<ConnectionManager>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self { listener, manager })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("listener has no local address")
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Цикл приёма до сигнала остановки менеджера.
    pub async fn run(self) -> Result<()> {
        let mut shutdown = self.manager.shutdown_receiver();
        info!(addr = %self.local_addr()?, "accepting connections");

        loop {
            if *shutdown.borrow() {
                break;
            }
            select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        if let Err(e) = socket.set_nodelay(true) {
                            debug!(%addr, error = %e, "set_nodelay failed");
                        }
                        let manager = self.manager.clone();
                        tokio::spawn(async move {
                            if let Err(e) = manager.handle_connection(socket, addr).await {
                                warn!(%addr, error = format!("{e:#}"), "connection rejected or failed");
                            }
                        });
                    }
                    Err(e) => {
                        // EMFILE и подобное: не крутимся в пустом цикле
                        error!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }

        info!("listener stopped");
        Ok(())
    }
}
