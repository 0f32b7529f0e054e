use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{self, JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;

use crate::net::conn::BufferedConnection;
use crate::proxy::socks5::{Socks5Proxy, Socks5ProxyError};

#[derive(Error, Debug)]
pub enum TcpProxyError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("SOCKS5 proxy error: {0}")]
    Socks5ProxyError(#[from] Socks5ProxyError),
}

impl TcpProxyError {
    fn is_not_socks5(&self) -> bool {
        matches!(
            self,
            TcpProxyError::Socks5ProxyError(Socks5ProxyError::NotSocks5(_))
        )
    }
}

/// Accept loop: one task per client connection, bounded by `max_connections`.
pub struct TcpProxy {
    buffer_size: usize,
    semaphore: Arc<Semaphore>,
    connect_timeout: Duration,
}

impl TcpProxy {
    pub fn new(buffer_size: usize, max_connections: usize, connect_timeout: Duration) -> Self {
        TcpProxy {
            buffer_size,
            semaphore: Arc::new(Semaphore::new(max_connections)),
            connect_timeout,
        }
    }

    /// Accept connections until Ctrl-C / SIGINT is received.
    pub async fn run(&self, listener: TcpListener) {
        self.run_until(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    pub async fn run_until<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        match listener.local_addr() {
            Ok(addr) => info!("SOCKS5 relay listening on {}", addr),
            Err(e) => warn!("SOCKS5 relay listening on unknown address: {}", e),
        }

        let mut incoming = TcpListenerStream::new(listener);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                next = incoming.next() => {
                    match next {
                        Some(Ok(stream)) => self.dispatch(stream),
                        Some(Err(e)) => {
                            error!("Accept error: {}", e);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                        None => break,
                    }
                }
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        info!("Stopped accepting new connections");
    }

    /// Spawns the handler and a watcher that logs its outcome, so neither an
    /// error nor a panic in one connection reaches the accept loop.
    fn dispatch(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string());

        let permit = match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!("Max connections reached, rejecting {}", peer);
                drop(stream);
                return;
            }
        };

        debug!("Accepted connection from {}", peer);
        let handler = task::spawn(Self::handle_connection(
            stream,
            self.buffer_size,
            self.connect_timeout,
        ));

        watch(peer, handler, permit);
    }

    async fn handle_connection(
        stream: TcpStream,
        buffer_size: usize,
        connect_timeout: Duration,
    ) -> Result<(), TcpProxyError> {
        stream.set_nodelay(true)?;
        let conn = BufferedConnection::new(stream, buffer_size);
        Socks5Proxy::new(connect_timeout)
            .handle_connection(conn)
            .await?;
        Ok(())
    }
}

/// Logs how a connection handler ended and releases its permit, whatever
/// the outcome, including a panic.
fn watch(
    peer: String,
    handler: JoinHandle<Result<(), TcpProxyError>>,
    permit: OwnedSemaphorePermit,
) -> JoinHandle<()> {
    task::spawn(async move {
        match handler.await {
            Ok(Ok(())) => debug!("Connection from {} finished", peer),
            Ok(Err(e)) if e.is_not_socks5() => warn!("Rejected {}: {}", peer, e),
            Ok(Err(e)) => error!("Connection error from {}: {}", peer, e),
            Err(e) if e.is_panic() => error!("Connection handler for {} panicked: {}", peer, e),
            Err(e) => error!("Connection handler for {} aborted: {}", peer, e),
        }
        drop(permit);
    })
}
