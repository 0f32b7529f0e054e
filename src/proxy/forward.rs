use log::debug;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::task;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Address resolution failed: {0}")]
    AddressResolutionFailed(String),
    #[error("Connection refused: {0}")]
    ConnectionRefused(io::Error),
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(io::Error),
    #[error("Host unreachable: {0}")]
    HostUnreachable(io::Error),
    #[error("Connection timeout")]
    ConnectionTimeout,
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectError {
    fn from_connect(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => ConnectError::ConnectionRefused(e),
            io::ErrorKind::NetworkUnreachable => ConnectError::NetworkUnreachable(e),
            io::ErrorKind::HostUnreachable => ConnectError::HostUnreachable(e),
            io::ErrorKind::TimedOut => ConnectError::ConnectionTimeout,
            _ => ConnectError::Io(e),
        }
    }
}

/// Resolves `addr` and tries each resolved address in turn. The timeout
/// applies to every attempt separately; the last failure is returned.
pub async fn connect_with_timeout(
    addr: &str,
    connect_timeout: Duration,
) -> Result<TcpStream, ConnectError> {
    let targets: Vec<SocketAddr> = lookup_host(addr)
        .await
        .map_err(|e| ConnectError::AddressResolutionFailed(format!("{}: {}", addr, e)))?
        .collect();

    if targets.is_empty() {
        return Err(ConnectError::AddressResolutionFailed(format!(
            "{}: no addresses found",
            addr
        )));
    }

    let mut last_error = ConnectError::ConnectionTimeout;
    for target in targets {
        match timeout(connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!("Connect to {} ({}) failed: {}", addr, target, e);
                last_error = ConnectError::from_connect(e);
            }
            Err(_) => {
                debug!("Connect to {} ({}) timed out", addr, target);
                last_error = ConnectError::ConnectionTimeout;
            }
        }
    }

    Err(last_error)
}

/// Terminal outcome of each relay direction, in bytes copied.
#[derive(Debug)]
pub struct TunnelOutcome {
    pub client_to_destination: io::Result<u64>,
    pub destination_to_client: io::Result<u64>,
}

impl TunnelOutcome {
    pub fn into_result(self) -> Result<(u64, u64), TunnelError> {
        match (self.client_to_destination, self.destination_to_client) {
            (Ok(up), Ok(down)) => Ok((up, down)),
            (up, down) => Err(TunnelError {
                client_to_destination: up.err(),
                destination_to_client: down.err(),
            }),
        }
    }
}

#[derive(Error, Debug)]
#[error(
    "client->destination: {}, destination->client: {}",
    describe(.client_to_destination),
    describe(.destination_to_client)
)]
pub struct TunnelError {
    pub client_to_destination: Option<io::Error>,
    pub destination_to_client: Option<io::Error>,
}

fn describe(outcome: &Option<io::Error>) -> String {
    match outcome {
        Some(e) => e.to_string(),
        None => "ok".to_string(),
    }
}

/// Relays bytes both ways until each direction reaches EOF or fails.
///
/// Client-to-destination runs on its own task; destination-to-client runs on
/// the caller's. A direction that ends shuts down the write side it fed, and
/// a failure in one direction never cancels the other.
pub async fn tunnel<C, D>(client: C, destination: D) -> TunnelOutcome
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    D: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut client_reader, mut client_writer) = tokio::io::split(client);
    let (mut destination_reader, mut destination_writer) = tokio::io::split(destination);

    let upstream =
        task::spawn(async move { copy_half(&mut client_reader, &mut destination_writer).await });

    let destination_to_client = copy_half(&mut destination_reader, &mut client_writer).await;
    let client_to_destination = upstream
        .await
        .unwrap_or_else(|e| Err(io::Error::other(e)));

    TunnelOutcome {
        client_to_destination,
        destination_to_client,
    }
}

async fn copy_half<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copied = tokio::io::copy(reader, writer).await;
    if let Err(e) = writer.shutdown().await {
        debug!("Failed to shut down relay write half: {}", e);
    }
    copied
}
