use log::{debug, info};
use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::net::conn::BufferedConnection;
use crate::proxy::codec::{self, CodecError, ConnectionReply, ConnectionRequest, ProtocolError};
use crate::proxy::consts::{Command, Method, ReplyCode, SOCKS5_VERSION};
use crate::proxy::forward::{self, ConnectError, TunnelError};
use crate::proxy::resolver::ResolveError;

#[derive(Error, Debug)]
pub enum Socks5ProxyError {
    #[error("Not a SOCKS5 connection (first byte: {0:#04x})")]
    NotSocks5(u8),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("Connection error: {0}")]
    Dial(#[from] ConnectError),
    #[error("No acceptable authentication method offered")]
    NoAcceptableMethods,
    #[error("Unsupported command: {0:?}")]
    UnsupportedCommand(Command),
    #[error("Unusable destination address: {0}")]
    Resolve(#[from] ResolveError),
    #[error("Cannot determine local address of outbound connection: {0}")]
    BindAddress(io::Error),
    #[error("Tunnel error: {0}")]
    Tunnel(#[from] TunnelError),
}

impl From<CodecError> for Socks5ProxyError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Protocol(e) => Socks5ProxyError::Protocol(e),
            CodecError::Transport(e) => Socks5ProxyError::Transport(e),
        }
    }
}

impl Socks5ProxyError {
    /// Reply code to send for a failure detected before the reply was
    /// written, or `None` when no reply can or should be sent.
    pub fn failure_reply(&self) -> Option<ReplyCode> {
        match self {
            Socks5ProxyError::Protocol(ProtocolError::InvalidCommand(_))
            | Socks5ProxyError::UnsupportedCommand(_) => Some(ReplyCode::CommandNotSupported),
            Socks5ProxyError::Protocol(ProtocolError::InvalidAddressType(_)) => {
                Some(ReplyCode::AddressTypeNotSupported)
            }
            Socks5ProxyError::Resolve(ResolveError::AddressLength { .. }) => {
                Some(ReplyCode::GeneralFailure)
            }
            Socks5ProxyError::Resolve(_) => Some(ReplyCode::HostUnreachable),
            Socks5ProxyError::Dial(e) => Some(match e {
                ConnectError::AddressResolutionFailed(_) => ReplyCode::HostUnreachable,
                ConnectError::ConnectionRefused(_) => ReplyCode::ConnectionRefused,
                ConnectError::NetworkUnreachable(_) => ReplyCode::NetworkUnreachable,
                ConnectError::HostUnreachable(_) => ReplyCode::HostUnreachable,
                ConnectError::ConnectionTimeout => ReplyCode::TtlExpired,
                ConnectError::Io(_) => ReplyCode::GeneralFailure,
            }),
            _ => None,
        }
    }
}

/// Picks `NO_AUTH` when offered, `NO_ACCEPTABLE_METHODS` otherwise.
pub fn select_method(offered: &HashSet<Method>) -> Method {
    if offered.contains(&Method::NoAuth) {
        Method::NoAuth
    } else {
        Method::NoAcceptable
    }
}

/// Server side of an unauthenticated, CONNECT-only SOCKS5 handshake.
pub struct Socks5Proxy {
    connect_timeout: Duration,
}

impl Socks5Proxy {
    pub fn new(connect_timeout: Duration) -> Self {
        Socks5Proxy { connect_timeout }
    }

    /// Runs the handshake and, once `SUCCEEDED` is written, the tunnel.
    ///
    /// The client connection is owned for the whole exchange and closed when
    /// this returns, whichever step ended it.
    pub async fn handle_connection<S>(
        &self,
        mut conn: BufferedConnection<S>,
    ) -> Result<(), Socks5ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (target, target_stream, bound) = match self.negotiate(&mut conn).await {
            Ok(negotiated) => negotiated,
            Err(e) => {
                if let Some(reply_code) = e.failure_reply() {
                    debug!("Sending failure reply: {}", reply_code);
                    let reply = ConnectionReply::failure(reply_code);
                    if let Err(write_err) = codec::write_connection_reply(&mut conn, &reply).await
                    {
                        debug!("Failed to send failure reply: {}", write_err);
                    }
                }
                return Err(e);
            }
        };

        info!("Connected to target: {} (bound {})", target, bound);

        codec::write_connection_reply(&mut conn, &ConnectionReply::succeeded(bound)).await?;

        let (up, down) = forward::tunnel(conn, target_stream).await.into_result()?;

        info!(
            "Tunnel to {} closed ({} bytes up, {} bytes down)",
            target, up, down
        );
        Ok(())
    }

    /// Version check through dial. Returns the dialed target, its stream and
    /// the stream's local address.
    async fn negotiate<S>(
        &self,
        conn: &mut BufferedConnection<S>,
    ) -> Result<(String, TcpStream, SocketAddr), Socks5ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.check_version(conn).await?;
        self.negotiate_method(conn).await?;

        let request = codec::read_connection_request(conn).await?;
        if request.command != Command::Connect {
            return Err(Socks5ProxyError::UnsupportedCommand(request.command));
        }

        self.dial(&request).await
    }

    async fn check_version<S>(&self, conn: &mut BufferedConnection<S>) -> Result<(), Socks5ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let version = conn.read_byte().await?;
        if version != SOCKS5_VERSION {
            return Err(Socks5ProxyError::NotSocks5(version));
        }
        Ok(())
    }

    async fn negotiate_method<S>(
        &self,
        conn: &mut BufferedConnection<S>,
    ) -> Result<(), Socks5ProxyError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let offered = codec::read_greeting(conn).await?;
        let selected = select_method(&offered);
        debug!("Client offered {:?}, selected {:?}", offered, selected);

        codec::write_method_selection(conn, selected).await?;

        if selected == Method::NoAcceptable {
            return Err(Socks5ProxyError::NoAcceptableMethods);
        }
        Ok(())
    }

    async fn dial(
        &self,
        request: &ConnectionRequest,
    ) -> Result<(String, TcpStream, SocketAddr), Socks5ProxyError> {
        let target = request.dial_address()?;
        debug!(
            "CONNECT {} (SOCKS v{}, {:?} address, port {})",
            target,
            request.version,
            request.address_type,
            request.port()
        );

        let stream = forward::connect_with_timeout(&target, self.connect_timeout).await?;
        let bound = stream.local_addr().map_err(Socks5ProxyError::BindAddress)?;
        Ok((target, stream, bound))
    }
}
