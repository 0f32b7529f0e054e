//! Encoding and decoding of the four SOCKS5 handshake messages.
//!
//! Every field is read with an exact-length read. SOCKS framing has no
//! delimiters, so a short read is a hard `Transport` failure.

use std::collections::HashSet;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::net::conn::BufferedConnection;
use crate::proxy::consts::{AddressType, Command, Method, ReplyCode, RESERVED, SOCKS5_VERSION};
use crate::proxy::resolver::{self, ResolveError};

/// Well-framed input carrying field values this server rejects.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid SOCKS version in request: {0:#04x}")]
    InvalidVersion(u8),
    #[error("Invalid reserved byte in request: {0:#04x}")]
    InvalidReserved(u8),
    #[error("Invalid command: {0:#04x}")]
    InvalidCommand(u8),
    #[error("Invalid address type: {0:#04x}")]
    InvalidAddressType(u8),
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("IO error: {0}")]
    Transport(#[from] io::Error),
}

/// A parsed `[VER][CMD][RSV][ATYP][DST.ADDR][DST.PORT]` request.
///
/// `address` holds the raw DST.ADDR bytes without the domain length prefix;
/// its length always matches `address_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub version: u8,
    pub command: Command,
    pub address_type: AddressType,
    pub address: Vec<u8>,
    pub port: [u8; 2],
}

impl ConnectionRequest {
    pub fn port(&self) -> u16 {
        u16::from_be_bytes(self.port)
    }

    /// The destination as a dialable `host:port` string.
    pub fn dial_address(&self) -> Result<String, ResolveError> {
        resolver::dial_address(self.address_type, &self.address, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionReply {
    pub reply: ReplyCode,
    pub address_type: AddressType,
    pub address: Vec<u8>,
    pub port: [u8; 2],
}

impl ConnectionReply {
    /// A `SUCCEEDED` reply advertising the local end of the outbound connection.
    pub fn succeeded(bound: SocketAddr) -> Self {
        let (address_type, address, port) = resolver::bound_address(bound);
        ConnectionReply {
            reply: ReplyCode::Succeeded,
            address_type,
            address,
            port,
        }
    }

    pub fn failure(reply: ReplyCode) -> Self {
        ConnectionReply {
            reply,
            address_type: AddressType::Ipv4,
            address: Ipv4Addr::UNSPECIFIED.octets().to_vec(),
            port: [0, 0],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![
            SOCKS5_VERSION,
            self.reply as u8,
            RESERVED,
            self.address_type as u8,
        ];
        encode_address(&mut buf, self.address_type, &self.address, self.port);
        buf
    }
}

/// Appends `[DST.ADDR][DST.PORT]` in the layout selected by `address_type`.
pub fn encode_address(buf: &mut Vec<u8>, address_type: AddressType, address: &[u8], port: [u8; 2]) {
    if address_type == AddressType::DomainName {
        debug_assert!(address.len() <= u8::MAX as usize);
        buf.push(address.len() as u8);
    }
    buf.extend_from_slice(address);
    buf.extend_from_slice(&port);
}

/// Reads `[NMETHODS][METHODS...]`; the version byte has already been consumed.
pub async fn read_greeting<S>(conn: &mut BufferedConnection<S>) -> io::Result<HashSet<Method>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let nmethods = conn.read_byte().await? as usize;
    let methods = conn.read_exact_bytes(nmethods).await?;
    Ok(methods.into_iter().map(Method::from).collect())
}

pub async fn read_connection_request<S>(
    conn: &mut BufferedConnection<S>,
) -> Result<ConnectionRequest, CodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let header = conn.read_exact_bytes(4).await?;
    let version = header[0];
    let command = header[1];
    let reserved = header[2];
    let address_type = header[3];

    if version != SOCKS5_VERSION {
        return Err(ProtocolError::InvalidVersion(version).into());
    }
    if reserved != RESERVED {
        return Err(ProtocolError::InvalidReserved(reserved).into());
    }

    let command = Command::try_from(command).map_err(ProtocolError::InvalidCommand)?;
    let address_type =
        AddressType::try_from(address_type).map_err(ProtocolError::InvalidAddressType)?;
    let (address, port) = read_address(conn, address_type).await?;

    Ok(ConnectionRequest {
        version,
        command,
        address_type,
        address,
        port,
    })
}

/// Reads `[DST.ADDR][DST.PORT]` for a known address type.
pub async fn read_address<S>(
    conn: &mut BufferedConnection<S>,
    address_type: AddressType,
) -> io::Result<(Vec<u8>, [u8; 2])>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let len = match address_type.fixed_len() {
        Some(len) => len,
        None => conn.read_byte().await? as usize,
    };
    let address = conn.read_exact_bytes(len).await?;
    let port = conn.read_exact_bytes(2).await?;
    Ok((address, [port[0], port[1]]))
}

pub async fn write_method_selection<S>(
    conn: &mut BufferedConnection<S>,
    selected: Method,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.write(&[SOCKS5_VERSION, selected.into()]).await
}

pub async fn write_connection_reply<S>(
    conn: &mut BufferedConnection<S>,
    reply: &ConnectionReply,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    conn.write(&reply.to_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    async fn server_with_input(input: &[u8]) -> BufferedConnection<DuplexStream> {
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(input).await.unwrap();
        drop(client);
        BufferedConnection::new(server, 1024)
    }

    #[tokio::test]
    async fn test_read_greeting() {
        let mut conn = server_with_input(&[0x03, 0x02, 0x00, 0x02]).await;
        let methods = read_greeting(&mut conn).await.unwrap();
        assert_eq!(methods.len(), 2);
        assert!(methods.contains(&Method::NoAuth));
        assert!(methods.contains(&Method::UsernamePassword));
    }

    #[tokio::test]
    async fn test_read_empty_greeting() {
        let mut conn = server_with_input(&[0x00]).await;
        let methods = read_greeting(&mut conn).await.unwrap();
        assert!(methods.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_greeting_fails() {
        let mut conn = server_with_input(&[0x03, 0x00]).await;
        let err = read_greeting(&mut conn).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_read_ipv4_request() {
        let mut conn =
            server_with_input(&[0x05, 0x01, 0x00, 0x01, 0x7F, 0x00, 0x00, 0x01, 0x00, 0x50]).await;
        let request = read_connection_request(&mut conn).await.unwrap();
        assert_eq!(request.version, SOCKS5_VERSION);
        assert_eq!(request.command, Command::Connect);
        assert_eq!(request.address_type, AddressType::Ipv4);
        assert_eq!(request.address, vec![127, 0, 0, 1]);
        assert_eq!(request.port(), 80);
        assert_eq!(request.dial_address().unwrap(), "127.0.0.1:80");
    }

    #[tokio::test]
    async fn test_read_domain_request() {
        let mut input = vec![0x05, 0x01, 0x00, 0x03, 11];
        input.extend_from_slice(b"example.com");
        input.extend_from_slice(&443u16.to_be_bytes());
        let mut conn = server_with_input(&input).await;

        let request = read_connection_request(&mut conn).await.unwrap();
        assert_eq!(request.address_type, AddressType::DomainName);
        assert_eq!(request.address, b"example.com");
        assert_eq!(request.dial_address().unwrap(), "example.com:443");
    }

    #[tokio::test]
    async fn test_zero_length_domain_is_parsed() {
        let mut conn = server_with_input(&[0x05, 0x01, 0x00, 0x03, 0x00, 0x00, 0x50]).await;
        let request = read_connection_request(&mut conn).await.unwrap();
        assert!(request.address.is_empty());
        assert_eq!(request.port(), 80);
        assert!(matches!(
            request.dial_address(),
            Err(ResolveError::EmptyDomain)
        ));
    }

    #[tokio::test]
    async fn test_address_round_trip() {
        let v6 = "2001:db8::1".parse::<Ipv6Addr>().unwrap();
        let cases: Vec<(AddressType, Vec<u8>, u16)> = vec![
            (AddressType::Ipv4, vec![10, 0, 0, 7], 1080),
            (AddressType::Ipv6, v6.octets().to_vec(), 8443),
            (AddressType::DomainName, b"relay.internal".to_vec(), 65535),
        ];

        for (address_type, address, port) in cases {
            let mut encoded = Vec::new();
            encode_address(&mut encoded, address_type, &address, port.to_be_bytes());

            let mut conn = server_with_input(&encoded).await;
            let (decoded, decoded_port) = read_address(&mut conn, address_type).await.unwrap();
            assert_eq!(decoded, address);
            assert_eq!(u16::from_be_bytes(decoded_port), port);
        }
    }

    #[tokio::test]
    async fn test_bad_version_and_reserved_are_protocol_errors() {
        let mut conn = server_with_input(&[0x04, 0x01, 0x00, 0x01]).await;
        assert!(matches!(
            read_connection_request(&mut conn).await,
            Err(CodecError::Protocol(ProtocolError::InvalidVersion(0x04)))
        ));

        let mut conn = server_with_input(&[0x05, 0x01, 0x01, 0x01]).await;
        assert!(matches!(
            read_connection_request(&mut conn).await,
            Err(CodecError::Protocol(ProtocolError::InvalidReserved(0x01)))
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_command_and_address_type() {
        let mut conn = server_with_input(&[0x05, 0x04, 0x00, 0x01]).await;
        assert!(matches!(
            read_connection_request(&mut conn).await,
            Err(CodecError::Protocol(ProtocolError::InvalidCommand(0x04)))
        ));

        let mut conn = server_with_input(&[0x05, 0x01, 0x00, 0x02]).await;
        assert!(matches!(
            read_connection_request(&mut conn).await,
            Err(CodecError::Protocol(ProtocolError::InvalidAddressType(0x02)))
        ));
    }

    #[tokio::test]
    async fn test_truncated_ipv6_address_is_transport_error() {
        let mut input = vec![0x05, 0x01, 0x00, 0x04];
        input.extend_from_slice(&[0u8; 10]);
        let mut conn = server_with_input(&input).await;
        assert!(matches!(
            read_connection_request(&mut conn).await,
            Err(CodecError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_write_method_selection_and_reply() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut conn = BufferedConnection::new(server, 1024);

        write_method_selection(&mut conn, Method::NoAcceptable)
            .await
            .unwrap();
        let reply = ConnectionReply::succeeded("192.168.1.20:40000".parse().unwrap());
        write_connection_reply(&mut conn, &reply).await.unwrap();

        let mut buf = [0u8; 12];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..2], &[0x05, 0xFF]);
        assert_eq!(
            &buf[2..],
            &[0x05, 0x00, 0x00, 0x01, 192, 168, 1, 20, 0x9C, 0x40]
        );
    }

    #[test]
    fn test_failure_reply_layout() {
        let reply = ConnectionReply::failure(ReplyCode::CommandNotSupported);
        assert_eq!(
            reply.to_bytes(),
            vec![0x05, 0x07, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }
}
