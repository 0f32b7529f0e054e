//! Mapping between raw SOCKS5 address fields and socket addresses. No I/O.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::string::FromUtf8Error;
use thiserror::Error;

use crate::proxy::consts::AddressType;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("{address_type:?} address must be {expected} bytes, got {actual}")]
    AddressLength {
        address_type: AddressType,
        expected: usize,
        actual: usize,
    },
    #[error("Empty domain name")]
    EmptyDomain,
    #[error("Domain name is not valid UTF-8: {0}")]
    InvalidDomain(#[from] FromUtf8Error),
}

/// Builds a dialable `host:port` string. IPv6 hosts are bracketed.
pub fn dial_address(
    address_type: AddressType,
    address: &[u8],
    port: [u8; 2],
) -> Result<String, ResolveError> {
    let port = u16::from_be_bytes(port);
    match address_type {
        AddressType::Ipv4 => {
            let octets: [u8; 4] = fixed_octets(address_type, address)?;
            Ok(SocketAddr::from((Ipv4Addr::from(octets), port)).to_string())
        }
        AddressType::Ipv6 => {
            let octets: [u8; 16] = fixed_octets(address_type, address)?;
            Ok(SocketAddr::from((Ipv6Addr::from(octets), port)).to_string())
        }
        AddressType::DomainName => {
            let host = String::from_utf8(address.to_vec())?;
            if host.is_empty() {
                return Err(ResolveError::EmptyDomain);
            }
            Ok(format!("{}:{}", host, port))
        }
    }
}

fn fixed_octets<const N: usize>(
    address_type: AddressType,
    address: &[u8],
) -> Result<[u8; N], ResolveError> {
    address.try_into().map_err(|_| ResolveError::AddressLength {
        address_type,
        expected: N,
        actual: address.len(),
    })
}

/// Splits a bound socket address into reply fields. IPv4-mapped IPv6
/// addresses are reported as plain IPv4.
pub fn bound_address(addr: SocketAddr) -> (AddressType, Vec<u8>, [u8; 2]) {
    let port = addr.port().to_be_bytes();
    match addr {
        SocketAddr::V4(v4) => (AddressType::Ipv4, v4.ip().octets().to_vec(), port),
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => (AddressType::Ipv4, v4.octets().to_vec(), port),
            None => (AddressType::Ipv6, v6.ip().octets().to_vec(), port),
        },
    }
}
