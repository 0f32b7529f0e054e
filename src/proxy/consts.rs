//! SOCKS5 wire constants (RFC 1928) and their enumerated forms.

use std::fmt;

pub const SOCKS5_VERSION: u8 = 0x05;
pub const RESERVED: u8 = 0x00;

/// Authentication method offered by a client or selected by the server.
///
/// Only `NoAuth` and `NoAcceptable` are ever selected; the others are
/// recognised in greetings so they can be logged by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    NoAuth,
    Gssapi,
    UsernamePassword,
    NoAcceptable,
    Other(u8),
}

impl From<u8> for Method {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Method::NoAuth,
            0x01 => Method::Gssapi,
            0x02 => Method::UsernamePassword,
            0xFF => Method::NoAcceptable,
            other => Method::Other(other),
        }
    }
}

impl From<Method> for u8 {
    fn from(method: Method) -> Self {
        match method {
            Method::NoAuth => 0x00,
            Method::Gssapi => 0x01,
            Method::UsernamePassword => 0x02,
            Method::NoAcceptable => 0xFF,
            Method::Other(other) => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Connect = 0x01,
    Bind = 0x02,
    UdpAssociate = 0x03,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Command::Connect),
            0x02 => Ok(Command::Bind),
            0x03 => Ok(Command::UdpAssociate),
            other => Err(other),
        }
    }
}

/// ATYP: how DST.ADDR / BND.ADDR is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressType {
    Ipv4 = 0x01,
    DomainName = 0x03,
    Ipv6 = 0x04,
}

impl AddressType {
    /// Fixed address width in bytes, `None` for the length-prefixed domain form.
    pub fn fixed_len(self) -> Option<usize> {
        match self {
            AddressType::Ipv4 => Some(4),
            AddressType::Ipv6 => Some(16),
            AddressType::DomainName => None,
        }
    }
}

impl TryFrom<u8> for AddressType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(AddressType::Ipv4),
            0x03 => Ok(AddressType::DomainName),
            0x04 => Ok(AddressType::Ipv6),
            other => Err(other),
        }
    }
}

// RFC 1928 §6
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    // No ruleset is configured, so nothing emits this code.
    #[allow(dead_code)]
    NotAllowedByRuleset = 0x02,
    NetworkUnreachable = 0x03,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    TtlExpired = 0x06,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ReplyCode::Succeeded => "succeeded",
            ReplyCode::GeneralFailure => "general SOCKS server failure",
            ReplyCode::NotAllowedByRuleset => "connection not allowed by ruleset",
            ReplyCode::NetworkUnreachable => "network unreachable",
            ReplyCode::HostUnreachable => "host unreachable",
            ReplyCode::ConnectionRefused => "connection refused",
            ReplyCode::TtlExpired => "TTL expired",
            ReplyCode::CommandNotSupported => "command not supported",
            ReplyCode::AddressTypeNotSupported => "address type not supported",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_byte_mapping() {
        for byte in 0..=u8::MAX {
            assert_eq!(u8::from(Method::from(byte)), byte);
        }
        assert_eq!(Method::from(0x00), Method::NoAuth);
        assert_eq!(Method::from(0x02), Method::UsernamePassword);
        assert_eq!(Method::from(0x80), Method::Other(0x80));
    }

    #[test]
    fn test_command_range() {
        assert_eq!(Command::try_from(0x01), Ok(Command::Connect));
        assert_eq!(Command::try_from(0x03), Ok(Command::UdpAssociate));
        assert_eq!(Command::try_from(0x00), Err(0x00));
        assert_eq!(Command::try_from(0x04), Err(0x04));
    }

    #[test]
    fn test_address_type_rejects_unknown_tags() {
        assert_eq!(AddressType::try_from(0x02), Err(0x02));
        assert_eq!(AddressType::try_from(0x05), Err(0x05));
        assert_eq!(AddressType::Ipv4.fixed_len(), Some(4));
        assert_eq!(AddressType::Ipv6.fixed_len(), Some(16));
        assert_eq!(AddressType::DomainName.fixed_len(), None);
    }
}
