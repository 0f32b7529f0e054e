pub mod codec;
pub mod consts;
pub mod forward;
pub mod resolver;
pub mod socks5;
pub mod tcp;

pub use tcp::TcpProxy;
