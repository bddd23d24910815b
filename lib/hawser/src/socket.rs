use crate::shared::NetworkResult;
use mio::net::TcpStream;
use std::net::SocketAddr;

/// Opens a non-blocking stream toward the relay for either address family. The connect is
/// expected to still be in flight when this returns; the caller discovers completion by
/// draining the stashed handshake packet.
#[inline]
pub fn connect(address: &SocketAddr) -> NetworkResult<TcpStream> {
    TcpStream::connect(address).map_err(Into::into)
}
