//! UDP socket construction
//!
//! The signaling layer owns endpoint negotiation; this helper only
//! builds a tuned socket suitable for the 20 ms voice cadence: enlarged
//! kernel buffers and a short read timeout so the receive loop can
//! observe shutdown requests.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::error::NetworkError;

/// Kernel send/receive buffer size
const SOCKET_BUFFER_SIZE: usize = 1 << 20;

/// Create a UDP socket bound to `bind_addr`
pub fn create_socket(
    bind_addr: SocketAddr,
    read_timeout: Duration,
) -> Result<UdpSocket, NetworkError> {
    let socket = Socket::new(
        Domain::for_address(bind_addr),
        Type::DGRAM,
        Some(Protocol::UDP),
    )
    .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .set_recv_buffer_size(SOCKET_BUFFER_SIZE)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .set_send_buffer_size(SOCKET_BUFFER_SIZE)
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .set_read_timeout(Some(read_timeout))
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    socket
        .bind(&bind_addr.into())
        .map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    Ok(socket.into())
}
