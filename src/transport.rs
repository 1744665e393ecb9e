//! Default UDP transport (ambient component 16): opens a socket, relays one datagram at a time
//! to the receive loop, and closes itself on drop.
//!
//! Grounded on `include/provizio/socket.h`'s contract (`provizio_socket_set_recv_timeout`,
//! broadcast/address-reuse) and `src/core.c`'s `provizio_open_radars_connection` /
//! `provizio_radar_api_receive_packet` / `provizio_close_radars_connection`, expressed as an
//! idiomatic RAII wrapper the way the teacher's `Device`/`HidTransport` wrap their USB/HID
//! handles — `Drop` replaces the explicit close call on every exit path.

use std::net::UdpSocket;
use std::time::Duration;

use crate::config::ReceiveConfig;
use crate::error::{RadarApiError, Result};
use crate::packet::MAX_PAYLOAD_BYTES;

/// Default port radars broadcast point-cloud and ego-motion data to.
pub const DEFAULT_RECEIVE_PORT: u16 = 7769;
/// Default port the set-mode request/acknowledgement exchange uses.
pub const DEFAULT_SET_MODE_PORT: u16 = 7770;

/// An opened, receive-ready UDP socket.
///
/// Closing is implicit: dropping the value closes the underlying socket, so every exit path
/// (including an early return via `?`) releases it exactly once.
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Opens a socket bound to `0.0.0.0:<config.port or DEFAULT_RECEIVE_PORT>`, with broadcast
    /// and address/port reuse enabled and the configured receive timeout applied.
    ///
    /// If `config.probe_first` is set, one packet is read (and discarded by the caller via
    /// [`UdpTransport::recv`] immediately after) to fail fast with [`RadarApiError::Timeout`] when
    /// nothing is reachable yet.
    pub fn open(config: &ReceiveConfig) -> Result<Self> {
        let port = if config.port != 0 {
            config.port
        } else {
            DEFAULT_RECEIVE_PORT
        };

        let socket = UdpSocket::bind(("0.0.0.0", port))?;
        socket.set_broadcast(true)?;
        set_recv_timeout_ns(&socket, config.recv_timeout_ns)?;

        let transport = Self { socket };

        if config.probe_first {
            let mut probe = [0u8; MAX_PAYLOAD_BYTES];
            transport.socket.peek(&mut probe).map_err(|e| {
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut
                {
                    RadarApiError::Timeout
                } else {
                    RadarApiError::Io(e)
                }
            })?;
        }

        Ok(transport)
    }

    /// Blocks for up to the configured receive timeout and returns the bytes of one datagram.
    pub fn recv(&self) -> Result<Vec<u8>> {
        let mut buf = [0u8; MAX_PAYLOAD_BYTES];
        match self.socket.recv(&mut buf) {
            Ok(received) => Ok(buf[..received].to_vec()),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                Err(RadarApiError::Timeout)
            }
            Err(e) => Err(RadarApiError::Io(e)),
        }
    }
}

/// Converts a nanosecond timeout (0 ⇒ blocking) into the `Option<Duration>` `std::net::UdpSocket`
/// expects.
fn set_recv_timeout_ns(socket: &UdpSocket, timeout_ns: u64) -> Result<()> {
    let timeout = if timeout_ns == 0 {
        None
    } else {
        Some(Duration::from_nanos(timeout_ns))
    };
    socket.set_read_timeout(timeout)?;
    Ok(())
}

/// Opens a short-lived, non-broadcast-by-default socket for a single request/acknowledgement
/// exchange (used by [`crate::mode_command`]). Broadcasting is enabled only when the target
/// address needs it.
pub(crate) fn open_command_socket(enable_broadcast: bool, recv_timeout_ns: u64) -> Result<UdpSocket> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    if enable_broadcast {
        socket.set_broadcast(true)?;
    }
    set_recv_timeout_ns(&socket, recv_timeout_ns)?;
    Ok(socket)
}
