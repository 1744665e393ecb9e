//! Mode-change command (§4.10): a one-shot, out-of-band request/acknowledgement exchange that
//! asks a single radar to switch to a new operating mode.
//!
//! Grounded directly on `src/core.c`'s `provizio_set_radar_mode`: broadcast-address
//! auto-detection by substring match, a 0.25s per-attempt timeout, up to 5 retries (6 total
//! attempts), and stale-acknowledgement rejection by `(mount, mode)` mismatch.

use std::net::{SocketAddrV4, UdpSocket};
use std::time::Duration;

use crate::error::{from_ack_error_code, RadarApiError, Result};
use crate::packet::{
    ProtocolHeader, SetModeAck, SetModeRequest, EGO_MOTION_OR_SET_MODE_PACKET_TYPE,
    MODE_PROTOCOL_VERSION, SET_MODE_ACK_SIZE,
};
use crate::position::{MountPosition, RadarMode};
use crate::transport;

const BROADCAST_IPV4_ADDRESS: &str = "255.255.255.255";
const RECV_TIMEOUT: Duration = Duration::from_millis(250);
const MAX_RECV_TRIES: u32 = 5;

/// Sends a set-mode request to `ipv4_address` (or the broadcast address if `None`) and waits for
/// a matching acknowledgement, retrying up to [`MAX_RECV_TRIES`] times.
///
/// `mount` must not be [`MountPosition::Unknown`] — that value is reserved on the wire for "any
/// mount", accepted only from the radar's acknowledgement, never sent as a request target.
pub fn set_radar_mode(
    mount: MountPosition,
    mode: RadarMode,
    udp_port: u16,
    ipv4_address: Option<&str>,
) -> Result<()> {
    if mount.is_unknown() {
        return Err(RadarApiError::Argument(
            "mount position must be a specific radar, not Unknown".into(),
        ));
    }
    if matches!(mode, RadarMode::Unknown) {
        return Err(RadarApiError::Argument(
            "provizio_radar_mode_unknown is not a valid mode option".into(),
        ));
    }

    let target_address = ipv4_address.unwrap_or(BROADCAST_IPV4_ADDRESS);
    let enable_broadcast = ipv4_address.is_none() || target_address.contains("255");
    let port = if udp_port != 0 {
        udp_port
    } else {
        transport::DEFAULT_SET_MODE_PORT
    };

    let target: SocketAddrV4 = format!("{target_address}:{port}")
        .parse()
        .map_err(|_| RadarApiError::Argument(format!("invalid IPv4 address: {target_address}")))?;

    let socket = transport::open_command_socket(enable_broadcast, RECV_TIMEOUT.as_nanos() as u64)?;

    let request = SetModeRequest {
        protocol_header: ProtocolHeader {
            packet_type: EGO_MOTION_OR_SET_MODE_PACKET_TYPE,
            protocol_version: MODE_PROTOCOL_VERSION,
        },
        mount_position_id: mount.to_wire(),
        requested_mode: mode.to_wire(),
    };

    let mut recv_tries = MAX_RECV_TRIES + 1;
    loop {
        match try_once(&socket, &request, target, mount, mode) {
            Ok(()) => return Ok(()),
            Err(RadarApiError::Timeout) => {
                recv_tries -= 1;
                if recv_tries == 0 {
                    crate::diagnostics::error(
                        "set_radar_mode: no acknowledgement received, likely due to a connection issue",
                    );
                    return Err(RadarApiError::Timeout);
                }
            }
            Err(other) => {
                crate::diagnostics::error("set_radar_mode: failed to set the requested mode");
                return Err(other);
            }
        }
    }
}

/// Sends the request once and waits for one acknowledgement, returning `Timeout` for both "no
/// datagram arrived" and "a stale acknowledgement arrived" so the retry loop treats them alike.
fn try_once(
    socket: &UdpSocket,
    request: &SetModeRequest,
    target: SocketAddrV4,
    mount: MountPosition,
    mode: RadarMode,
) -> Result<()> {
    let mut buf = [0u8; crate::packet::SET_MODE_REQUEST_SIZE];
    request.encode(&mut buf);
    socket.send_to(&buf, target)?;

    let mut recv_buf = [0u8; SET_MODE_ACK_SIZE];
    let received = match socket.recv(&mut recv_buf) {
        Ok(n) => n,
        Err(e)
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut =>
        {
            return Err(RadarApiError::Timeout)
        }
        Err(e) => return Err(RadarApiError::Io(e)),
    };

    if received != SET_MODE_ACK_SIZE {
        return Err(RadarApiError::Timeout);
    }

    let ack = SetModeAck::decode(&recv_buf);
    if ack.protocol_header.packet_type != EGO_MOTION_OR_SET_MODE_PACKET_TYPE {
        return Err(RadarApiError::Protocol(
            "invalid acknowledgement packet type received".into(),
        ));
    }
    if ack.protocol_header.protocol_version != MODE_PROTOCOL_VERSION {
        return Err(RadarApiError::Protocol("incompatible protocol version".into()));
    }

    let ack_mount = MountPosition::from_wire(ack.mount_position_id);
    let ack_mode = RadarMode::from_wire(ack.requested_mode);
    if (!mount.is_unknown() && ack_mount != mount) || ack_mode != mode {
        // A correct acknowledgement, but for a previous request: keep waiting.
        return Err(RadarApiError::Timeout);
    }

    if ack.error_code == 0 {
        Ok(())
    } else {
        Err(from_ack_error_code(ack.error_code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::thread;

    fn encode_ack(mount: MountPosition, mode: RadarMode, error_code: i32) -> [u8; SET_MODE_ACK_SIZE] {
        let ack = SetModeAck {
            protocol_header: ProtocolHeader {
                packet_type: EGO_MOTION_OR_SET_MODE_PACKET_TYPE,
                protocol_version: MODE_PROTOCOL_VERSION,
            },
            mount_position_id: mount.to_wire(),
            requested_mode: mode.to_wire(),
            error_code,
        };
        let mut buf = [0u8; SET_MODE_ACK_SIZE];
        ack.encode(&mut buf);
        buf
    }

    #[test]
    fn successful_exchange_returns_ok() {
        let radar = UdpSocket::bind("127.0.0.1:0").unwrap();
        let radar_addr = radar.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (_, from) = radar.recv_from(&mut buf).unwrap();
            let ack = encode_ack(MountPosition::FrontLeft, RadarMode::LongRange, 0);
            radar.send_to(&ack, from).unwrap();
        });

        let result = set_radar_mode(
            MountPosition::FrontLeft,
            RadarMode::LongRange,
            radar_addr.port(),
            Some("127.0.0.1"),
        );
        handle.join().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn stale_ack_is_ignored_until_the_matching_one_arrives() {
        let radar = UdpSocket::bind("127.0.0.1:0").unwrap();
        let radar_addr = radar.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (_, from) = radar.recv_from(&mut buf).unwrap();
            let stale = encode_ack(MountPosition::FrontLeft, RadarMode::ShortRange, 0);
            radar.send_to(&stale, from).unwrap();

            let (_, from) = radar.recv_from(&mut buf).unwrap();
            let fresh = encode_ack(MountPosition::FrontLeft, RadarMode::LongRange, 0);
            radar.send_to(&fresh, from).unwrap();
        });

        let result = set_radar_mode(
            MountPosition::FrontLeft,
            RadarMode::LongRange,
            radar_addr.port(),
            Some("127.0.0.1"),
        );
        handle.join().unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn ack_with_nonzero_error_code_surfaces_as_not_permitted() {
        let radar = UdpSocket::bind("127.0.0.1:0").unwrap();
        let radar_addr = radar.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (_, from) = radar.recv_from(&mut buf).unwrap();
            let ack = encode_ack(MountPosition::FrontLeft, RadarMode::LongRange, 1);
            radar.send_to(&ack, from).unwrap();
        });

        let err = set_radar_mode(
            MountPosition::FrontLeft,
            RadarMode::LongRange,
            radar_addr.port(),
            Some("127.0.0.1"),
        )
        .unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, RadarApiError::NotPermitted(_)));
    }

    #[test]
    fn rejects_unknown_mount_as_a_request_target() {
        let err = set_radar_mode(MountPosition::Unknown, RadarMode::LongRange, 0, Some("127.0.0.1"))
            .unwrap_err();
        assert!(matches!(err, RadarApiError::Argument(_)));
    }

    #[test]
    fn rejects_unknown_mode() {
        let err = set_radar_mode(MountPosition::FrontLeft, RadarMode::Unknown, 0, Some("127.0.0.1"))
            .unwrap_err();
        assert!(matches!(err, RadarApiError::Argument(_)));
    }
}
