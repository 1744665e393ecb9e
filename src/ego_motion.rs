//! Ego-motion packet handling (§4.3): decodes a single ego-motion datagram and folds it into an
//! [`EgoMotionContext`]'s latest snapshot.
//!
//! Grounded directly on `radar_ego_motion.c`'s `provizio_handle_radar_ego_motion_packet_checked`
//! and `provizio_get_ego_motion`, a complete (non-stub) reference implementation: bind-or-skip on
//! mount mismatch, overwrite-if-newer-or-equal frame index, wraparound recovery.

use crate::context::{EgoMotion, EgoMotionContext};
use crate::error::{RadarApiError, Result};
use crate::packet::{
    self, EgoMotionPacket, EGO_MOTION_OR_SET_MODE_PACKET_TYPE, EGO_MOTION_PACKET_SIZE,
    EGO_MOTION_PROTOCOL_VERSION, PROTOCOL_HEADER_SIZE,
};
use crate::position::MountPosition;
use crate::router;

const WRAPAROUND_LOW: u32 = 0x0000_ffff;
const WRAPAROUND_HIGH: u32 = 0xffff_0000;

/// Checks an ego-motion packet's header in isolation (§4.3). Note the lowercase "incompatible"
/// here, unlike the point-cloud reassembler's capitalized wording — both strings are preserved
/// verbatim from the reference implementation.
pub fn check_packet(bytes: &[u8]) -> Result<EgoMotionPacket> {
    if bytes.len() < PROTOCOL_HEADER_SIZE {
        return Err(RadarApiError::Protocol("insufficient packet_size".into()));
    }

    let protocol_header = packet::ProtocolHeader::decode(bytes);
    if protocol_header.packet_type != EGO_MOTION_OR_SET_MODE_PACKET_TYPE {
        return Err(RadarApiError::Protocol("unexpected packet_type".into()));
    }
    if protocol_header.protocol_version > EGO_MOTION_PROTOCOL_VERSION {
        return Err(RadarApiError::Protocol(
            "incompatible protocol version".into(),
        ));
    }
    if bytes.len() != EGO_MOTION_PACKET_SIZE {
        return Err(RadarApiError::Protocol("incorrect packet_size".into()));
    }

    let packet = EgoMotionPacket::decode(bytes);
    if MountPosition::from_wire(packet.mount_position_id).is_unknown() {
        return Err(RadarApiError::Protocol(
            "the value of radar_position_id can't be provizio_radar_position_unknown".into(),
        ));
    }

    Ok(packet)
}

/// Folds an already-validated packet into `context`'s latest snapshot (§4.3): binds the context
/// to the packet's mount on first use, skips packets from a different mount once bound, and only
/// overwrites the stored snapshot when the incoming frame index is newer (wraparound-aware).
pub fn handle_packet_checked(context: &mut EgoMotionContext, packet: &EgoMotionPacket) -> Result<()> {
    let mount = MountPosition::from_wire(packet.mount_position_id);

    if context.mount_position().is_unknown() {
        context.assign(mount)?;
    } else if context.mount_position() != mount {
        return Err(RadarApiError::Skipped);
    }

    let wrapped =
        packet.frame_index < WRAPAROUND_LOW && context.latest.frame_index > WRAPAROUND_HIGH;
    let is_newer = wrapped || packet.frame_index > context.latest.frame_index;

    if is_newer {
        context.latest.frame_index = packet.frame_index;
    }
    context.latest.timestamp = packet.timestamp;
    context.latest.mount_position = packet.mount_position_id;
    context.latest.vs_x = packet.vs_x;
    context.latest.vs_y = packet.vs_y;

    if let Some(callback) = context.callback.as_mut() {
        let snapshot: EgoMotion = context.latest;
        callback(&snapshot);
    }

    Ok(())
}

pub fn handle_packet(context: &mut EgoMotionContext, bytes: &[u8]) -> Result<()> {
    let packet = check_packet(bytes)?;
    handle_packet_checked(context, &packet)
}

/// Routes a possible ego-motion packet to the matching (or first free) context. A mismatched
/// packet type is reported as [`RadarApiError::Skipped`], since the datagram might legitimately be
/// a set-mode acknowledgement sharing the same packet type.
///
/// A single-context array is dispatched straight to that context rather than through the router,
/// mirroring the point-cloud side's `num_contexts == 1` special case (see
/// [`crate::point_cloud::handle_possible_fragment`]).
pub fn handle_possible_packet(contexts: &mut [EgoMotionContext], bytes: &[u8]) -> Result<()> {
    if bytes.len() < PROTOCOL_HEADER_SIZE {
        return Err(RadarApiError::Skipped);
    }
    if packet::ProtocolHeader::decode(bytes).packet_type != EGO_MOTION_OR_SET_MODE_PACKET_TYPE {
        return Err(RadarApiError::Skipped);
    }
    if bytes.len() != EGO_MOTION_PACKET_SIZE {
        return Err(RadarApiError::Skipped);
    }

    let packet = check_packet(bytes)?;

    if let [context] = contexts {
        return handle_packet_checked(context, &packet);
    }

    let mount = MountPosition::from_wire(packet.mount_position_id);
    let context = router::route_ego_motion(contexts, mount)?;
    handle_packet_checked(context, &packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::ProtocolHeader;

    fn encode(frame_index: u32, mount: u16, vs_x: f32, vs_y: f32) -> Vec<u8> {
        let packet = EgoMotionPacket {
            protocol_header: ProtocolHeader {
                packet_type: EGO_MOTION_OR_SET_MODE_PACKET_TYPE,
                protocol_version: EGO_MOTION_PROTOCOL_VERSION,
            },
            frame_index,
            timestamp: 42,
            mount_position_id: mount,
            vs_x,
            vs_y,
        };
        let mut buf = vec![0u8; EGO_MOTION_PACKET_SIZE];
        packet.encode(&mut buf);
        buf
    }

    #[test]
    fn binds_on_first_packet() {
        let mut context = EgoMotionContext::new();
        let bytes = encode(1, MountPosition::FrontLeft.to_wire(), 1.0, 2.0);
        handle_packet(&mut context, &bytes).unwrap();
        assert_eq!(context.mount_position(), MountPosition::FrontLeft);
        assert_eq!(context.latest.vs_x, 1.0);
    }

    #[test]
    fn packet_from_different_mount_is_skipped_once_bound() {
        let mut context = EgoMotionContext::new();
        context.assign(MountPosition::FrontLeft).unwrap();
        let bytes = encode(1, MountPosition::RearRight.to_wire(), 1.0, 2.0);
        let err = handle_packet(&mut context, &bytes).unwrap_err();
        assert!(matches!(err, RadarApiError::Skipped));
    }

    #[test]
    fn older_frame_index_still_updates_fields_but_not_the_index() {
        let mut context = EgoMotionContext::new();
        context.assign(MountPosition::FrontLeft).unwrap();
        let newer = encode(10, MountPosition::FrontLeft.to_wire(), 1.0, 1.0);
        handle_packet(&mut context, &newer).unwrap();

        let older = encode(3, MountPosition::FrontLeft.to_wire(), 5.0, 5.0);
        handle_packet(&mut context, &older).unwrap();

        assert_eq!(context.latest.frame_index, 10);
        assert_eq!(context.latest.vs_x, 5.0);
    }

    #[test]
    fn wraparound_frame_index_is_treated_as_newer() {
        let mut context = EgoMotionContext::new();
        context.assign(MountPosition::FrontLeft).unwrap();
        context.latest.frame_index = 0xffff_fff0;

        let wrapped = encode(10, MountPosition::FrontLeft.to_wire(), 0.0, 0.0);
        handle_packet(&mut context, &wrapped).unwrap();
        assert_eq!(context.latest.frame_index, 10);
    }

    #[test]
    fn incorrect_packet_size_is_protocol_error() {
        let mut tampered = vec![0u8; EGO_MOTION_PACKET_SIZE - 1];
        crate::wire::set_u16(&mut tampered, 0, EGO_MOTION_OR_SET_MODE_PACKET_TYPE);
        crate::wire::set_u16(&mut tampered, 2, EGO_MOTION_PROTOCOL_VERSION);
        let err = check_packet(&tampered).unwrap_err();
        assert!(matches!(err, RadarApiError::Protocol(ref m) if m == "incorrect packet_size"));
    }
}
