//! Packed wire-struct layouts with stable byte offsets (§6.1).
//!
//! Every decode function reads explicit byte offsets through [`crate::wire`]; nothing is ever
//! exposed as an in-memory struct cast from the raw bytes, so there is no reliance on the host's
//! struct layout or alignment.

use crate::wire;

/// Ethernet MTU in bytes.
pub const MTU: usize = 1500;
/// Maximum UDP payload after IP (20) + UDP (8) headers.
pub const MAX_PAYLOAD_BYTES: usize = MTU - 28;

pub const POINT_CLOUD_PACKET_TYPE: u16 = 1;
/// Shared by ego-motion data-plane packets and set-mode control-plane packets;
/// disambiguated by payload size (see §9 of SPEC_FULL.md).
pub const EGO_MOTION_OR_SET_MODE_PACKET_TYPE: u16 = 2;

pub const POINT_CLOUD_PROTOCOL_VERSION: u16 = 2;
pub const EGO_MOTION_PROTOCOL_VERSION: u16 = 1;
pub const MODE_PROTOCOL_VERSION: u16 = 1;

pub const PROTOCOL_HEADER_SIZE: usize = 4;
pub const POINT_CLOUD_HEADER_SIZE: usize = 24;
pub const POINT_RECORD_SIZE_V1: usize = 20;
pub const POINT_RECORD_SIZE_V2: usize = 24;

/// Max points that fit in a single UDP fragment, sized against the v2 (24-byte) record, matching
/// the reference implementation's `PROVIZIO__MAX_RADAR_POINTS_PER_UDP_PACKET`.
pub const MAX_POINTS_PER_UDP_PACKET: usize =
    (MAX_PAYLOAD_BYTES - POINT_CLOUD_HEADER_SIZE) / POINT_RECORD_SIZE_V2;

/// Max points that fit in a single UDP fragment under protocol v1 (20-byte record).
pub const MAX_POINTS_PER_UDP_PACKET_V1: usize =
    (MAX_PAYLOAD_BYTES - POINT_CLOUD_HEADER_SIZE) / POINT_RECORD_SIZE_V1;

/// Max points in a fully reassembled cloud.
pub const MAX_POINTS_IN_POINT_CLOUD: usize = 0xffff;

pub const EGO_MOTION_PACKET_SIZE: usize = 28;
pub const SET_MODE_REQUEST_SIZE: usize = 8;
pub const SET_MODE_ACK_SIZE: usize = 12;

/// The 4-byte dispatch key at the start of every datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolHeader {
    pub packet_type: u16,
    pub protocol_version: u16,
}

impl ProtocolHeader {
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            packet_type: wire::get_u16(buf, 0),
            protocol_version: wire::get_u16(buf, 2),
        }
    }
}

/// One radar return.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Forward, radar relative, meters.
    pub x_meters: f32,
    /// Left, radar relative, meters.
    pub y_meters: f32,
    /// Up, radar relative, meters.
    pub z_meters: f32,
    /// Forward, radar relative, m/s.
    pub radar_relative_radial_velocity_m_s: f32,
    pub signal_to_noise_ratio: f32,
    /// Ground-relative projection on the radar-forward axis; NaN if unavailable (v1 packets).
    pub ground_relative_radial_velocity_m_s: f32,
}

impl Point {
    pub fn decode_v1(buf: &[u8]) -> Self {
        Self {
            x_meters: wire::get_f32(buf, 0),
            y_meters: wire::get_f32(buf, 4),
            z_meters: wire::get_f32(buf, 8),
            radar_relative_radial_velocity_m_s: wire::get_f32(buf, 12),
            signal_to_noise_ratio: wire::get_f32(buf, 16),
            ground_relative_radial_velocity_m_s: f32::NAN,
        }
    }

    pub fn decode_v2(buf: &[u8]) -> Self {
        Self {
            x_meters: wire::get_f32(buf, 0),
            y_meters: wire::get_f32(buf, 4),
            z_meters: wire::get_f32(buf, 8),
            radar_relative_radial_velocity_m_s: wire::get_f32(buf, 12),
            signal_to_noise_ratio: wire::get_f32(buf, 16),
            ground_relative_radial_velocity_m_s: wire::get_f32(buf, 20),
        }
    }

    pub fn encode_v2(&self, buf: &mut [u8]) {
        wire::set_f32(buf, 0, self.x_meters);
        wire::set_f32(buf, 4, self.y_meters);
        wire::set_f32(buf, 8, self.z_meters);
        wire::set_f32(buf, 12, self.radar_relative_radial_velocity_m_s);
        wire::set_f32(buf, 16, self.signal_to_noise_ratio);
        wire::set_f32(buf, 20, self.ground_relative_radial_velocity_m_s);
    }

    pub fn encode_v1(&self, buf: &mut [u8]) {
        wire::set_f32(buf, 0, self.x_meters);
        wire::set_f32(buf, 4, self.y_meters);
        wire::set_f32(buf, 8, self.z_meters);
        wire::set_f32(buf, 12, self.radar_relative_radial_velocity_m_s);
        wire::set_f32(buf, 16, self.signal_to_noise_ratio);
    }
}

/// Header of a point-cloud fragment (24 bytes on the wire, offsets per §6.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointCloudFragmentHeader {
    pub protocol_header: ProtocolHeader,
    pub frame_index: u32,
    pub timestamp: u64,
    pub mount_position_id: u16,
    pub total_points_in_frame: u16,
    pub num_points_in_packet: u16,
    pub radar_range: u16,
}

impl PointCloudFragmentHeader {
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            protocol_header: ProtocolHeader::decode(buf),
            frame_index: wire::get_u32(buf, 4),
            timestamp: wire::get_u64(buf, 8),
            mount_position_id: wire::get_u16(buf, 16),
            total_points_in_frame: wire::get_u16(buf, 18),
            num_points_in_packet: wire::get_u16(buf, 20),
            radar_range: wire::get_u16(buf, 22),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        wire::set_u16(buf, 0, self.protocol_header.packet_type);
        wire::set_u16(buf, 2, self.protocol_header.protocol_version);
        wire::set_u32(buf, 4, self.frame_index);
        wire::set_u64(buf, 8, self.timestamp);
        wire::set_u16(buf, 16, self.mount_position_id);
        wire::set_u16(buf, 18, self.total_points_in_frame);
        wire::set_u16(buf, 20, self.num_points_in_packet);
        wire::set_u16(buf, 22, self.radar_range);
    }
}

/// Decoded ego-motion packet (28 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EgoMotionPacket {
    pub protocol_header: ProtocolHeader,
    pub frame_index: u32,
    pub timestamp: u64,
    pub mount_position_id: u16,
    pub vs_x: f32,
    pub vs_y: f32,
}

impl EgoMotionPacket {
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            protocol_header: ProtocolHeader::decode(buf),
            frame_index: wire::get_u32(buf, 4),
            timestamp: wire::get_u64(buf, 8),
            mount_position_id: wire::get_u16(buf, 16),
            // offset 18..20 is a reserved field, intentionally not decoded
            vs_x: wire::get_f32(buf, 20),
            vs_y: wire::get_f32(buf, 24),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        wire::set_u16(buf, 0, self.protocol_header.packet_type);
        wire::set_u16(buf, 2, self.protocol_header.protocol_version);
        wire::set_u32(buf, 4, self.frame_index);
        wire::set_u64(buf, 8, self.timestamp);
        wire::set_u16(buf, 16, self.mount_position_id);
        wire::set_u16(buf, 18, 0);
        wire::set_f32(buf, 20, self.vs_x);
        wire::set_f32(buf, 24, self.vs_y);
    }
}

/// Set-mode request (8 bytes).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetModeRequest {
    pub protocol_header: ProtocolHeader,
    pub mount_position_id: u16,
    pub requested_mode: u16,
}

impl SetModeRequest {
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            protocol_header: ProtocolHeader::decode(buf),
            mount_position_id: wire::get_u16(buf, 4),
            requested_mode: wire::get_u16(buf, 6),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        wire::set_u16(buf, 0, self.protocol_header.packet_type);
        wire::set_u16(buf, 2, self.protocol_header.protocol_version);
        wire::set_u16(buf, 4, self.mount_position_id);
        wire::set_u16(buf, 6, self.requested_mode);
    }
}

/// Set-mode acknowledgement (12 bytes): request fields plus a trailing error code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetModeAck {
    pub protocol_header: ProtocolHeader,
    pub mount_position_id: u16,
    pub requested_mode: u16,
    pub error_code: i32,
}

impl SetModeAck {
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            protocol_header: ProtocolHeader::decode(buf),
            mount_position_id: wire::get_u16(buf, 4),
            requested_mode: wire::get_u16(buf, 6),
            error_code: wire::get_i32(buf, 8),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        wire::set_u16(buf, 0, self.protocol_header.packet_type);
        wire::set_u16(buf, 2, self.protocol_header.protocol_version);
        wire::set_u16(buf, 4, self.mount_position_id);
        wire::set_u16(buf, 6, self.requested_mode);
        wire::set_i32(buf, 8, self.error_code);
    }
}

/// Record size (bytes) for a given protocol version: v1 lacks the trailing `v_ground` field.
pub fn point_record_size(protocol_version: u16) -> usize {
    if protocol_version == 1 {
        POINT_RECORD_SIZE_V1
    } else {
        POINT_RECORD_SIZE_V2
    }
}

/// Size of a point-cloud fragment given its header's declared point count and protocol version,
/// or `None` if the declared count exceeds [`MAX_POINTS_PER_UDP_PACKET`].
pub fn point_cloud_packet_size(header: &PointCloudFragmentHeader) -> Option<usize> {
    let num_points = header.num_points_in_packet as usize;
    if num_points > MAX_POINTS_PER_UDP_PACKET {
        crate::diagnostics::warn(
            "point_cloud_packet_size: num_points_in_packet exceeds MAX_POINTS_PER_UDP_PACKET",
        );
        return None;
    }
    let record_size = point_record_size(header.protocol_header.protocol_version);
    Some(POINT_CLOUD_HEADER_SIZE + num_points * record_size)
}
