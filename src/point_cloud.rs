//! Point-cloud fragment reassembly (§4.2): validates a single UDP fragment, folds it into the
//! two-slot in-flight state of a [`PointCloudContext`], and emits a [`Cloud`] once a frame is
//! complete or is about to be evicted by a newer one.
//!
//! Grounded on `radar_point_cloud.h` for the wire contract and on
//! `test/c_99/src/test_radar_point_cloud.c` for the exact validation order, error strings, and
//! consistency-mismatch warnings — the reference `radar_point_cloud.c` itself ships only stubs, so
//! the test fixtures are the authoritative behavioral source here.

use crate::context::{Cloud, PointCloudContext};
use crate::diagnostics;
use crate::error::{RadarApiError, Result};
use crate::packet::{
    self, Point, PointCloudFragmentHeader, POINT_CLOUD_HEADER_SIZE, POINT_CLOUD_PACKET_TYPE,
    POINT_CLOUD_PROTOCOL_VERSION, PROTOCOL_HEADER_SIZE,
};
use crate::position::MountPosition;
use crate::router;

/// Wraparound detection thresholds (§3): an incoming frame index this far below the latest
/// known one is assumed to have wrapped around `u32::MAX`, not gone backwards.
const WRAPAROUND_LOW: u32 = 0x0000_ffff;
const WRAPAROUND_HIGH: u32 = 0xffff_0000;

/// Checks a point-cloud fragment's header in isolation, independent of any context (§4.2 steps
/// 1-7). Mirrors `provizio_check_radar_point_cloud_packet`'s validation order and wording exactly.
pub fn check_fragment(bytes: &[u8]) -> Result<PointCloudFragmentHeader> {
    if bytes.len() < PROTOCOL_HEADER_SIZE {
        return Err(RadarApiError::Protocol("insufficient packet_size".into()));
    }

    let protocol_header = packet::ProtocolHeader::decode(bytes);
    if protocol_header.packet_type != POINT_CLOUD_PACKET_TYPE {
        return Err(RadarApiError::Protocol("unexpected packet_type".into()));
    }
    if protocol_header.protocol_version > POINT_CLOUD_PROTOCOL_VERSION {
        return Err(RadarApiError::Protocol(
            "incompatible protocol version".into(),
        ));
    }

    if bytes.len() < POINT_CLOUD_HEADER_SIZE {
        return Err(RadarApiError::Protocol("insufficient packet_size".into()));
    }
    let header = PointCloudFragmentHeader::decode(bytes);

    let expected_size = packet::point_cloud_packet_size(&header)
        .ok_or_else(|| RadarApiError::Protocol("num_points_in_packet exceeds max".into()))?;
    if bytes.len() != expected_size {
        return Err(RadarApiError::Protocol("incorrect packet_size".into()));
    }

    if MountPosition::from_wire(header.mount_position_id).is_unknown() {
        return Err(RadarApiError::Protocol(
            "the value of radar_position_id can't be provizio_radar_position_unknown".into(),
        ));
    }

    Ok(header)
}

fn decode_points(header: &PointCloudFragmentHeader, bytes: &[u8]) -> Vec<Point> {
    let record_size = packet::point_record_size(header.protocol_header.protocol_version);
    let decode_one: fn(&[u8]) -> Point = if header.protocol_header.protocol_version == 1 {
        Point::decode_v1
    } else {
        Point::decode_v2
    };

    (0..header.num_points_in_packet as usize)
        .map(|i| {
            let start = POINT_CLOUD_HEADER_SIZE + i * record_size;
            decode_one(&bytes[start..start + record_size])
        })
        .collect()
}

/// Folds one already-validated fragment into `context`'s in-flight slots (§4.2 steps 8-9 plus the
/// two-slot eviction/completion policy). Fires the context's callback for any cloud displaced out
/// of the two in-flight slots, whether complete or not, and for a cloud completed in place.
pub fn handle_fragment_checked(
    context: &mut PointCloudContext,
    header: &PointCloudFragmentHeader,
    bytes: &[u8],
) -> Result<()> {
    if header.total_points_in_frame == 0 {
        return Err(RadarApiError::Skipped);
    }

    let mount = MountPosition::from_wire(header.mount_position_id);
    if context.mount_position.is_unknown() {
        context.mount_position = mount;
    } else if context.mount_position != mount {
        return Err(RadarApiError::Skipped);
    }

    let wrapped = header.frame_index < WRAPAROUND_LOW && context.latest_frame_index > WRAPAROUND_HIGH;
    if !wrapped && header.frame_index <= context.latest_frame_index {
        let already_seen = context
            .slots
            .iter()
            .any(|slot| slot.as_ref().is_some_and(|c| c.frame_index == header.frame_index));
        if !already_seen {
            return Err(RadarApiError::Skipped);
        }
    }

    let slot_index = match context
        .slots
        .iter()
        .position(|slot| slot.as_ref().is_some_and(|c| c.frame_index == header.frame_index))
    {
        Some(index) => index,
        None => {
            let index = oldest_slot_index(context);
            if let Some(evicted) = context.slots[index].take() {
                emit(context, &evicted);
            }
            context.slots[index] = Some(new_cloud(header, mount));
            index
        }
    };

    let cloud = context.slots[slot_index].as_mut().expect("slot just populated");

    if cloud.num_points_expected != header.total_points_in_frame {
        diagnostics::warn(
            "provizio_get_point_cloud_being_received: num_points_expected mismatch across \
             different packets of the same frame",
        );
    }
    let points = decode_points(header, bytes);
    let start = cloud.num_points_received as usize;
    if start + points.len() > cloud.num_points_expected as usize {
        return Err(RadarApiError::Protocol("Too many points received".into()));
    }
    let end = start + points.len();
    for (slot, point) in cloud.points[start..end].iter_mut().zip(points) {
        *slot = point;
    }
    cloud.num_points_received = end as u16;

    if header.frame_index > context.latest_frame_index || wrapped {
        context.latest_frame_index = header.frame_index;
    }

    if cloud.is_complete() {
        let completed = context.slots[slot_index].take().expect("slot populated above");
        emit(context, &completed);
    }

    Ok(())
}

fn new_cloud(header: &PointCloudFragmentHeader, mount: MountPosition) -> Cloud {
    let mut cloud = Cloud::empty();
    cloud.frame_index = header.frame_index;
    cloud.timestamp = header.timestamp;
    cloud.mount_position = mount.to_wire();
    cloud.num_points_expected = header.total_points_in_frame;
    cloud.radar_range = header.radar_range;
    cloud
}

fn oldest_slot_index(context: &PointCloudContext) -> usize {
    match (&context.slots[0], &context.slots[1]) {
        (None, _) => 0,
        (_, None) => 1,
        (Some(a), Some(b)) => {
            if a.frame_index <= b.frame_index {
                0
            } else {
                1
            }
        }
    }
}

fn emit(context: &mut PointCloudContext, cloud: &Cloud) {
    if let Some(callback) = context.callback.as_mut() {
        callback(cloud);
    }
}

/// Validates and handles a single fragment already known to be addressed to `context`.
pub fn handle_fragment(context: &mut PointCloudContext, bytes: &[u8]) -> Result<()> {
    let header = check_fragment(bytes)?;
    handle_fragment_checked(context, &header, bytes)
}

/// Validates a possible point-cloud fragment and, if well-formed, routes it to the matching (or
/// first free) context in `contexts`. Type mismatches are reported as [`RadarApiError::Skipped`]
/// rather than a protocol error, since an unrelated packet type is an expected occurrence on a
/// shared socket, not a violation.
///
/// A single-context array is dispatched straight to that context rather than through the router,
/// mirroring the reference receive loop's `num_contexts == 1` special case: a mount mismatch then
/// surfaces as `Skipped` (the context's own bind-or-skip rule) instead of `OutOfContexts` (the
/// router's "no free context" rule, correct only when more than one context could have matched).
pub fn handle_possible_fragment(contexts: &mut [PointCloudContext], bytes: &[u8]) -> Result<()> {
    if bytes.len() < PROTOCOL_HEADER_SIZE {
        return Err(RadarApiError::Skipped);
    }
    if packet::ProtocolHeader::decode(bytes).packet_type != POINT_CLOUD_PACKET_TYPE {
        return Err(RadarApiError::Skipped);
    }

    let header = check_fragment(bytes)?;

    if let [context] = contexts {
        return handle_fragment_checked(context, &header, bytes);
    }

    let mount = MountPosition::from_wire(header.mount_position_id);
    let context = router::route_point_cloud(contexts, mount)?;
    handle_fragment_checked(context, &header, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ProtocolHeader, POINT_RECORD_SIZE_V2};

    fn encode_fragment(
        frame_index: u32,
        total_points: u16,
        points: &[Point],
        mount: u16,
    ) -> Vec<u8> {
        let header = PointCloudFragmentHeader {
            protocol_header: ProtocolHeader {
                packet_type: POINT_CLOUD_PACKET_TYPE,
                protocol_version: POINT_CLOUD_PROTOCOL_VERSION,
            },
            frame_index,
            timestamp: 1000,
            mount_position_id: mount,
            total_points_in_frame: total_points,
            num_points_in_packet: points.len() as u16,
            radar_range: 0,
        };
        let mut buf = vec![0u8; POINT_CLOUD_HEADER_SIZE + points.len() * POINT_RECORD_SIZE_V2];
        header.encode(&mut buf);
        for (i, p) in points.iter().enumerate() {
            let start = POINT_CLOUD_HEADER_SIZE + i * POINT_RECORD_SIZE_V2;
            p.encode_v2(&mut buf[start..start + POINT_RECORD_SIZE_V2]);
        }
        buf
    }

    fn sample_point(x: f32) -> Point {
        Point {
            x_meters: x,
            y_meters: 0.0,
            z_meters: 0.0,
            radar_relative_radial_velocity_m_s: 0.0,
            signal_to_noise_ratio: 10.0,
            ground_relative_radial_velocity_m_s: 0.0,
        }
    }

    #[test]
    fn too_short_header_is_protocol_error() {
        let err = check_fragment(&[0u8; 2]).unwrap_err();
        assert!(matches!(err, RadarApiError::Protocol(ref m) if m == "insufficient packet_size"));
    }

    #[test]
    fn wrong_packet_type_is_protocol_error_via_direct_check() {
        let bytes = encode_fragment(1, 1, &[sample_point(1.0)], 0);
        let mut tampered = bytes.clone();
        tampered[1] = 9;
        let err = check_fragment(&tampered).unwrap_err();
        assert!(matches!(err, RadarApiError::Protocol(ref m) if m == "unexpected packet_type"));
    }

    #[test]
    fn wrong_packet_type_is_skipped_via_possible_fragment() {
        let bytes = encode_fragment(1, 1, &[sample_point(1.0)], 0);
        let mut tampered = bytes.clone();
        tampered[1] = 9;
        let mut contexts = [PointCloudContext::new()];
        let err = handle_possible_fragment(&mut contexts, &tampered).unwrap_err();
        assert!(matches!(err, RadarApiError::Skipped));
    }

    #[test]
    fn unknown_mount_position_is_protocol_error() {
        let bytes = encode_fragment(1, 1, &[sample_point(1.0)], MountPosition::UNKNOWN_VALUE);
        let err = check_fragment(&bytes).unwrap_err();
        assert!(matches!(err, RadarApiError::Protocol(ref m)
            if m == "the value of radar_position_id can't be provizio_radar_position_unknown"));
    }

    #[test]
    fn empty_frame_is_skipped() {
        let mut context = PointCloudContext::new();
        let bytes = encode_fragment(1, 0, &[], 0);
        let err = handle_fragment(&mut context, &bytes).unwrap_err();
        assert!(matches!(err, RadarApiError::Skipped));
    }

    #[test]
    fn single_fragment_frame_completes_immediately() {
        let received = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let received2 = received.clone();
        let mut context = PointCloudContext::with_callback(move |cloud: &Cloud| {
            received2.lock().unwrap().push(cloud.frame_index);
        });

        let points = [sample_point(1.0), sample_point(2.0)];
        let bytes = encode_fragment(7, 2, &points, 0);
        handle_fragment(&mut context, &bytes).unwrap();

        assert_eq!(received.lock().unwrap().as_slice(), [7]);
    }

    #[test]
    fn two_fragments_of_same_frame_accumulate_before_completing() {
        let received = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let received2 = received.clone();
        let mut context = PointCloudContext::with_callback(move |cloud: &Cloud| {
            received2.lock().unwrap().push(cloud.received_points().len());
        });

        let first = encode_fragment(3, 3, &[sample_point(1.0)], 0);
        let second = encode_fragment(3, 3, &[sample_point(2.0), sample_point(3.0)], 0);
        handle_fragment(&mut context, &first).unwrap();
        assert!(received.lock().unwrap().is_empty());
        handle_fragment(&mut context, &second).unwrap();

        assert_eq!(received.lock().unwrap().as_slice(), [3]);
    }

    #[test]
    fn stale_fragment_behind_latest_completed_frame_is_skipped() {
        let mut context = PointCloudContext::new();
        let newer = encode_fragment(10, 1, &[sample_point(1.0)], 0);
        handle_fragment(&mut context, &newer).unwrap();

        let older = encode_fragment(5, 1, &[sample_point(1.0)], 0);
        let err = handle_fragment(&mut context, &older).unwrap_err();
        assert!(matches!(err, RadarApiError::Skipped));
    }

    #[test]
    fn third_in_flight_frame_evicts_the_older_of_two_incomplete_slots() {
        let received = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let received2 = received.clone();
        let mut context = PointCloudContext::with_callback(move |cloud: &Cloud| {
            received2.lock().unwrap().push(cloud.frame_index);
        });

        let a = encode_fragment(1, 2, &[sample_point(1.0)], 0);
        let b = encode_fragment(2, 2, &[sample_point(1.0)], 0);
        let c = encode_fragment(3, 2, &[sample_point(1.0)], 0);
        handle_fragment(&mut context, &a).unwrap();
        handle_fragment(&mut context, &b).unwrap();
        assert!(received.lock().unwrap().is_empty());

        handle_fragment(&mut context, &c).unwrap();
        assert_eq!(received.lock().unwrap().as_slice(), [1]);
    }

    #[test]
    fn frame_index_wraparound_is_accepted_as_newer() {
        let mut context = PointCloudContext::new();
        context.latest_frame_index = 0xffff_fff0;

        let wrapped = encode_fragment(10, 1, &[sample_point(1.0)], 0);
        handle_fragment(&mut context, &wrapped).unwrap();
        assert_eq!(context.latest_frame_index, 10);
    }

    #[test]
    fn handle_possible_fragment_routes_by_mount_position() {
        let mut contexts = [PointCloudContext::new(), PointCloudContext::new()];
        let bytes = encode_fragment(1, 1, &[sample_point(1.0)], MountPosition::RearLeft.to_wire());
        handle_possible_fragment(&mut contexts, &bytes).unwrap();
        assert_eq!(contexts[0].mount_position(), MountPosition::RearLeft);
        assert_eq!(contexts[1].mount_position(), MountPosition::Unknown);
    }

    #[test]
    fn too_many_points_in_a_fragment_is_a_protocol_error() {
        let mut context = PointCloudContext::new();
        let bytes = encode_fragment(1, 1, &[sample_point(1.0), sample_point(2.0)], 0);
        let err = handle_fragment(&mut context, &bytes).unwrap_err();
        assert!(matches!(err, RadarApiError::Protocol(ref m) if m == "Too many points received"));
    }

    #[test]
    fn fragment_for_a_different_mount_once_bound_is_skipped_not_not_permitted() {
        let mut context = PointCloudContext::new();
        let first = encode_fragment(1, 2, &[sample_point(1.0)], MountPosition::FrontCenter.to_wire());
        handle_fragment(&mut context, &first).unwrap();

        let mismatched = encode_fragment(1, 2, &[sample_point(2.0)], MountPosition::RearLeft.to_wire());
        let err = handle_fragment(&mut context, &mismatched).unwrap_err();
        assert!(matches!(err, RadarApiError::Skipped));
    }

    #[test]
    fn single_context_array_skips_a_mismatched_mount_instead_of_out_of_contexts() {
        let mut contexts = [PointCloudContext::new()];
        let first = encode_fragment(1, 2, &[sample_point(1.0)], MountPosition::FrontCenter.to_wire());
        handle_possible_fragment(&mut contexts, &first).unwrap();

        let mismatched = encode_fragment(1, 2, &[sample_point(2.0)], MountPosition::RearLeft.to_wire());
        let err = handle_possible_fragment(&mut contexts, &mismatched).unwrap_err();
        assert!(matches!(err, RadarApiError::Skipped));
    }
}
