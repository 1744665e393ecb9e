//! Static-points accumulation filter (§4.9): estimates the sensor's own forward velocity and
//! keeps only points whose measured radial velocity is consistent with being world-stationary.
//!
//! Grounded on `radar_points_accumulation_filters.c` in full: the history-based velocity
//! estimator (windowed position/timestamp deltas, heading recovery via displacement), its
//! histogram fallback, and the static/dynamic velocity test.

use crate::geometry::{enu_distance, Quaternion};
use crate::packet::Point;
use crate::ring::{AccumulationFilter, Ring, RingIterator};

const VELOCITY_AVERAGING_DURATION_MAX_NS: u64 = 3_000_000_000;
const VELOCITY_AVERAGING_DURATION_MIN_NS: u64 = 1_000_000_000;
const MIN_MOVE_DISTANCE_TO_DETECT_ORIENTATION_M: f32 = 1.5;
const DYNAMIC_VELOCITY_THRESHOLD_M_S: f32 = 1.5;

const HISTOGRAM_BINS: usize = 50;
const MIN_BIN_SIZE_M_S: f32 = 0.3;

/// Assumes most points belong to static objects and finds the velocity bin the radial-velocity
/// distribution clusters around.
fn estimate_forward_velocity_using_histogram(points: &[Point]) -> f32 {
    if points.is_empty() {
        return 0.0;
    }

    let mut min_velocity = f32::MAX;
    let mut max_velocity = f32::MIN;
    for point in points {
        let v = point.radar_relative_radial_velocity_m_s;
        min_velocity = min_velocity.min(v);
        max_velocity = max_velocity.max(v);
    }

    // If the distribution is too narrow, widen it so no bin covers more than MIN_BIN_SIZE_M_S.
    let min_velocities_range = MIN_BIN_SIZE_M_S * HISTOGRAM_BINS as f32;
    if max_velocity - min_velocity < min_velocities_range {
        let average = (max_velocity + min_velocity) * 0.5;
        min_velocity = average - min_velocities_range * 0.5;
        max_velocity = average + min_velocities_range * 0.5;
    }

    let bin_size = (max_velocity - min_velocity) / HISTOGRAM_BINS as f32;
    let mut histogram = [0u16; HISTOGRAM_BINS];
    let mut largest_bin = 0usize;
    let mut largest_bin_value = 0u16;
    for point in points {
        let v = point.radar_relative_radial_velocity_m_s;
        let raw_bin = ((v - min_velocity) / bin_size).round() as i64;
        let bin = ((raw_bin * (HISTOGRAM_BINS as i64 - 1)) / HISTOGRAM_BINS as i64)
            .clamp(0, HISTOGRAM_BINS as i64 - 1) as usize;
        histogram[bin] += 1;
        if histogram[bin] > largest_bin_value {
            largest_bin = bin;
            largest_bin_value = histogram[bin];
        }
    }

    -(min_velocity + (0.5 + largest_bin as f32) * bin_size)
}

/// Estimates the radar's own forward velocity, preferring a history of recent poses (accurate,
/// requires real motion over 1-3s) and falling back to the velocity histogram when there isn't
/// enough history or ego hasn't moved far enough to recover a heading.
pub fn estimate_forward_velocity(
    points: &[Point],
    ring: &Ring,
    new_iterator: Option<&RingIterator>,
) -> f32 {
    if let Some(new_iterator) = new_iterator {
        let mut total_distance_m = 0.0f32;
        let mut total_duration_ns: u64 = 0;
        let mut iterator = *new_iterator;
        let mut next_iterator = *new_iterator;

        while total_duration_ns < VELOCITY_AVERAGING_DURATION_MAX_NS {
            ring.next_point_cloud(&mut next_iterator);

            let next = match ring.get_slot(&next_iterator) {
                Some(slot) => slot,
                None => break,
            };
            let current = ring
                .get_slot(&iterator)
                .expect("iterator trails next_iterator, which is still valid");

            total_duration_ns += current
                .point_cloud
                .timestamp
                .saturating_sub(next.point_cloud.timestamp);
            total_distance_m += enu_distance(
                current.fix_when_received.position,
                next.fix_when_received.position,
            );

            iterator = next_iterator;
        }

        if total_duration_ns >= VELOCITY_AVERAGING_DURATION_MIN_NS {
            if let Some(velocity) = estimate_forward_velocity_from_history(
                ring,
                new_iterator,
                total_distance_m,
                total_duration_ns,
            ) {
                return velocity;
            }
        }
    }

    estimate_forward_velocity_using_histogram(points)
}

fn estimate_forward_velocity_from_history(
    ring: &Ring,
    new_iterator: &RingIterator,
    total_distance_m: f32,
    total_duration_ns: u64,
) -> Option<f32> {
    let ego_forward_velocity_m_s = total_distance_m / (total_duration_ns as f64 / 1e9) as f32;

    let current_fix = ring.get_slot(new_iterator)?.fix_when_received;

    let mut lookup = *new_iterator;
    let mut previous_position = current_fix.position;
    let mut distance = 0.0f32;
    loop {
        ring.next_point_cloud(&mut lookup);
        let slot = ring.get_slot(&lookup)?;
        previous_position = slot.fix_when_received.position;
        distance = enu_distance(current_fix.position, previous_position);
        if distance >= MIN_MOVE_DISTANCE_TO_DETECT_ORIENTATION_M {
            break;
        }
    }

    if distance < MIN_MOVE_DISTANCE_TO_DETECT_ORIENTATION_M {
        return None;
    }

    let direction_north = current_fix.position.north_meters - previous_position.north_meters;
    let direction_east = current_fix.position.east_meters - previous_position.east_meters;
    let direction_up = current_fix.position.up_meters - previous_position.up_meters;

    let ego_orientation = if direction_north * direction_north + direction_east * direction_east > 0.0 {
        let yaw = direction_north.atan2(direction_east);
        let pitch = if direction_up != 0.0 {
            direction_east.atan2(-direction_up)
        } else {
            0.0
        };
        Quaternion::from_euler(0.0, pitch, yaw)
    } else {
        crate::diagnostics::warn("estimate_forward_velocity: ego moving straight up or down");
        let sign = if direction_up > 0.0 { -1.0 } else { 1.0 };
        Quaternion::from_euler(0.0, sign * std::f32::consts::FRAC_PI_2, 0.0)
    };

    let enu_velocity = ego_orientation.rotate([ego_forward_velocity_m_s, 0.0, 0.0]);
    let radar_velocity = current_fix.orientation.conjugate().rotate(enu_velocity);
    Some(radar_velocity[0])
}

/// Keeps only points whose radial velocity, once the radar's own estimated forward velocity is
/// added back in, is close to zero — i.e. points that appear stationary in the world frame.
///
/// The azimuth of each point is intentionally not factored into the comparison, matching the
/// reference estimator; this under-corrects points far off the radar's forward axis.
pub struct StaticPointsFilter;

impl AccumulationFilter for StaticPointsFilter {
    fn apply(
        &mut self,
        source: &[Point],
        ring: &Ring,
        iterator: &RingIterator,
        out: &mut [Point],
    ) -> usize {
        let radars_forward_velocity_m_s = estimate_forward_velocity(source, ring, Some(iterator));

        let mut written = 0;
        for point in source {
            if (point.radar_relative_radial_velocity_m_s + radars_forward_velocity_m_s).abs()
                < DYNAMIC_VELOCITY_THRESHOLD_M_S
            {
                out[written] = *point;
                written += 1;
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Cloud;
    use crate::geometry::EnuFix;

    fn point_with_velocity(v: f32) -> Point {
        Point {
            radar_relative_radial_velocity_m_s: v,
            ..Default::default()
        }
    }

    #[test]
    fn histogram_picks_the_most_common_velocity_cluster() {
        let points: Vec<Point> = std::iter::repeat(point_with_velocity(5.0))
            .take(10)
            .chain(std::iter::once(point_with_velocity(-20.0)))
            .collect();
        let estimate = estimate_forward_velocity_using_histogram(&points);
        assert!((estimate - (-5.0)).abs() < 0.5, "estimate was {estimate}");
    }

    #[test]
    fn histogram_of_no_points_is_zero() {
        assert_eq!(estimate_forward_velocity_using_histogram(&[]), 0.0);
    }

    #[test]
    fn falls_back_to_histogram_without_ring_history() {
        let ring = Ring::new(1);
        let points = vec![point_with_velocity(3.0); 5];
        let via_history = estimate_forward_velocity(&points, &ring, None);
        let via_histogram = estimate_forward_velocity_using_histogram(&points);
        assert_eq!(via_history, via_histogram);
    }

    #[test]
    fn static_filter_keeps_points_near_zero_world_velocity() {
        let mut ring = Ring::new(4);
        let mut cloud = Cloud::empty();
        cloud.frame_index = 1;
        cloud.num_points_expected = 2;
        cloud.num_points_received = 2;
        cloud.points[0] = point_with_velocity(0.1);
        cloud.points[1] = point_with_velocity(-10.0);

        let fix = EnuFix {
            orientation: Quaternion::identity(),
            position: Default::default(),
        };

        let mut filter = StaticPointsFilter;
        ring.accumulate(&cloud, fix, Some(&mut filter));

        let slot = ring.get_slot(&RingIterator::default()).unwrap();
        assert_eq!(slot.point_cloud.num_points_received, 1);
        assert_eq!(
            slot.point_cloud.received_points()[0].radar_relative_radial_velocity_m_s,
            0.1
        );
    }
}
