//! Multi-frame accumulation ring and its newest-to-oldest iterator (§4.7, §4.8).
//!
//! Grounded on `radar_points_accumulation.c` in full: `provizio_accumulated_radar_point_clouds_init`,
//! `provizio_accumulate_radar_point_cloud` (10-step insertion algorithm below), the
//! `..._count`/`..._points_count` scan directions (preserved verbatim, see the note on
//! [`Ring::count_clouds`]), and the iterator family.

use crate::context::Cloud;
use crate::diagnostics;
use crate::geometry::{transform_matrix, transform_point, EnuFix, Mat4};
use crate::packet::Point;

const SMALL_FRAME_INDEX_CAP: u32 = 0x0000_ffff;
const LARGE_FRAME_INDEX_THRESHOLD: u32 = 0xffff_0000;

/// One ring slot: a reassembled cloud plus the sensor pose it was captured under.
///
/// A slot whose `fix_when_received.orientation` is not a valid rotation (the zeroed default) is
/// treated as empty.
pub struct AccumulatedCloud {
    pub point_cloud: Cloud,
    pub fix_when_received: EnuFix,
}

impl AccumulatedCloud {
    fn empty() -> Self {
        Self {
            point_cloud: Cloud::empty(),
            fix_when_received: EnuFix::default(),
        }
    }

    fn is_valid(&self) -> bool {
        self.fix_when_received.orientation.is_valid_rotation()
    }
}

/// Position within the ring: a cloud index plus a point index into that cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingIterator {
    pub point_cloud_index: usize,
    pub point_index: usize,
}

/// Narrows or reorders the points copied into a ring slot at accumulation time (§4.9's
/// static-points filter is the motivating implementation of this trait).
pub trait AccumulationFilter {
    /// Writes into `out` (at most `source.len()` points) and returns how many were written.
    fn apply(
        &mut self,
        source: &[Point],
        ring: &Ring,
        iterator: &RingIterator,
        out: &mut [Point],
    ) -> usize;
}

/// The identity filter: copies every received point through unchanged.
pub struct CopyAllFilter;

impl AccumulationFilter for CopyAllFilter {
    fn apply(&mut self, source: &[Point], _ring: &Ring, _iterator: &RingIterator, out: &mut [Point]) -> usize {
        out[..source.len()].copy_from_slice(source);
        source.len()
    }
}

/// Fixed-capacity circular buffer of past point clouds, each tagged with the ENU pose the sensor
/// held when it was received.
pub struct Ring {
    slots: Vec<AccumulatedCloud>,
}

impl Ring {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| AccumulatedCloud::empty()).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = AccumulatedCloud::empty();
        }
    }

    fn is_valid(&self, index: usize) -> bool {
        self.slots[index].is_valid()
    }

    /// Inserts `cloud`, captured under `fix_when_received`, applying `filter` (or
    /// [`CopyAllFilter`] if `None`) to choose which of its points are retained.
    pub fn accumulate(
        &mut self,
        cloud: &Cloud,
        fix_when_received: EnuFix,
        mut filter: Option<&mut dyn AccumulationFilter>,
    ) -> RingIterator {
        let capacity = self.slots.len();
        let mut iterator = RingIterator::default();

        if capacity == 0 {
            diagnostics::error("Ring::accumulate: num_accumulated_point_clouds can't be 0");
            return iterator;
        }

        if !fix_when_received.orientation.is_valid_rotation() {
            diagnostics::error("Ring::accumulate: fix_when_received.orientation is not a valid rotation");
            iterator.point_cloud_index = capacity;
            return iterator;
        }

        // Find the latest accumulated cloud.
        for index in 0..capacity {
            if !self.is_valid(index) {
                break;
            }
            let current_frame_index = self.slots[index].point_cloud.frame_index;
            let iterators_frame_index = self.slots[iterator.point_cloud_index].point_cloud.frame_index;
            if current_frame_index > iterators_frame_index {
                iterator.point_cloud_index += 1;
            } else if current_frame_index != iterators_frame_index {
                break;
            }
        }

        if cloud.num_points_received == 0 {
            iterator.point_cloud_index = capacity;
            return iterator;
        }

        let mut no_latest = self.is_end(&iterator);
        if !no_latest && self.slots[iterator.point_cloud_index].point_cloud.frame_index >= cloud.frame_index {
            let latest_frame_index = self.slots[iterator.point_cloud_index].point_cloud.frame_index;
            if cloud.frame_index >= SMALL_FRAME_INDEX_CAP || latest_frame_index <= LARGE_FRAME_INDEX_THRESHOLD {
                diagnostics::error(
                    "Ring::accumulate: can't accumulate an older point cloud after a newer one",
                );
                iterator.point_cloud_index = capacity;
                return iterator;
            }

            diagnostics::warn("Ring::accumulate: frame indices overflow detected - resetting accumulation");
            self.reset();
            no_latest = true;
            iterator.point_cloud_index = 0;
        }

        if !no_latest {
            iterator.point_cloud_index = (iterator.point_cloud_index + 1) % capacity;
        }
        let index = iterator.point_cloud_index;

        {
            let slot = &mut self.slots[index].point_cloud;
            slot.frame_index = cloud.frame_index;
            slot.timestamp = cloud.timestamp;
            slot.mount_position = cloud.mount_position;
            slot.num_points_expected = cloud.num_points_expected;
            slot.radar_range = cloud.radar_range;
            slot.mode = cloud.mode;
            slot.num_points_received = 0;
        }

        let source_points = cloud.received_points().to_vec();
        let mut out_points = vec![Point::default(); source_points.len()];
        let mut written = match filter.as_deref_mut() {
            Some(f) => f.apply(&source_points, &*self, &iterator, &mut out_points),
            None => CopyAllFilter.apply(&source_points, &*self, &iterator, &mut out_points),
        };

        if written == 0 {
            diagnostics::warn(
                "Ring::accumulate: filter removed all points, which is not supported, so \
                 accumulating the first point instead",
            );
            out_points[0] = source_points[0];
            written = 1;
            self.slots[index].point_cloud.num_points_expected = 1;
        }

        let slot = &mut self.slots[index];
        slot.point_cloud.points[..written].clone_from_slice(&out_points[..written]);
        slot.point_cloud.num_points_received = written as u16;
        slot.fix_when_received = fix_when_received;

        iterator
    }

    /// Number of valid clouds currently in the ring.
    ///
    /// Scans back-to-front under the assumption that most of the time the whole ring is filled;
    /// in the natural contiguous-from-zero fill order this gives the exact count. Not "fixed" to
    /// scan forward instead, matching the reference implementation.
    pub fn count_clouds(&self) -> usize {
        let capacity = self.slots.len();
        let mut invalid_count = 0;
        while invalid_count < capacity {
            if self.is_valid(capacity - invalid_count - 1) {
                break;
            }
            invalid_count += 1;
        }
        capacity - invalid_count
    }

    /// Total received points across every valid cloud, scanning forward and stopping at the
    /// first invalid slot (mirrors the "find the latest" scan direction in `accumulate`).
    pub fn count_points(&self) -> usize {
        let mut total = 0;
        for slot in &self.slots {
            if !slot.is_valid() {
                break;
            }
            total += slot.point_cloud.num_points_received as usize;
        }
        total
    }

    pub fn is_end(&self, iterator: &RingIterator) -> bool {
        iterator.point_cloud_index >= self.slots.len() || !self.is_valid(iterator.point_cloud_index)
    }

    pub fn next_point_cloud(&self, iterator: &mut RingIterator) {
        let capacity = self.slots.len();
        if capacity == 0 {
            diagnostics::error("Ring::next_point_cloud: num_accumulated_point_clouds can't be 0");
            return;
        }
        if self.is_end(iterator) {
            diagnostics::error("Ring::next_point_cloud: can't go next cloud on an end iterator");
            return;
        }

        let current_frame_index = self.slots[iterator.point_cloud_index].point_cloud.frame_index;
        iterator.point_index = 0;
        iterator.point_cloud_index = (capacity + iterator.point_cloud_index - 1) % capacity;

        let wrapped_around = !self.is_valid(iterator.point_cloud_index)
            || self.slots[iterator.point_cloud_index].point_cloud.frame_index >= current_frame_index;
        if wrapped_around {
            iterator.point_cloud_index = capacity;
        }
    }

    pub fn next_point(&self, iterator: &mut RingIterator) {
        let capacity = self.slots.len();
        if capacity == 0 {
            diagnostics::error("Ring::next_point: num_accumulated_point_clouds can't be 0");
            return;
        }
        if self.is_end(iterator) {
            diagnostics::error("Ring::next_point: can't go next point on an end iterator");
            return;
        }

        iterator.point_index += 1;
        if iterator.point_index >= self.slots[iterator.point_cloud_index].point_cloud.num_points_received as usize {
            iterator.point_index = 0;
            self.next_point_cloud(iterator);
        }
    }

    pub fn get_slot(&self, iterator: &RingIterator) -> Option<&AccumulatedCloud> {
        if self.is_end(iterator) {
            return None;
        }
        Some(&self.slots[iterator.point_cloud_index])
    }

    /// Re-projects the cloud at `iterator` into `current_fix`'s frame (§4.6).
    pub fn get_point_cloud(&self, iterator: &RingIterator, current_fix: &EnuFix) -> Option<Cloud> {
        let slot = self.get_slot(iterator)?;
        let mut out = Cloud::empty();
        out.frame_index = slot.point_cloud.frame_index;
        out.timestamp = slot.point_cloud.timestamp;
        out.mount_position = slot.point_cloud.mount_position;
        out.num_points_expected = slot.point_cloud.num_points_expected;
        out.num_points_received = slot.point_cloud.num_points_received;
        out.radar_range = slot.point_cloud.radar_range;
        out.mode = slot.point_cloud.mode;

        for (dest, source) in out.points[..slot.point_cloud.num_points_received as usize]
            .iter_mut()
            .zip(slot.point_cloud.received_points())
        {
            let xyz = transform_point(
                [source.x_meters, source.y_meters, source.z_meters],
                &slot.fix_when_received,
                current_fix,
            );
            *dest = Point {
                x_meters: xyz[0],
                y_meters: xyz[1],
                z_meters: xyz[2],
                radar_relative_radial_velocity_m_s: source.radar_relative_radial_velocity_m_s,
                signal_to_noise_ratio: source.signal_to_noise_ratio,
                ground_relative_radial_velocity_m_s: source.ground_relative_radial_velocity_m_s,
            };
        }

        Some(out)
    }

    /// Transformation matrix equivalent to the per-point rotation [`Ring::get_point_cloud`]
    /// applies, for callers that want to transform points themselves (e.g. on a GPU).
    pub fn transformation_matrix(&self, iterator: &RingIterator, current_fix: &EnuFix) -> Option<Mat4> {
        let slot = self.get_slot(iterator)?;
        Some(transform_matrix(&slot.fix_when_received, current_fix))
    }

    /// Re-projects the single point at `iterator` into `current_fix`'s frame.
    pub fn get_point(&self, iterator: &RingIterator, current_fix: &EnuFix) -> Option<Point> {
        let slot = self.get_slot(iterator)?;
        let source = slot.point_cloud.points.get(iterator.point_index)?;
        let xyz = transform_point(
            [source.x_meters, source.y_meters, source.z_meters],
            &slot.fix_when_received,
            current_fix,
        );
        Some(Point {
            x_meters: xyz[0],
            y_meters: xyz[1],
            z_meters: xyz[2],
            radar_relative_radial_velocity_m_s: source.radar_relative_radial_velocity_m_s,
            signal_to_noise_ratio: source.signal_to_noise_ratio,
            ground_relative_radial_velocity_m_s: source.ground_relative_radial_velocity_m_s,
        })
    }
}
