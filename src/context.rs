//! Per-radar reassembly state (§3, §4.11): the reassembled [`Cloud`]/[`EgoMotion`] entities plus
//! the mount-position binding state machine shared by the point-cloud and ego-motion contexts.
//!
//! Grounded on `radar_api_context.c` (point-cloud side) and `radar_ego_motion.c` (ego-motion
//! side), which define the identical assign/idempotency/error rules independently for their own
//! context arrays — preserved here as two distinct context types sharing one binding helper.

use crate::error::{RadarApiError, Result};
use crate::packet::Point;
use crate::position::MountPosition;

pub const MAX_POINTS_IN_POINT_CLOUD: usize = crate::packet::MAX_POINTS_IN_POINT_CLOUD;

/// A complete or partial radar point cloud (one reassembled frame).
///
/// Complete clouds always have `num_points_received == num_points_expected`.
#[derive(Debug)]
pub struct Cloud {
    pub frame_index: u32,
    pub timestamp: u64,
    pub mount_position: u16,
    pub num_points_expected: u16,
    pub num_points_received: u16,
    pub radar_range: u16,
    pub mode: u16,
    pub points: Box<[Point]>,
}

impl Clone for Cloud {
    fn clone(&self) -> Self {
        Self {
            frame_index: self.frame_index,
            timestamp: self.timestamp,
            mount_position: self.mount_position,
            num_points_expected: self.num_points_expected,
            num_points_received: self.num_points_received,
            radar_range: self.radar_range,
            mode: self.mode,
            points: self.points.clone(),
        }
    }
}

impl Cloud {
    pub fn empty() -> Self {
        Self {
            frame_index: 0,
            timestamp: 0,
            mount_position: MountPosition::UNKNOWN_VALUE,
            num_points_expected: 0,
            num_points_received: 0,
            radar_range: 0,
            mode: 0,
            points: vec![Point::default(); MAX_POINTS_IN_POINT_CLOUD].into_boxed_slice(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.num_points_received >= self.num_points_expected
    }

    pub fn received_points(&self) -> &[Point] {
        &self.points[..self.num_points_received as usize]
    }
}

/// Per-frame sensor velocity, as decoded from an ego-motion packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct EgoMotion {
    pub frame_index: u32,
    pub timestamp: u64,
    pub mount_position: u16,
    pub vs_x: f32,
    pub vs_y: f32,
}

/// Assigns `bound` to `desired`, applying the shared binding rules (§4.11):
/// unassigning is `Argument`, rebinding to a different mount once bound is `NotPermitted`,
/// and reassigning to the already-bound mount is a no-op success.
pub(crate) fn assign_mount(
    bound: &mut MountPosition,
    desired: MountPosition,
    context_label: &str,
) -> Result<()> {
    if desired.is_unknown() {
        let message = format!("{context_label}: can't assign to unknown mount position");
        crate::diagnostics::error(&message);
        return Err(RadarApiError::Argument(message));
    }

    if *bound == desired {
        return Ok(());
    }

    if bound.is_unknown() {
        *bound = desired;
        return Ok(());
    }

    let message = format!("{context_label}: already assigned");
    crate::diagnostics::error(&message);
    Err(RadarApiError::NotPermitted(message))
}

type PointCloudCallback = Box<dyn FnMut(&Cloud) + Send>;

/// Holds the two most-recent in-flight frames, the latest completed frame index, the
/// point-cloud callback, and the mount-position binding for a single radar.
pub struct PointCloudContext {
    pub(crate) mount_position: MountPosition,
    pub(crate) slots: [Option<Cloud>; 2],
    pub(crate) latest_frame_index: u32,
    pub(crate) callback: Option<PointCloudCallback>,
}

impl std::fmt::Debug for PointCloudContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointCloudContext")
            .field("mount_position", &self.mount_position)
            .field("slots", &self.slots)
            .field("latest_frame_index", &self.latest_frame_index)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl PointCloudContext {
    pub fn new() -> Self {
        Self {
            mount_position: MountPosition::Unknown,
            slots: [None, None],
            latest_frame_index: 0,
            callback: None,
        }
    }

    pub fn with_callback<F>(callback: F) -> Self
    where
        F: FnMut(&Cloud) + Send + 'static,
    {
        let mut ctx = Self::new();
        ctx.callback = Some(Box::new(callback));
        ctx
    }

    pub fn mount_position(&self) -> MountPosition {
        self.mount_position
    }

    pub fn assign(&mut self, mount: MountPosition) -> Result<()> {
        assign_mount(
            &mut self.mount_position,
            mount,
            "PointCloudContext::assign",
        )
    }

    pub(crate) fn reset(&mut self) {
        self.slots = [None, None];
        self.latest_frame_index = 0;
    }
}

impl Default for PointCloudContext {
    fn default() -> Self {
        Self::new()
    }
}

type EgoMotionCallback = Box<dyn FnMut(&EgoMotion) + Send>;

/// Holds the most-recent ego-motion snapshot, the ego-motion callback, and the mount-position
/// binding for a single radar.
pub struct EgoMotionContext {
    pub(crate) mount_position: MountPosition,
    pub(crate) latest: EgoMotion,
    pub(crate) callback: Option<EgoMotionCallback>,
}

impl EgoMotionContext {
    pub fn new() -> Self {
        Self {
            mount_position: MountPosition::Unknown,
            latest: EgoMotion::default(),
            callback: None,
        }
    }

    pub fn with_callback<F>(callback: F) -> Self
    where
        F: FnMut(&EgoMotion) + Send + 'static,
    {
        let mut ctx = Self::new();
        ctx.callback = Some(Box::new(callback));
        ctx
    }

    pub fn mount_position(&self) -> MountPosition {
        self.mount_position
    }

    pub fn assign(&mut self, mount: MountPosition) -> Result<()> {
        assign_mount(&mut self.mount_position, mount, "EgoMotionContext::assign")
    }

    pub(crate) fn reset(&mut self) {
        self.latest = EgoMotion::default();
    }
}

impl Default for EgoMotionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_then_reassign_same_mount_is_ok() {
        let mut ctx = PointCloudContext::new();
        assert!(ctx.assign(MountPosition::RearLeft).is_ok());
        assert!(ctx.assign(MountPosition::RearLeft).is_ok());
    }

    #[test]
    fn reassign_to_different_mount_is_not_permitted() {
        let mut ctx = PointCloudContext::new();
        ctx.assign(MountPosition::RearLeft).unwrap();
        let err = ctx.assign(MountPosition::FrontCenter).unwrap_err();
        assert!(matches!(err, RadarApiError::NotPermitted(_)));
    }

    #[test]
    fn assign_to_unknown_is_argument_error() {
        let mut ctx = PointCloudContext::new();
        let err = ctx.assign(MountPosition::Unknown).unwrap_err();
        assert!(matches!(err, RadarApiError::Argument(_)));
    }
}
