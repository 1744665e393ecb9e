//! Multi-radar demultiplexing (§4.4): locates the context bound to a given mount position, or the
//! first unbound context to claim, across a fixed array of per-radar contexts.
//!
//! Grounded on `radar_api_context.c`'s `provizio_get_radar_api_context_by_position_id`: a two-pass
//! scan, first for an exact mount-position match, falling back to the first unbound slot so a
//! fresh radar can claim one without the caller pre-assigning it.

use crate::context::{EgoMotionContext, PointCloudContext};
use crate::error::{RadarApiError, Result};
use crate::position::MountPosition;

/// Finds the point-cloud context already bound to `mount`, or else the first unbound context,
/// binding it to `mount` as a side effect. Returns `OutOfContexts` if neither exists.
pub fn route_point_cloud<'a>(
    contexts: &'a mut [PointCloudContext],
    mount: MountPosition,
) -> Result<&'a mut PointCloudContext> {
    if let Some(index) = contexts.iter().position(|ctx| ctx.mount_position() == mount) {
        return Ok(&mut contexts[index]);
    }

    if let Some(index) = contexts
        .iter()
        .position(|ctx| ctx.mount_position().is_unknown())
    {
        contexts[index].assign(mount)?;
        return Ok(&mut contexts[index]);
    }

    Err(RadarApiError::OutOfContexts)
}

/// Ego-motion counterpart of [`route_point_cloud`], over an array of [`EgoMotionContext`].
pub fn route_ego_motion<'a>(
    contexts: &'a mut [EgoMotionContext],
    mount: MountPosition,
) -> Result<&'a mut EgoMotionContext> {
    if let Some(index) = contexts.iter().position(|ctx| ctx.mount_position() == mount) {
        return Ok(&mut contexts[index]);
    }

    if let Some(index) = contexts
        .iter()
        .position(|ctx| ctx.mount_position().is_unknown())
    {
        contexts[index].assign(mount)?;
        return Ok(&mut contexts[index]);
    }

    Err(RadarApiError::OutOfContexts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_to_existing_binding_without_touching_others() {
        let mut contexts = [PointCloudContext::new(), PointCloudContext::new()];
        contexts[0].assign(MountPosition::FrontCenter).unwrap();
        contexts[1].assign(MountPosition::RearLeft).unwrap();

        let routed = route_point_cloud(&mut contexts, MountPosition::RearLeft).unwrap();
        assert_eq!(routed.mount_position(), MountPosition::RearLeft);
    }

    #[test]
    fn claims_first_unbound_context_for_a_new_mount() {
        let mut contexts = [PointCloudContext::new(), PointCloudContext::new()];
        contexts[0].assign(MountPosition::FrontCenter).unwrap();

        let routed = route_point_cloud(&mut contexts, MountPosition::RearLeft).unwrap();
        assert_eq!(routed.mount_position(), MountPosition::RearLeft);
        assert_eq!(contexts[0].mount_position(), MountPosition::FrontCenter);
        assert_eq!(contexts[1].mount_position(), MountPosition::RearLeft);
    }

    #[test]
    fn out_of_contexts_when_all_bound_to_other_mounts() {
        let mut contexts = [PointCloudContext::new()];
        contexts[0].assign(MountPosition::FrontCenter).unwrap();

        let err = route_point_cloud(&mut contexts, MountPosition::RearLeft).unwrap_err();
        assert!(matches!(err, RadarApiError::OutOfContexts));
    }

    #[test]
    fn ego_motion_router_mirrors_point_cloud_router() {
        let mut contexts = [EgoMotionContext::new()];
        let routed = route_ego_motion(&mut contexts, MountPosition::FrontLeft).unwrap();
        assert_eq!(routed.mount_position(), MountPosition::FrontLeft);
    }
}
