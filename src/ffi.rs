//! C FFI layer (ambient component 17).
//!
//! Provides an opaque handle-based API for C/C++ consumers, covering the reassembly/receive
//! session, the mode-change command, and the accumulation ring — the same handle pattern the
//! teacher crate used for its device/SLAM-stream handles. The generated C header is written to
//! `include/radar_telemetry.h` by cbindgen.

use std::ffi::{c_char, c_int, CStr};
use std::sync::{Arc, Mutex};

use crate::config::ReceiveConfig;
use crate::context::{Cloud, EgoMotion};
use crate::error::LastError;
use crate::geometry::{EnuFix, EnuPosition, Quaternion};
use crate::packet::Point;
use crate::position::{MountPosition, RadarMode};
use crate::ring::Ring;
use crate::{ReceiveSession, StaticPointsFilter};

static LAST_ERROR: LastError = LastError::new();

/// Opaque receive-session handle for C consumers.
pub struct RadarSession {
    session: ReceiveSession,
    latest_clouds: Vec<Arc<Mutex<Option<Cloud>>>>,
    latest_ego: Vec<Arc<Mutex<Option<EgoMotion>>>>,
}

/// Opaque accumulation-ring handle for C consumers.
pub struct RadarRing(Ring);

/// One radar return, in C-compatible layout.
#[repr(C)]
pub struct RadarPoint {
    pub x_meters: f32,
    pub y_meters: f32,
    pub z_meters: f32,
    pub radial_velocity_m_s: f32,
    pub signal_to_noise_ratio: f32,
    pub ground_radial_velocity_m_s: f32,
}

impl From<Point> for RadarPoint {
    fn from(p: Point) -> Self {
        Self {
            x_meters: p.x_meters,
            y_meters: p.y_meters,
            z_meters: p.z_meters,
            radial_velocity_m_s: p.radar_relative_radial_velocity_m_s,
            signal_to_noise_ratio: p.signal_to_noise_ratio,
            ground_radial_velocity_m_s: p.ground_relative_radial_velocity_m_s,
        }
    }
}

/// Header fields of a reassembled point cloud, in C-compatible layout.
#[repr(C)]
pub struct RadarPointCloudHeader {
    pub frame_index: u32,
    pub timestamp: u64,
    pub mount_position: u16,
    pub num_points: u16,
    pub radar_range: u16,
    pub mode: u16,
}

/// A decoded ego-motion snapshot, in C-compatible layout.
#[repr(C)]
pub struct RadarEgoMotion {
    pub frame_index: u32,
    pub timestamp: u64,
    pub mount_position: u16,
    pub vs_x: f32,
    pub vs_y: f32,
}

impl From<EgoMotion> for RadarEgoMotion {
    fn from(e: EgoMotion) -> Self {
        Self {
            frame_index: e.frame_index,
            timestamp: e.timestamp,
            mount_position: e.mount_position,
            vs_x: e.vs_x,
            vs_y: e.vs_y,
        }
    }
}

/// A world-frame pose, in C-compatible layout.
#[repr(C)]
pub struct RadarEnuFix {
    pub qw: f32,
    pub qx: f32,
    pub qy: f32,
    pub qz: f32,
    pub east_meters: f32,
    pub north_meters: f32,
    pub up_meters: f32,
}

impl From<RadarEnuFix> for EnuFix {
    fn from(f: RadarEnuFix) -> Self {
        EnuFix {
            orientation: Quaternion {
                w: f.qw,
                x: f.qx,
                y: f.qy,
                z: f.qz,
            },
            position: EnuPosition {
                east_meters: f.east_meters,
                north_meters: f.north_meters,
                up_meters: f.up_meters,
            },
        }
    }
}

/// Opens a receive session bound to `port` (0 ⇒ default), with `recv_timeout_ns` (0 ⇒ blocking),
/// `probe_first`, and `num_contexts` reassembly contexts of each kind.
///
/// Returns NULL on error (check `radar_last_error`).
#[no_mangle]
pub extern "C" fn radar_session_open(
    port: u16,
    recv_timeout_ns: u64,
    probe_first: bool,
    num_contexts: usize,
) -> *mut RadarSession {
    let config = ReceiveConfig::new()
        .with_port(port)
        .with_recv_timeout_ns(recv_timeout_ns)
        .with_probe_first(probe_first)
        .with_num_contexts(num_contexts);

    let mut session = match ReceiveSession::open(config) {
        Ok(session) => session,
        Err(e) => {
            LAST_ERROR.set(&e);
            return std::ptr::null_mut();
        }
    };

    let latest_clouds: Vec<_> = (0..num_contexts)
        .map(|_| Arc::new(Mutex::new(None)))
        .collect();
    let latest_ego: Vec<_> = (0..num_contexts)
        .map(|_| Arc::new(Mutex::new(None)))
        .collect();

    for (context, slot) in session
        .point_cloud_contexts()
        .iter_mut()
        .zip(latest_clouds.iter().cloned())
    {
        context.callback = Some(Box::new(move |cloud: &Cloud| {
            *slot.lock().expect("latest-cloud mutex poisoned") = Some(cloud.clone());
        }));
    }
    for (context, slot) in session
        .ego_motion_contexts()
        .iter_mut()
        .zip(latest_ego.iter().cloned())
    {
        context.callback = Some(Box::new(move |ego: &EgoMotion| {
            *slot.lock().expect("latest-ego mutex poisoned") = Some(*ego);
        }));
    }

    Box::into_raw(Box::new(RadarSession {
        session,
        latest_clouds,
        latest_ego,
    }))
}

/// Reads and dispatches one datagram. Returns 0 on success, -1 on error (check
/// `radar_last_error`); a timeout is reported as an error like any other.
///
/// # Safety
/// `session` must be a valid pointer returned by `radar_session_open`.
#[no_mangle]
pub unsafe extern "C" fn radar_session_receive_one(session: *mut RadarSession) -> c_int {
    if session.is_null() {
        return -1;
    }
    match (*session).session.receive_one() {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Takes the most recently completed point cloud for context `index`, if any, writing its header
/// to `out_header` and up to `max_points` of its points to `out_points`.
///
/// Returns the number of points written, or -1 if `index` is out of range or no cloud is
/// available yet.
///
/// # Safety
/// `session` must be valid; `out_header` and `out_points` must point to valid, writable memory
/// (`out_points` at least `max_points` elements) unless `max_points` is 0.
#[no_mangle]
pub unsafe extern "C" fn radar_session_take_point_cloud(
    session: *mut RadarSession,
    index: usize,
    out_header: *mut RadarPointCloudHeader,
    out_points: *mut RadarPoint,
    max_points: usize,
) -> c_int {
    if session.is_null() {
        return -1;
    }
    let session = &*session;
    let Some(slot) = session.latest_clouds.get(index) else {
        return -1;
    };
    let Some(cloud) = slot.lock().expect("latest-cloud mutex poisoned").take() else {
        return -1;
    };

    if !out_header.is_null() {
        out_header.write(RadarPointCloudHeader {
            frame_index: cloud.frame_index,
            timestamp: cloud.timestamp,
            mount_position: cloud.mount_position,
            num_points: cloud.num_points_received,
            radar_range: cloud.radar_range,
            mode: cloud.mode,
        });
    }

    let points = cloud.received_points();
    let count = points.len().min(max_points);
    if !out_points.is_null() {
        for (i, point) in points.iter().take(count).enumerate() {
            out_points.add(i).write(RadarPoint::from(*point));
        }
    }
    count as c_int
}

/// Writes the most recent ego-motion snapshot for context `index` to `out`. Returns 0 on success,
/// -1 if `index` is out of range or nothing has been received yet.
///
/// # Safety
/// `session` must be valid; `out` must point to valid, writable memory.
#[no_mangle]
pub unsafe extern "C" fn radar_session_ego_motion(
    session: *mut RadarSession,
    index: usize,
    out: *mut RadarEgoMotion,
) -> c_int {
    if session.is_null() || out.is_null() {
        return -1;
    }
    let session = &*session;
    let Some(slot) = session.latest_ego.get(index) else {
        return -1;
    };
    match *slot.lock().expect("latest-ego mutex poisoned") {
        Some(ego) => {
            out.write(RadarEgoMotion::from(ego));
            0
        }
        None => -1,
    }
}

/// Closes a receive session and frees its resources.
///
/// # Safety
/// `session` must be a pointer returned by `radar_session_open`, or null.
#[no_mangle]
pub unsafe extern "C" fn radar_session_close(session: *mut RadarSession) {
    if !session.is_null() {
        drop(Box::from_raw(session));
    }
}

/// Sends a one-shot mode-change request and waits for the acknowledgement. `ipv4_address` may be
/// null to use the broadcast address. Returns 0 on success, -1 on error (check
/// `radar_last_error`).
///
/// # Safety
/// `ipv4_address`, if non-null, must point to a valid, null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn radar_set_mode(
    mount_position: u16,
    mode: u16,
    udp_port: u16,
    ipv4_address: *const c_char,
) -> c_int {
    let address = if ipv4_address.is_null() {
        None
    } else {
        match CStr::from_ptr(ipv4_address).to_str() {
            Ok(s) => Some(s),
            Err(_) => {
                LAST_ERROR.set(&crate::RadarApiError::Argument(
                    "ipv4_address is not valid UTF-8".into(),
                ));
                return -1;
            }
        }
    };

    match crate::mode_command::set_radar_mode(
        MountPosition::from_wire(mount_position),
        RadarMode::from_wire(mode),
        udp_port,
        address,
    ) {
        Ok(()) => 0,
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Allocates a fresh accumulation ring with room for `capacity` clouds.
#[no_mangle]
pub extern "C" fn radar_ring_new(capacity: usize) -> *mut RadarRing {
    Box::into_raw(Box::new(RadarRing(Ring::new(capacity))))
}

/// Accumulates `header`/`points` into `ring` at the given pose, applying the static-points filter.
/// Returns the number of point clouds currently held by the ring.
///
/// # Safety
/// `ring` must be valid; `points` must point to at least `num_points` elements.
#[no_mangle]
pub unsafe extern "C" fn radar_ring_accumulate(
    ring: *mut RadarRing,
    header: *const RadarPointCloudHeader,
    points: *const RadarPoint,
    num_points: usize,
    fix: RadarEnuFix,
) -> usize {
    if ring.is_null() || header.is_null() {
        return 0;
    }
    let ring = &mut (*ring).0;
    let header = &*header;

    let mut cloud = Cloud::empty();
    cloud.frame_index = header.frame_index;
    cloud.timestamp = header.timestamp;
    cloud.mount_position = header.mount_position;
    cloud.num_points_expected = header.num_points;
    cloud.num_points_received = header.num_points;
    cloud.radar_range = header.radar_range;
    cloud.mode = header.mode;

    if !points.is_null() {
        let slice = std::slice::from_raw_parts(points, num_points);
        for (dst, src) in cloud.points.iter_mut().zip(slice) {
            *dst = Point {
                x_meters: src.x_meters,
                y_meters: src.y_meters,
                z_meters: src.z_meters,
                radar_relative_radial_velocity_m_s: src.radial_velocity_m_s,
                signal_to_noise_ratio: src.signal_to_noise_ratio,
                ground_relative_radial_velocity_m_s: src.ground_radial_velocity_m_s,
            };
        }
    }

    let mut filter = StaticPointsFilter;
    ring.accumulate(&cloud, EnuFix::from(fix), Some(&mut filter));
    ring.count_clouds()
}

/// Frees a ring allocated by `radar_ring_new`.
///
/// # Safety
/// `ring` must be a pointer returned by `radar_ring_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn radar_ring_free(ring: *mut RadarRing) {
    if !ring.is_null() {
        drop(Box::from_raw(ring));
    }
}

/// Returns the last error message, or NULL if the last call succeeded. Valid until the next
/// fallible `radar_*` call.
#[no_mangle]
pub extern "C" fn radar_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
