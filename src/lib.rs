//! # radar-telemetry - client-side runtime for radar sensor telemetry
//!
//! Receives, reassembles, and spatially accumulates radar point clouds and ego-motion
//! estimates delivered as a connectionless UDP stream from one or more mount-position-identified
//! radars. Provides:
//! - Per-radar frame reassembly with cross-version packet decoding and frame-index wraparound
//!   recovery
//! - A fixed-capacity ring of past frames tagged with world-frame pose, with on-demand
//!   rigid-body re-projection to a queried current pose
//! - A static-points accumulation filter driven by an estimate of the radar's own velocity
//! - A one-shot mode-change command and a default UDP transport
//! - C FFI for integration with C/C++ call sites
//!
//! ## Quick Start
//! ```no_run
//! use radar_telemetry::{ReceiveConfig, ReceiveSession};
//!
//! let mut session = ReceiveSession::open(ReceiveConfig::default()).unwrap();
//! loop {
//!     match session.receive_one() {
//!         Ok(()) => {}
//!         Err(radar_telemetry::RadarApiError::Timeout) => break,
//!         Err(e) => eprintln!("receive error: {e}"),
//!     }
//! }
//! ```

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod ego_motion;
pub mod error;
pub mod ffi;
pub mod geometry;
pub mod mode_command;
pub mod packet;
pub mod point_cloud;
pub mod position;
pub mod ring;
pub mod filter;
pub mod router;
pub mod transport;
pub mod wire;

pub use config::ReceiveConfig;
pub use context::{Cloud, EgoMotion, EgoMotionContext, PointCloudContext};
pub use error::{RadarApiError, Result};
pub use filter::StaticPointsFilter;
pub use geometry::{EnuFix, EnuPosition, Quaternion};
pub use mode_command::set_radar_mode;
pub use packet::Point;
pub use position::{MountPosition, RadarMode, RadarRange};
pub use ring::{AccumulatedCloud, AccumulationFilter, Ring, RingIterator};
pub use transport::UdpTransport;

/// Ties a [`UdpTransport`] to a set of per-radar reassembly contexts (§6.5): each call to
/// [`ReceiveSession::receive_one`] reads exactly one datagram and dispatches it to whichever
/// context the packet's mount position belongs to.
///
/// Closing is implicit: dropping a `ReceiveSession` drops the underlying `UdpTransport`, which
/// closes the socket.
pub struct ReceiveSession {
    transport: UdpTransport,
    point_cloud_contexts: Vec<PointCloudContext>,
    ego_motion_contexts: Vec<EgoMotionContext>,
}

impl ReceiveSession {
    /// Opens a transport per `config` and allocates `config.num_contexts` unbound reassembly
    /// contexts of each kind.
    pub fn open(config: ReceiveConfig) -> Result<Self> {
        let transport = UdpTransport::open(&config)?;
        let point_cloud_contexts = (0..config.num_contexts)
            .map(|_| PointCloudContext::new())
            .collect();
        let ego_motion_contexts = (0..config.num_contexts)
            .map(|_| EgoMotionContext::new())
            .collect();

        Ok(Self {
            transport,
            point_cloud_contexts,
            ego_motion_contexts,
        })
    }

    /// Reads one datagram and dispatches it as a point-cloud fragment, falling back to ego-motion
    /// on [`RadarApiError::Skipped`], mirroring the reference receive loop's packet-type probing.
    pub fn receive_one(&mut self) -> Result<()> {
        let bytes = self.transport.recv()?;

        match point_cloud::handle_possible_fragment(&mut self.point_cloud_contexts, &bytes) {
            Err(RadarApiError::Skipped) => {
                ego_motion::handle_possible_packet(&mut self.ego_motion_contexts, &bytes)
            }
            other => other,
        }
    }

    pub fn point_cloud_contexts(&mut self) -> &mut [PointCloudContext] {
        &mut self.point_cloud_contexts
    }

    pub fn ego_motion_contexts(&mut self) -> &mut [EgoMotionContext] {
        &mut self.ego_motion_contexts
    }
}
