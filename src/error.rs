use std::ffi::CString;

/// Errors surfaced by every public operation of the radar API, mirroring the
/// POSIX errno taxonomy the wire protocol was originally built against.
#[derive(Debug, thiserror::Error)]
pub enum RadarApiError {
    #[error("timeout: no packet arrived within the configured timeout")]
    Timeout,

    #[error("skipped: packet not applicable or obsolete")]
    Skipped,

    #[error("out of contexts: no free or matching context available")]
    OutOfContexts,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("not permitted: {0}")]
    NotPermitted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RadarApiError>;

/// Maps a nonzero errno-style error code, as carried in a set-mode acknowledgement, to the
/// matching variant (§7): `EAGAIN`→Timeout, `ERANGE`→Skipped, `EBUSY`→OutOfContexts,
/// `EPROTO`→Protocol, `EINVAL`→Argument, `EPERM`→NotPermitted. Any other nonzero code is
/// reported as a protocol error carrying the raw code.
pub(crate) fn from_ack_error_code(code: i32) -> RadarApiError {
    match code {
        11 => RadarApiError::Timeout,      // EAGAIN
        34 => RadarApiError::Skipped,      // ERANGE
        16 => RadarApiError::OutOfContexts, // EBUSY
        71 => RadarApiError::Protocol("radar reported a protocol error".into()), // EPROTO
        22 => RadarApiError::Argument("radar rejected the requested mode as invalid".into()), // EINVAL
        1 => RadarApiError::NotPermitted("radar does not support the requested mode".into()), // EPERM
        other => RadarApiError::Protocol(format!("radar reported error code {other}")),
    }
}

/// Thread-safe last-error storage for the C FFI layer.
///
/// Holds an owned [`CString`] so `as_ptr` can hand back a stable address without keeping the
/// lock held past the call — the previous message stays alive until the next `set`.
pub(crate) struct LastError {
    message: std::sync::Mutex<Option<CString>>,
}

impl LastError {
    pub const fn new() -> Self {
        Self {
            message: std::sync::Mutex::new(None),
        }
    }

    pub fn set(&self, err: &RadarApiError) {
        if let Ok(mut slot) = self.message.lock() {
            *slot = CString::new(err.to_string()).ok();
        }
    }

    pub fn as_ptr(&self) -> *const std::ffi::c_char {
        match self.message.lock() {
            Ok(slot) => slot.as_ref().map_or(std::ptr::null(), |s| s.as_ptr()),
            Err(_) => std::ptr::null(),
        }
    }
}
