//! Process-wide warning/error sinks.
//!
//! By default every diagnostic flows through the `log` facade (`log::warn!`/`log::error!`),
//! which needs no setup and is safe to use from any number of threads. Callers that need to
//! intercept diagnostics directly (for example to surface them across a C FFI boundary, the
//! way the reference implementation did with function-pointer sinks) can opt into a legacy
//! closure-based sink with `set_on_warning`/`set_on_error`.
//!
//! The legacy sinks are process-wide singletons and must be configured before any receive
//! thread starts; this mirrors the non-thread-safe contract of the original C sinks.

use std::sync::{Mutex, OnceLock};

type Sink = Box<dyn Fn(&str) + Send + Sync + 'static>;

static ON_WARNING: OnceLock<Mutex<Option<Sink>>> = OnceLock::new();
static ON_ERROR: OnceLock<Mutex<Option<Sink>>> = OnceLock::new();

fn slot(cell: &OnceLock<Mutex<Option<Sink>>>) -> &Mutex<Option<Sink>> {
    cell.get_or_init(|| Mutex::new(None))
}

/// Sets (or clears with `None`) the process-wide warning sink.
///
/// Not thread safe: call this before starting any receive thread.
pub fn set_on_warning<F>(sink: Option<F>)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    let boxed: Option<Sink> = sink.map(|f| Box::new(f) as Sink);
    if let Ok(mut guard) = slot(&ON_WARNING).lock() {
        *guard = boxed;
    }
}

/// Sets (or clears with `None`) the process-wide error sink.
///
/// Not thread safe: call this before starting any receive thread.
pub fn set_on_error<F>(sink: Option<F>)
where
    F: Fn(&str) + Send + Sync + 'static,
{
    let boxed: Option<Sink> = sink.map(|f| Box::new(f) as Sink);
    if let Ok(mut guard) = slot(&ON_ERROR).lock() {
        *guard = boxed;
    }
}

/// Publishes a recoverable-condition diagnostic (expected-count mismatch across fragments,
/// filter emptied a cloud, frame-index wraparound reset, ...).
pub(crate) fn warn(message: &str) {
    if let Ok(guard) = slot(&ON_WARNING).lock() {
        if let Some(sink) = guard.as_ref() {
            sink(message);
            return;
        }
    }
    log::warn!("{message}");
}

/// Publishes a genuine protocol violation or bind conflict.
pub(crate) fn error(message: &str) {
    if let Ok(guard) = slot(&ON_ERROR).lock() {
        if let Some(sink) = guard.as_ref() {
            sink(message);
            return;
        }
    }
    log::error!("{message}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn default_sink_does_not_panic() {
        warn("a warning");
        error("an error");
    }

    #[test]
    fn custom_sink_receives_message() {
        let captured: std::sync::Arc<StdMutex<Vec<String>>> =
            std::sync::Arc::new(StdMutex::new(Vec::new()));
        let captured2 = captured.clone();
        set_on_warning(Some(move |msg: &str| {
            captured2.lock().unwrap().push(msg.to_string());
        }));

        warn("hello");
        assert_eq!(captured.lock().unwrap().as_slice(), ["hello"]);

        set_on_warning::<fn(&str)>(None);
    }
}
