//! Lazily acquired device resources
//!
//! The context and the input stream are created on first use and then cached
//! until the session stops.

use tracing::{debug, info, warn};

use crate::config::CaptureConstraints;
use crate::context::{AudioContext, ContextState};
use crate::error::Result;
use crate::host::AudioHost;
use crate::stream::MediaStream;

/// Return the cached context, or create one at `sample_rate`.
///
/// A suspended context is resumed either way. Failing to resume is logged and
/// otherwise ignored; the graph can still be built, it just won't play.
pub fn ensure_context<'a, H: AudioHost + ?Sized>(
    slot: &'a mut Option<AudioContext>,
    host: &mut H,
    sample_rate: u32,
) -> Result<&'a mut AudioContext> {
    let ctx = match slot {
        Some(ctx) => ctx,
        None => slot.insert(AudioContext::new(host, sample_rate)?),
    };

    if ctx.state() == ContextState::Suspended {
        if let Err(e) = ctx.resume() {
            warn!(context = ctx.id(), error = %e, "could not resume audio context");
        }
    }
    Ok(ctx)
}

/// Return the cached input stream, or ask `host` for the microphone.
///
/// Failures are returned as-is; nothing is retried.
pub fn ensure_input_stream<'a, H: AudioHost + ?Sized>(
    slot: &'a mut Option<MediaStream>,
    host: &mut H,
    constraints: &CaptureConstraints,
) -> Result<&'a mut MediaStream> {
    if let Some(stream) = slot {
        debug!("reusing input stream");
        return Ok(stream);
    }

    let stream = MediaStream::open(host, constraints)?;
    info!(
        tracks = stream.tracks().len(),
        sample_rate = constraints.sample_rate,
        "microphone acquired"
    );
    Ok(slot.insert(stream))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::host::MockHost;

    #[test]
    fn context_is_created_once_and_resumed() {
        let mut host = MockHost::new();
        let mut slot = None;

        let id = ensure_context(&mut slot, &mut host, 48_000).unwrap().id();
        assert_eq!(slot.as_ref().map(|c| c.state()), Some(ContextState::Running));

        slot.as_mut().unwrap().suspend().unwrap();
        let again = ensure_context(&mut slot, &mut host, 48_000).unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(again.state(), ContextState::Running);
        assert_eq!(host.outputs_opened(), 1);
    }

    #[test]
    fn resume_failure_is_not_fatal() {
        let mut host = MockHost::new().fail_resume();
        let mut slot = None;

        let ctx = ensure_context(&mut slot, &mut host, 48_000).unwrap();
        assert_eq!(ctx.state(), ContextState::Suspended);
    }

    #[test]
    fn stream_is_requested_once() {
        let mut host = MockHost::new();
        let mut slot = None;

        ensure_input_stream(&mut slot, &mut host, &CaptureConstraints::default()).unwrap();
        ensure_input_stream(&mut slot, &mut host, &CaptureConstraints::default()).unwrap();
        assert_eq!(host.inputs_opened(), 1);
    }

    #[test]
    fn denied_stream_stays_absent() {
        let mut host = MockHost::new().deny_capture();
        let mut slot = None;

        let err = ensure_input_stream(&mut slot, &mut host, &CaptureConstraints::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::PermissionDenied));
        assert!(slot.is_none());
    }
}
