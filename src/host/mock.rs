//! Hardware-free host for tests and CI
//!
//! Clones share one state, so a test keeps a clone to script failures, feed
//! capture samples and count what the session opened and released.

use std::sync::{Arc, Mutex, MutexGuard};

use rtrb::{Consumer, Producer};

use crate::config::CaptureConstraints;
use crate::error::{Error, Result};
use crate::host::{AudioHost, CaptureTrack, HostCapabilities, OutputDevice, TrackSettings};

/// A scripted [`AudioHost`].
///
/// ```
/// use stille::{AudioHost, MockHost};
///
/// let mut host = MockHost::new().with_output_rate(44_100);
/// let device = host.open_output(48_000).unwrap();
/// assert_eq!(device.sample_rate(), 44_100);
/// assert_eq!(host.open_outputs(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MockHost {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    output_rate: Option<u32>,
    no_processing_modules: bool,
    capture_failure: Option<CaptureFailure>,
    fail_resume: bool,
    fail_close: bool,

    outputs_opened: usize,
    open_outputs: usize,
    inputs_opened: usize,
    live_tracks: usize,
    playing: bool,
    last_constraints: Option<CaptureConstraints>,
    capture: Option<Producer<f32>>,
}

#[derive(Clone, Copy)]
enum CaptureFailure {
    PermissionDenied,
    NoDevice,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // test-only host; a poisoned lock means a test already panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Output devices run at `rate` whatever rate is requested.
    pub fn with_output_rate(self, rate: u32) -> Self {
        self.state().output_rate = Some(rate);
        self
    }

    /// Report that processing modules can't be loaded.
    pub fn without_processing_modules(self) -> Self {
        self.state().no_processing_modules = true;
        self
    }

    /// Refuse microphone access.
    pub fn deny_capture(self) -> Self {
        self.state().capture_failure = Some(CaptureFailure::PermissionDenied);
        self
    }

    /// Pretend there is no microphone.
    pub fn without_input_device(self) -> Self {
        self.state().capture_failure = Some(CaptureFailure::NoDevice);
        self
    }

    /// Output devices fail to start playing.
    pub fn fail_resume(self) -> Self {
        self.state().fail_resume = true;
        self
    }

    /// Output devices fail to close (they are released anyway).
    pub fn fail_close(self) -> Self {
        self.state().fail_close = true;
        self
    }

    /// Output devices opened so far.
    pub fn outputs_opened(&self) -> usize {
        self.state().outputs_opened
    }

    /// Output devices currently open.
    pub fn open_outputs(&self) -> usize {
        self.state().open_outputs
    }

    /// Successful microphone requests so far.
    pub fn inputs_opened(&self) -> usize {
        self.state().inputs_opened
    }

    /// Capture tracks not yet stopped.
    pub fn live_tracks(&self) -> usize {
        self.state().live_tracks
    }

    /// Whether any output device is playing.
    pub fn is_playing(&self) -> bool {
        self.state().playing
    }

    /// Constraints of the last microphone request, granted or not.
    pub fn last_constraints(&self) -> Option<CaptureConstraints> {
        self.state().last_constraints.clone()
    }

    /// Push samples as if the microphone captured them.
    ///
    /// Returns how many were accepted; zero when no track is live.
    pub fn feed_capture(&self, samples: &[f32]) -> usize {
        let mut state = self.state();
        let Some(producer) = state.capture.as_mut() else {
            return 0;
        };
        samples
            .iter()
            .take_while(|&&s| producer.push(s).is_ok())
            .count()
    }
}

impl AudioHost for MockHost {
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities {
            processing_modules: !self.state().no_processing_modules,
        }
    }

    fn open_output(&mut self, sample_rate: u32) -> Result<Box<dyn OutputDevice>> {
        let mut state = self.state();
        state.outputs_opened += 1;
        state.open_outputs += 1;
        let rate = state.output_rate.unwrap_or(sample_rate);

        Ok(Box::new(MockOutput {
            host: self.clone(),
            sample_rate: rate,
            source: None,
            open: true,
        }))
    }

    fn open_input(
        &mut self,
        constraints: &CaptureConstraints,
        sink: Producer<f32>,
    ) -> Result<Vec<Box<dyn CaptureTrack>>> {
        let mut state = self.state();
        state.last_constraints = Some(constraints.clone());
        match state.capture_failure {
            Some(CaptureFailure::PermissionDenied) => return Err(Error::PermissionDenied),
            Some(CaptureFailure::NoDevice) => return Err(Error::NoInputDevice),
            None => {}
        }

        state.inputs_opened += 1;
        state.live_tracks += 1;
        state.capture = Some(sink);

        Ok(vec![Box::new(MockTrack {
            host: self.clone(),
            settings: TrackSettings {
                channel_count: constraints.channel_count,
                sample_rate: constraints.sample_rate,
            },
            live: true,
        })])
    }
}

struct MockOutput {
    host: MockHost,
    sample_rate: u32,
    source: Option<Consumer<f32>>,
    open: bool,
}

impl OutputDevice for MockOutput {
    fn name(&self) -> &str {
        "mock output"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        2
    }

    fn attach(&mut self, source: Consumer<f32>) -> Result<()> {
        if self.source.is_some() {
            return Err(Error::backend("output device already has a source attached"));
        }
        self.source = Some(source);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let mut state = self.host.state();
        if state.fail_resume {
            return Err(Error::backend("mock output refused to start"));
        }
        state.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.host.state().playing = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.source = None;

        let mut state = self.host.state();
        state.open_outputs -= 1;
        state.playing = false;
        if state.fail_close {
            return Err(Error::backend("mock output failed to close"));
        }
        Ok(())
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct MockTrack {
    host: MockHost,
    settings: TrackSettings,
    live: bool,
}

impl CaptureTrack for MockTrack {
    fn label(&self) -> &str {
        "mock microphone"
    }

    fn settings(&self) -> TrackSettings {
        self.settings
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;

        let mut state = self.host.state();
        state.live_tracks -= 1;
        state.capture = None;
    }
}

impl Drop for MockTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtrb::RingBuffer;

    #[test]
    fn counts_open_and_closed_outputs() {
        let mut host = MockHost::new();
        let mut out = host.open_output(48_000).unwrap();
        assert_eq!(out.sample_rate(), 48_000);
        assert_eq!(host.open_outputs(), 1);

        out.close().unwrap();
        out.close().unwrap();
        assert_eq!(host.open_outputs(), 0);
        assert_eq!(host.outputs_opened(), 1);
    }

    #[test]
    fn denied_capture_records_constraints() {
        let mut host = MockHost::new().deny_capture();
        let (producer, _consumer) = RingBuffer::new(16);
        let err = host.open_input(&CaptureConstraints::default(), producer).err().unwrap();

        assert!(matches!(err, Error::PermissionDenied));
        assert_eq!(host.last_constraints(), Some(CaptureConstraints::default()));
        assert_eq!(host.live_tracks(), 0);
    }

    #[test]
    fn feeds_live_track_only() {
        let mut host = MockHost::new();
        let (producer, mut consumer) = RingBuffer::new(16);
        let mut tracks = host.open_input(&CaptureConstraints::default(), producer).unwrap();

        assert_eq!(host.feed_capture(&[0.5, -0.5]), 2);
        assert_eq!(consumer.pop().ok(), Some(0.5));

        tracks[0].stop();
        assert!(!tracks[0].is_live());
        assert_eq!(host.live_tracks(), 0);
        assert_eq!(host.feed_capture(&[1.0]), 0);
    }
}
