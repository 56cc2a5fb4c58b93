//! Microphone input streams

use rtrb::{Consumer, RingBuffer};
use tracing::debug;

use crate::config::{ring_capacity, CaptureConstraints, CAPTURE_RING_SECONDS};
use crate::error::{Error, Result};
use crate::host::{AudioHost, CaptureTrack};

/// A live capture: its tracks plus the ring they fill.
///
/// The ring is handed over once, to the source node built from the stream.
pub struct MediaStream {
    tracks: Vec<Box<dyn CaptureTrack>>,
    consumer: Option<Consumer<f32>>,
}

impl MediaStream {
    /// Ask `host` for the microphone.
    pub fn open<H: AudioHost + ?Sized>(host: &mut H, constraints: &CaptureConstraints) -> Result<Self> {
        let capacity = ring_capacity(constraints.sample_rate, 1, CAPTURE_RING_SECONDS);
        let (producer, consumer) = RingBuffer::new(capacity);
        let tracks = host.open_input(constraints, producer)?;

        Ok(Self {
            tracks,
            consumer: Some(consumer),
        })
    }

    pub fn tracks(&self) -> &[Box<dyn CaptureTrack>] {
        &self.tracks
    }

    /// Whether any track is still capturing.
    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(|t| t.is_live())
    }

    /// Stop every track. Idempotent.
    pub fn stop_all_tracks(&mut self) {
        for track in self.tracks.iter_mut() {
            if track.is_live() {
                debug!(track = track.label(), "stopping capture track");
            }
            track.stop();
        }
    }

    /// Take the captured-sample ring.
    pub(crate) fn take_consumer(&mut self) -> Result<Consumer<f32>> {
        self.consumer.take().ok_or(Error::StreamAlreadyAttached)
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop_all_tracks();
    }
}

impl core::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MediaStream")
            .field("tracks", &self.tracks.len())
            .field("attached", &self.consumer.is_none())
            .finish()
    }
}
