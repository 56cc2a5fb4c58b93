//! Audio I/O backends
//!
//! An [`AudioHost`] opens the two device ends of a processing context: the
//! output device the render thread feeds, and the capture tracks filling a
//! sample ring. Both sides talk to the graph only through `rtrb` rings, so a
//! host never sees a node.

#[cfg(feature = "cpal_io")]
mod cpal_host;
mod mock;

#[cfg(feature = "cpal_io")]
pub use self::cpal_host::CpalHost;
pub use self::mock::MockHost;

use rtrb::{Consumer, Producer};

use crate::config::CaptureConstraints;
use crate::error::Result;

/// What the runtime behind a host can do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Whether processing modules can be loaded into its contexts.
    pub processing_modules: bool,
}

/// Settings a capture track actually runs with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackSettings {
    pub channel_count: u16,
    pub sample_rate: u32,
}

/// Device factory for processing contexts and input streams.
pub trait AudioHost: Send {
    fn capabilities(&self) -> HostCapabilities;

    /// Open the output device, asking for `sample_rate`.
    ///
    /// The device may settle on a different rate; callers must read
    /// [`OutputDevice::sample_rate`] back.
    fn open_output(&mut self, sample_rate: u32) -> Result<Box<dyn OutputDevice>>;

    /// Open the microphone with `constraints`.
    ///
    /// Captured audio is pushed into `sink` as mono f32, already down-mixed.
    fn open_input(
        &mut self,
        constraints: &CaptureConstraints,
        sink: Producer<f32>,
    ) -> Result<Vec<Box<dyn CaptureTrack>>>;
}

/// An opened output device.
///
/// Starts paused. Plays interleaved samples from the ring given to
/// [`attach`](OutputDevice::attach), outputting silence when it runs dry.
pub trait OutputDevice: Send {
    fn name(&self) -> &str;

    /// The rate the device actually runs at.
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> usize;

    /// Hand the device the ring it plays from. Only one ring per device.
    fn attach(&mut self, source: Consumer<f32>) -> Result<()>;

    fn play(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    /// Release the device. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// One live capture track of an input stream.
pub trait CaptureTrack: Send {
    fn label(&self) -> &str;

    fn settings(&self) -> TrackSettings;

    fn is_live(&self) -> bool;

    /// Stop capturing and release the device handle. Idempotent.
    fn stop(&mut self);
}
