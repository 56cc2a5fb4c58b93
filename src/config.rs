//! Compile-time parameters and the session configuration built from them.
//!
//! Nothing here is read from files or the environment. [`SessionConfig::default`]
//! is what the demo and the tests run with; the `with_*` methods exist so tests
//! can build sessions with a different policy without touching the constants.

/// Sample rate the processing context is created at, and the rate the
/// suppression stage requires.
pub const TARGET_SAMPLE_RATE: u32 = 48_000;

/// Frames per processing block (dasp_graph's fixed buffer length).
pub const RENDER_QUANTUM: usize = 64;

/// Name the RNNoise processor is registered under.
pub const SUPPRESSOR_PROCESSOR_NAME: &str = "noise-suppressor";

/// Output ring length, in seconds of audio (per channel).
pub const OUTPUT_RING_SECONDS: f32 = 0.1;

/// Capture ring length, in seconds of audio.
pub const CAPTURE_RING_SECONDS: f32 = 0.2;

/// Captured audio older than this is dropped by the source node
/// instead of being played late.
pub const MAX_CAPTURE_BACKLOG_SECONDS: f32 = 0.05;

/// Ring capacity in samples for `seconds` of audio, at least 8192 and a power of two.
pub(crate) fn ring_capacity(sample_rate: u32, channels: usize, seconds: f32) -> usize {
    let samples = (sample_rate as f32 * seconds) as usize * channels.max(1);
    samples.next_power_of_two().max(8192)
}

/// Constraints passed to the capture subsystem when the microphone is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub channel_count: u16,
    pub sample_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    /// Mono, 48kHz, every OS-level enhancement off so the suppression stage
    /// sees the unprocessed signal.
    fn default() -> Self {
        Self {
            channel_count: 1,
            sample_rate: TARGET_SAMPLE_RATE,
            echo_cancellation: false,
            noise_suppression: false,
            auto_gain_control: false,
        }
    }
}

/// How a node's input channel count is derived from its connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelCountMode {
    /// Follow the widest input.
    Max,
    /// Follow the widest input, capped at `channel_count`.
    ClampedMax,
    /// Always exactly `channel_count`.
    Explicit,
}

/// How inputs are up/down-mixed to the node's channel count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelInterpretation {
    /// Speaker layout aware mixing (stereo to mono averages L and R).
    Speakers,
    /// Channel-by-channel; extra channels are dropped.
    Discrete,
}

/// Options a processor is instantiated with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessorOptions {
    pub channel_count: usize,
    pub channel_count_mode: ChannelCountMode,
    pub channel_interpretation: ChannelInterpretation,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            channel_count: 1,
            channel_count_mode: ChannelCountMode::Explicit,
            channel_interpretation: ChannelInterpretation::Speakers,
        }
    }
}

/// What `start()` does when a session is already active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Keep the cached context, stream and nodes; only re-route.
    Reuse,
    /// Tear everything down with `stop()` and build from scratch.
    Rebuild,
}

/// Parameters of a [`Session`](crate::Session).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub restart_policy: RestartPolicy,
    pub capture: CaptureConstraints,
    pub processor_name: &'static str,
    pub processor_options: ProcessorOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            restart_policy: RestartPolicy::Reuse,
            capture: CaptureConstraints::default(),
            processor_name: SUPPRESSOR_PROCESSOR_NAME,
            processor_options: ProcessorOptions::default(),
        }
    }
}

impl SessionConfig {
    /// Set the restart policy (builder pattern).
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Set the capture constraints (builder pattern).
    pub fn with_capture(mut self, capture: CaptureConstraints) -> Self {
        self.capture = capture;
        self
    }

    /// Set the options the suppression processor is created with (builder pattern).
    pub fn with_processor_options(mut self, options: ProcessorOptions) -> Self {
        self.processor_options = options;
        self
    }
}
