//! RNNoise suppression module, backed by the nnnoiseless crate (pure Rust).

use crate::config::{ChannelCountMode, ProcessorOptions, SUPPRESSOR_PROCESSOR_NAME};
use crate::error::{Error, Result};
use crate::module::{FrameProcessor, ProcessorModule, ProcessorRegistry};

/// Identifier the RNNoise module is loaded by.
pub const RNNOISE_MODULE_ID: &str = "nnnoiseless/rnnoise";

/// RNNoise works on i16-range floats; the graph uses normalized ones.
const I16_SCALE: f32 = 32768.0;

/// RNNoise-based suppressor.
///
/// Requires 48kHz input; it has no notion of sample rate, so feeding it anything
/// else produces garbage rather than an error.
pub struct RnnoiseSuppressor {
    state: Box<nnnoiseless::DenoiseState<'static>>,
    scaled_in: Vec<f32>,
    scaled_out: Vec<f32>,
}

impl RnnoiseSuppressor {
    pub fn new() -> Self {
        Self {
            // DenoiseState::new() returns Box<DenoiseState<'static>>
            state: nnnoiseless::DenoiseState::new(),
            scaled_in: vec![0.0; Self::FRAME_SIZE],
            scaled_out: vec![0.0; Self::FRAME_SIZE],
        }
    }

    /// 480 samples = 10ms at 48kHz
    pub const FRAME_SIZE: usize = nnnoiseless::DenoiseState::<'static>::FRAME_SIZE;
}

impl Default for RnnoiseSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameProcessor for RnnoiseSuppressor {
    fn frame_size(&self) -> usize {
        Self::FRAME_SIZE
    }

    fn process_frame(&mut self, input: &[f32], output: &mut [f32]) {
        for (scaled, &s) in self.scaled_in.iter_mut().zip(input) {
            *scaled = s * I16_SCALE;
        }
        self.state.process_frame(&mut self.scaled_out, &self.scaled_in);
        for (out, &s) in output.iter_mut().zip(&self.scaled_out) {
            *out = s / I16_SCALE;
        }
    }

    fn reset(&mut self) {
        self.state = nnnoiseless::DenoiseState::new();
    }
}

/// The module defining the RNNoise processor under
/// [`SUPPRESSOR_PROCESSOR_NAME`](crate::config::SUPPRESSOR_PROCESSOR_NAME).
#[derive(Clone, Copy, Debug, Default)]
pub struct RnnoiseModule;

impl RnnoiseModule {
    fn check_options(options: &ProcessorOptions) -> Result<()> {
        let mono = options.channel_count == 1
            && matches!(
                options.channel_count_mode,
                ChannelCountMode::Explicit | ChannelCountMode::ClampedMax
            );
        if mono {
            Ok(())
        } else {
            Err(Error::InvalidProcessorOptions {
                name: SUPPRESSOR_PROCESSOR_NAME.to_string(),
                reason: format!(
                    "processes exactly one channel, got {} ({:?})",
                    options.channel_count, options.channel_count_mode
                ),
            })
        }
    }
}

impl ProcessorModule for RnnoiseModule {
    fn id(&self) -> &str {
        RNNOISE_MODULE_ID
    }

    fn register(&self, registry: &mut ProcessorRegistry) -> Result<()> {
        registry.define(SUPPRESSOR_PROCESSOR_NAME, |options: &ProcessorOptions| {
            Self::check_options(options)?;
            Ok(Box::new(RnnoiseSuppressor::new()) as Box<dyn FrameProcessor>)
        })
    }
}
