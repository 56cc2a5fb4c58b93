//! Destination node - where every routed path ends

use dasp_graph::{Buffer, Input};
use crate::node::{AudioNode, ProcessContext};

/// The terminal node of a processing context.
///
/// Sums everything connected to it into `channels` output buffers, which the
/// render thread interleaves into the output device's ring buffer.
/// A mono input is copied to every channel; a wider input maps channel for
/// channel, and channels beyond the destination's width are ignored.
pub struct Destination {
    channels: usize,
}

impl Destination {
    /// Create a destination with the output device's channel count
    pub fn new(channels: usize) -> Self {
        Self { channels: channels.max(1) }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl AudioNode for Destination {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = Self::Message>,
        inputs: &[Input],
        output: &mut [Buffer],
    ) {
        for buf in output.iter_mut() {
            buf.iter_mut().for_each(|s| *s = 0.0);
        }

        for input in inputs {
            let buffers = input.buffers();
            if buffers.is_empty() {
                continue;
            }

            for (out_ch, out_buf) in output.iter_mut().enumerate() {
                // mono input feeds every channel
                let in_ch = if buffers.len() == 1 { 0 } else { out_ch };
                let Some(in_buf) = buffers.get(in_ch) else {
                    continue;
                };
                for (out_sample, in_sample) in out_buf.iter_mut().zip(in_buf.iter()) {
                    *out_sample += *in_sample;
                }
            }
        }
    }

    fn num_inputs(&self) -> usize {
        // Accept any number of inputs
        usize::MAX
    }

    fn num_outputs(&self) -> usize {
        self.channels
    }
}
