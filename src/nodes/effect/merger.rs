//! Channel merger - N mono inputs into one N-channel signal

use dasp_graph::{Buffer, Input};
use crate::node::{AudioNode, ProcessContext};

/// Merges mono inputs into a multi-channel output.
///
/// Each connected input is down-mixed to mono (channel average) and written to
/// its own output channel; channels with nothing connected are silent.
/// Channels are assigned in the order the graph hands inputs over, so the
/// intended use is feeding one signal to several ports, e.g. a mono stage
/// connected to ports 0 and 1 to play it on both stereo channels.
pub struct ChannelMerger {
    inputs: usize,
}

impl ChannelMerger {
    /// Create a merger with `inputs` ports (and as many output channels)
    pub fn new(inputs: usize) -> Self {
        Self { inputs: inputs.max(1) }
    }

    /// Two-port merger producing stereo
    pub fn stereo() -> Self {
        Self::new(2)
    }
}

impl AudioNode for ChannelMerger {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = Self::Message>,
        inputs: &[Input],
        output: &mut [Buffer],
    ) {
        for (ch, out_buf) in output.iter_mut().enumerate() {
            out_buf.iter_mut().for_each(|s| *s = 0.0);

            let Some(input) = inputs.get(ch) else {
                continue;
            };
            let buffers = input.buffers();
            if buffers.is_empty() {
                continue;
            }

            let scale = 1.0 / buffers.len() as f32;
            for in_buf in buffers {
                for (out_sample, in_sample) in out_buf.iter_mut().zip(in_buf.iter()) {
                    *out_sample += *in_sample * scale;
                }
            }
        }
    }

    fn num_inputs(&self) -> usize {
        self.inputs
    }

    fn num_outputs(&self) -> usize {
        self.inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioGraph;
    use crate::nodes::Destination;

    struct Ramp;

    impl AudioNode for Ramp {
        type Message = ();

        fn process(
            &mut self,
            _ctx: &ProcessContext,
            _messages: impl Iterator<Item = ()>,
            _inputs: &[Input],
            outputs: &mut [Buffer],
        ) {
            for (i, s) in outputs[0].iter_mut().enumerate() {
                *s = i as f32 / 64.0;
            }
        }
    }

    #[test]
    fn duplicates_mono_to_both_channels() {
        let mut g = AudioGraph::new(0, 48000);
        let dest = g.add(Destination::new(2)).id();
        g.set_terminal(dest).unwrap();
        let ramp = g.add(Ramp).id();
        let merger = g.add(ChannelMerger::stereo()).id();

        g.connect(ramp, merger, 0).unwrap();
        g.connect(ramp, merger, 1).unwrap();
        g.connect(merger, dest, 0).unwrap();

        g.process();
        let out = g.terminal_output();
        assert_eq!(out[0][..], out[1][..]);
        assert!((out[0][32] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn single_port_leaves_other_channel_silent() {
        let mut g = AudioGraph::new(0, 48000);
        let dest = g.add(Destination::new(2)).id();
        g.set_terminal(dest).unwrap();
        let ramp = g.add(Ramp).id();
        let merger = g.add(ChannelMerger::stereo()).id();

        g.connect(ramp, merger, 0).unwrap();
        g.connect(merger, dest, 0).unwrap();

        g.process();
        let out = g.terminal_output();
        assert!(out[0][10] > 0.0);
        assert!(out[1].iter().all(|&s| s == 0.0));
    }
}
