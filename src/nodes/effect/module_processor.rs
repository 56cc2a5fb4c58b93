//! Graph node hosting a module processor
//!
//! Processors work on their own frame size (RNNoise: 480), the graph on
//! 64-frame blocks. The node buffers between the two and so delays the signal
//! by exactly one processor frame.

use std::collections::VecDeque;

use dasp_graph::{Buffer, Input};

use crate::config::{ChannelInterpretation, ProcessorOptions};
use crate::module::FrameProcessor;
use crate::node::{AudioNode, ProcessContext};

/// Messages to control a [`ModuleProcessor`]
#[derive(Clone, Copy, Debug)]
pub enum ProcessorMessage {
    /// Drop buffered audio and the processor's internal state
    Reset,
}

/// A mono effect node wrapping a [`FrameProcessor`].
///
/// Every input connection is down-mixed to one channel according to the
/// node's [`ChannelInterpretation`] and summed.
pub struct ModuleProcessor {
    processor: Box<dyn FrameProcessor>,
    options: ProcessorOptions,
    frame_size: usize,
    pending: Vec<f32>,
    processed: VecDeque<f32>,
    frame_out: Vec<f32>,
}

impl ModuleProcessor {
    pub fn new(processor: Box<dyn FrameProcessor>, options: ProcessorOptions) -> Self {
        let frame_size = processor.frame_size().max(1);
        let mut node = Self {
            processor,
            options,
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
            processed: VecDeque::with_capacity(frame_size * 3),
            frame_out: vec![0.0; frame_size],
        };
        node.prime();
        node
    }

    /// Latency introduced by the node, in samples.
    pub fn latency(&self) -> usize {
        self.frame_size
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    // one frame of silence up front keeps `processed` from running dry between frames
    fn prime(&mut self) {
        self.pending.clear();
        self.processed.clear();
        self.processed.extend(core::iter::repeat(0.0).take(self.frame_size));
    }

    fn reset(&mut self) {
        self.processor.reset();
        self.prime();
    }

    fn mix_down(&self, inputs: &[Input], block: &mut [f32]) {
        block.iter_mut().for_each(|s| *s = 0.0);
        for input in inputs {
            let buffers = input.buffers();
            if buffers.is_empty() {
                continue;
            }
            match self.options.channel_interpretation {
                ChannelInterpretation::Speakers => {
                    let scale = 1.0 / buffers.len() as f32;
                    for buf in buffers {
                        for (out, &s) in block.iter_mut().zip(buf.iter()) {
                            *out += s * scale;
                        }
                    }
                }
                ChannelInterpretation::Discrete => {
                    for (out, &s) in block.iter_mut().zip(buffers[0].iter()) {
                        *out += s;
                    }
                }
            }
        }
    }
}

impl AudioNode for ModuleProcessor {
    type Message = ProcessorMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = ProcessorMessage>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                ProcessorMessage::Reset => self.reset(),
            }
        }

        let Some((first, rest)) = outputs.split_first_mut() else {
            return;
        };

        let mut block = Buffer::SILENT;
        self.mix_down(inputs, &mut block);
        self.pending.extend_from_slice(&block);

        while self.pending.len() >= self.frame_size {
            self.processor
                .process_frame(&self.pending[..self.frame_size], &mut self.frame_out);
            self.processed.extend(self.frame_out.iter().copied());
            self.pending.drain(..self.frame_size);
        }

        for sample in first.iter_mut() {
            *sample = self.processed.pop_front().unwrap_or(0.0);
        }
        for buffer in rest.iter_mut() {
            buffer.copy_from_slice(first);
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelCountMode;
    use crate::graph::AudioGraph;
    use crate::node::NodeId;
    use crate::nodes::Destination;

    /// Negates its input, frames of 100.
    struct Invert;

    impl FrameProcessor for Invert {
        fn frame_size(&self) -> usize { 100 }

        fn process_frame(&mut self, input: &[f32], output: &mut [f32]) {
            for (o, i) in output.iter_mut().zip(input) {
                *o = -i;
            }
        }
    }

    /// Emits a stereo pair (0.2, 0.6) every block.
    struct Pair;

    impl AudioNode for Pair {
        type Message = ();

        fn process(
            &mut self,
            _ctx: &ProcessContext,
            _messages: impl Iterator<Item = ()>,
            _inputs: &[Input],
            outputs: &mut [Buffer],
        ) {
            outputs[0].iter_mut().for_each(|s| *s = 0.2);
            outputs[1].iter_mut().for_each(|s| *s = 0.6);
        }

        fn num_outputs(&self) -> usize { 2 }
    }

    fn run(interpretation: ChannelInterpretation, blocks: usize) -> (AudioGraph, Vec<f32>, NodeId) {
        let mut g = AudioGraph::new(0, 48000);
        let dest = g.add(Destination::new(1)).id();
        g.set_terminal(dest).unwrap();
        let src = g.add(Pair).id();
        let options = ProcessorOptions {
            channel_count: 1,
            channel_count_mode: ChannelCountMode::Explicit,
            channel_interpretation: interpretation,
        };
        let fx = g.add(ModuleProcessor::new(Box::new(Invert), options)).id();
        g.connect(src, fx, 0).unwrap();
        g.connect(fx, dest, 0).unwrap();

        let mut out = Vec::new();
        for _ in 0..blocks {
            g.process();
            out.extend_from_slice(&g.terminal_output()[0]);
        }
        (g, out, fx)
    }

    #[test]
    fn delays_by_one_frame() {
        let (_, out, _) = run(ChannelInterpretation::Speakers, 4);
        assert!(out[..100].iter().all(|&s| s == 0.0));
        // speakers: (0.2 + 0.6) / 2, inverted
        assert!(out[100..].iter().all(|&s| (s + 0.4).abs() < 1e-6));
    }

    #[test]
    fn discrete_takes_first_channel() {
        let (_, out, _) = run(ChannelInterpretation::Discrete, 4);
        assert!(out[100..].iter().all(|&s| (s + 0.2).abs() < 1e-6));
    }

    #[test]
    fn reset_reprimes_latency() {
        let mut g = AudioGraph::new(0, 48000);
        let dest = g.add(Destination::new(1)).id();
        g.set_terminal(dest).unwrap();
        let src = g.add(Pair).id();
        let mut fx = g.add(ModuleProcessor::new(Box::new(Invert), ProcessorOptions::default()));
        g.connect(src, fx.id(), 0).unwrap();
        g.connect(fx.id(), dest, 0).unwrap();

        for _ in 0..4 {
            g.process();
        }
        assert!(g.terminal_output()[0][63] < 0.0);

        fx.send(ProcessorMessage::Reset).unwrap();
        g.process();
        assert!(g.terminal_output()[0].iter().all(|&s| s == 0.0));
    }
}
