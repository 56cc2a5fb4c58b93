//! Microphone source node
//!
//! Bridges the capture callback (which pushes into a ring buffer on the device's
//! thread) into the graph. Samples are expected at the context's sample rate;
//! nothing here resamples.

use dasp_graph::{Buffer, Input};
use rtrb::Consumer;

use crate::node::{AudioNode, ProcessContext};

/// A mono source reading captured samples from a ring buffer.
///
/// Outputs silence when the ring runs dry. When the ring has piled up more than
/// `max_backlog` samples (e.g. while the source was not routed anywhere and so
/// not being processed) the oldest samples are dropped, keeping monitoring latency bounded.
pub struct StreamSource {
    consumer: Consumer<f32>,
    max_backlog: usize,
}

impl StreamSource {
    pub fn new(consumer: Consumer<f32>, max_backlog: usize) -> Self {
        Self { consumer, max_backlog }
    }

    fn drop_stale(&mut self, block: usize) {
        let backlog = self.consumer.slots();
        let keep = self.max_backlog + block;
        if backlog > keep {
            if let Ok(chunk) = self.consumer.read_chunk(backlog - keep) {
                chunk.commit_all();
            }
        }
    }
}

impl AudioNode for StreamSource {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        let Some((first, rest)) = outputs.split_first_mut() else {
            return;
        };

        self.drop_stale(first.len());

        for sample in first.iter_mut() {
            *sample = self.consumer.pop().unwrap_or(0.0);
        }

        for buffer in rest.iter_mut() {
            buffer.copy_from_slice(first);
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize { 0 }

    #[inline]
    fn num_outputs(&self) -> usize { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AudioGraph;
    use crate::nodes::Destination;
    use rtrb::RingBuffer;

    fn setup(max_backlog: usize) -> (AudioGraph, rtrb::Producer<f32>) {
        let (producer, consumer) = RingBuffer::new(4096);
        let mut g = AudioGraph::new(0, 48000);
        let dest = g.add(Destination::new(1)).id();
        g.set_terminal(dest).unwrap();
        let src = g.add(StreamSource::new(consumer, max_backlog)).id();
        g.connect(src, dest, 0).unwrap();
        (g, producer)
    }

    #[test]
    fn plays_captured_samples_then_silence() {
        let (mut g, mut producer) = setup(1024);
        for i in 0..32 {
            producer.push(i as f32 / 100.0).unwrap();
        }

        g.process();
        let out = &g.terminal_output()[0];
        assert!((out[5] - 0.05).abs() < 1e-6);
        assert!((out[31] - 0.31).abs() < 1e-6);
        assert!(out[32..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn drops_backlog_beyond_limit() {
        let (mut g, mut producer) = setup(64);
        for i in 0..1000 {
            producer.push(i as f32).unwrap();
        }

        g.process();
        // keeps max_backlog + one block, reads the oldest of those
        let out = &g.terminal_output()[0];
        assert_eq!(out[0], (1000 - 128) as f32);
    }
}
