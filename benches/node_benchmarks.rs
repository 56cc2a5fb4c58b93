use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dasp_graph::{Buffer, Input};
use dasp_signal::Signal;

use stille::module::RnnoiseSuppressor;
use stille::nodes::{ChannelMerger, Destination, ModuleProcessor};
use stille::{AudioGraph, AudioNode, FrameProcessor, ProcessContext, ProcessorOptions};

/// White noise at a speaking-voice level, standing in for a microphone.
struct Noise(dasp_signal::Noise);

impl AudioNode for Noise {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for s in outputs[0].iter_mut() {
            *s = (self.0.next() * 0.1) as f32;
        }
    }
}

fn raw_graph() -> AudioGraph {
    let mut g = AudioGraph::new(0, 48000);
    let dest = g.add(Destination::new(2)).id();
    g.set_terminal(dest).unwrap();
    let src = g.add(Noise(dasp_signal::noise(0))).id();
    g.connect(src, dest, 0).unwrap();
    g
}

fn suppressed_graph() -> AudioGraph {
    let mut g = AudioGraph::new(0, 48000);
    let dest = g.add(Destination::new(2)).id();
    g.set_terminal(dest).unwrap();
    let src = g.add(Noise(dasp_signal::noise(0))).id();
    let fx = g
        .add(ModuleProcessor::new(Box::new(RnnoiseSuppressor::new()), ProcessorOptions::default()))
        .id();
    let merger = g.add(ChannelMerger::stereo()).id();
    g.connect(src, fx, 0).unwrap();
    g.connect(fx, merger, 0).unwrap();
    g.connect(fx, merger, 1).unwrap();
    g.connect(merger, dest, 0).unwrap();
    g
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("RnnoiseSuppressor.process_frame()", |b| {
        let mut suppressor = RnnoiseSuppressor::new();
        let mut noise = dasp_signal::noise(1);
        let input: Vec<f32> = (0..RnnoiseSuppressor::FRAME_SIZE)
            .map(|_| (noise.next() * 0.1) as f32)
            .collect();
        let mut output = vec![0.0; RnnoiseSuppressor::FRAME_SIZE];

        b.iter(|| suppressor.process_frame(black_box(&input), &mut output))
    });

    c.bench_function("raw path, one block", |b| {
        let mut g = raw_graph();
        b.iter(|| g.process())
    });

    c.bench_function("suppressed path, one block", |b| {
        let mut g = suppressed_graph();
        b.iter(|| g.process())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
