//! Processing context - a graph bound to one output device
//!
//! The context owns the graph, the output device, the processor registry and
//! a render thread. The render thread keeps the device's ring topped up with
//! processed blocks while the context is running; the control thread edits
//! the graph between blocks.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtrb::{Producer, RingBuffer};
use tracing::{debug, error, info, trace, warn};

use crate::config::{
    ring_capacity, ProcessorOptions, MAX_CAPTURE_BACKLOG_SECONDS, OUTPUT_RING_SECONDS, RENDER_QUANTUM,
};
use crate::error::{Error, Result};
use crate::graph::{AudioGraph, Connection, NodeHandle};
use crate::host::{AudioHost, HostCapabilities, OutputDevice};
use crate::module::ProcessorModule;
use crate::module::ProcessorRegistry;
use crate::node::NodeId;
use crate::nodes::{ChannelMerger, Destination, ModuleProcessor, ProcessorMessage, StreamSource};
use crate::stream::MediaStream;

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Blocks rendered per graph lock, so the control thread is never locked out for long.
const BLOCKS_PER_LOCK: usize = 8;

/// How long the render thread sleeps when there's nothing to do.
const RENDER_IDLE: Duration = Duration::from_millis(1);

/// Lifecycle state of an [`AudioContext`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextState {
    /// Created or suspended; nothing is rendered.
    Suspended,
    Running,
    /// Closed for good. Every node is gone.
    Closed,
}

/// An audio graph rendering to an output device.
///
/// Created [`Suspended`](ContextState::Suspended); call [`resume`](Self::resume)
/// to start rendering.
pub struct AudioContext {
    id: u32,
    sample_rate: u32,
    capabilities: HostCapabilities,
    state: ContextState,

    graph: Arc<Mutex<AudioGraph>>,
    destination: NodeId,
    registry: ProcessorRegistry,

    device: Box<dyn OutputDevice>,
    render: Option<RenderThread>,
    running: Arc<AtomicBool>,
}

impl AudioContext {
    /// Open `host`'s output device at (ideally) `sample_rate` and build an
    /// empty graph for it.
    pub fn new<H: AudioHost + ?Sized>(host: &mut H, sample_rate: u32) -> Result<Self> {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let mut device = host.open_output(sample_rate)?;
        let rate = device.sample_rate();
        let channels = device.channels();

        let (producer, consumer) = RingBuffer::new(ring_capacity(rate, channels, OUTPUT_RING_SECONDS));
        device.attach(consumer)?;

        let mut graph = AudioGraph::new(id, rate);
        let destination = graph.add(Destination::new(channels)).id();
        graph.set_terminal(destination)?;

        let graph = Arc::new(Mutex::new(graph));
        let running = Arc::new(AtomicBool::new(false));
        let render = RenderThread::spawn(id, graph.clone(), producer, channels, running.clone())?;

        info!(
            context = id,
            device = device.name(),
            requested = sample_rate,
            sample_rate = rate,
            channels,
            "audio context created"
        );

        Ok(Self {
            id,
            sample_rate: rate,
            capabilities: host.capabilities(),
            state: ContextState::Suspended,
            graph,
            destination,
            registry: ProcessorRegistry::new(),
            device,
            render: Some(render),
            running,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// The rate the output device actually negotiated.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Whether processing modules can be loaded into this context.
    pub fn supports_modules(&self) -> bool {
        self.capabilities.processing_modules
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ContextState::Closed => Err(Error::ContextClosed),
            _ => Ok(()),
        }
    }

    fn graph(&self) -> Result<MutexGuard<'_, AudioGraph>> {
        self.graph.lock().map_err(|_| Error::LockPoisoned("graph"))
    }

    /// Start (or continue) rendering.
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            ContextState::Closed => Err(Error::ContextClosed),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                self.device.play()?;
                self.running.store(true, Ordering::Release);
                self.state = ContextState::Running;
                if let Some(render) = &self.render {
                    render.wake();
                }
                debug!(context = self.id, "resumed");
                Ok(())
            }
        }
    }

    /// Stop rendering without releasing anything.
    pub fn suspend(&mut self) -> Result<()> {
        match self.state {
            ContextState::Closed => Err(Error::ContextClosed),
            ContextState::Suspended => Ok(()),
            ContextState::Running => {
                self.running.store(false, Ordering::Release);
                self.state = ContextState::Suspended;
                debug!(context = self.id, "suspended");
                self.device.pause()
            }
        }
    }

    /// Stop the render thread, release the output device and drop every node.
    ///
    /// The context is closed afterwards even if this returns an error.
    /// Closing a closed context does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ContextState::Closed {
            return Ok(());
        }
        self.state = ContextState::Closed;
        self.running.store(false, Ordering::Release);

        let joined = match self.render.take() {
            Some(render) => render.join(),
            None => Ok(()),
        };
        let closed = self.device.close();

        // nodes (and the capture ring the source holds) go with the graph
        let mut graph = self.graph.lock().unwrap_or_else(PoisonError::into_inner);
        *graph = AudioGraph::new(self.id, self.sample_rate);
        drop(graph);

        info!(context = self.id, "audio context closed");
        joined.and(closed)
    }

    /// Load a processing module, defining its processors in this context.
    pub fn add_module(&mut self, module: &dyn ProcessorModule) -> Result<()> {
        self.ensure_open()?;
        if !self.supports_modules() {
            return Err(Error::registration(
                module.id(),
                "this host can't load processing modules",
            ));
        }
        self.registry.load(module)?;
        debug!(context = self.id, module = module.id(), "module loaded");
        Ok(())
    }

    pub fn is_module_loaded(&self, module_id: &str) -> bool {
        self.registry.is_loaded(module_id)
    }

    /// Create a source node reading from `stream`.
    ///
    /// A stream can feed one source node only.
    pub fn create_media_stream_source(&mut self, stream: &mut MediaStream) -> Result<NodeHandle<()>> {
        self.ensure_open()?;
        let consumer = stream.take_consumer()?;
        let max_backlog = (self.sample_rate as f32 * MAX_CAPTURE_BACKLOG_SECONDS) as usize;
        Ok(self.graph()?.add(StreamSource::new(consumer, max_backlog)))
    }

    /// Create a node running the processor registered as `name`.
    pub fn create_processor(
        &mut self,
        name: &str,
        options: ProcessorOptions,
    ) -> Result<NodeHandle<ProcessorMessage>> {
        self.ensure_open()?;
        let processor = self.registry.instantiate(name, &options)?;
        Ok(self.graph()?.add(ModuleProcessor::new(processor, options)))
    }

    /// Create a merger with `inputs` mono ports and as many output channels.
    pub fn create_channel_merger(&mut self, inputs: usize) -> Result<NodeHandle<()>> {
        self.ensure_open()?;
        Ok(self.graph()?.add(ChannelMerger::new(inputs)))
    }

    /// The node feeding the output device.
    pub fn destination(&self) -> NodeId {
        self.destination
    }

    /// Connect the output of `from` to input port `input` of `to`.
    pub fn connect(&mut self, from: NodeId, to: NodeId, input: usize) -> Result<()> {
        self.ensure_open()?;
        self.graph()?.connect(from, to, input)
    }

    /// Remove every outgoing connection of `node`.
    pub fn disconnect(&mut self, node: NodeId) -> Result<usize> {
        self.ensure_open()?;
        self.graph()?.disconnect(node)
    }

    /// Every connection of the graph. Empty once closed.
    pub fn connections(&self) -> Vec<Connection> {
        self.graph
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .connections()
    }

    /// Number of nodes in the graph, the destination included. Zero once closed.
    pub fn node_count(&self) -> usize {
        self.graph
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .node_count()
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(context = self.id, error = %e, "audio context did not close cleanly");
        }
    }
}

impl core::fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioContext")
            .field("id", &self.id)
            .field("sample_rate", &self.sample_rate)
            .field("state", &self.state)
            .finish()
    }
}

struct RenderThread {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl RenderThread {
    fn spawn(
        context: u32,
        graph: Arc<Mutex<AudioGraph>>,
        output: Producer<f32>,
        channels: usize,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name(format!("stille-render-{}", context))
                .spawn(move || render_loop(context, graph, output, channels, running, shutdown))
                .map_err(Error::backend)?
        };
        Ok(Self { handle, shutdown })
    }

    fn wake(&self) {
        self.handle.thread().unpark();
    }

    fn join(self) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);
        self.wake();
        self.handle.join().map_err(|_| Error::ThreadPanicked("render"))
    }
}

fn render_loop(
    context: u32,
    graph: Arc<Mutex<AudioGraph>>,
    mut output: Producer<f32>,
    channels: usize,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    trace!(context, "render thread started");
    let channels = channels.max(1);
    let block = RENDER_QUANTUM * channels;

    while !shutdown.load(Ordering::Acquire) {
        if !running.load(Ordering::Acquire) || output.slots() < block {
            thread::park_timeout(RENDER_IDLE);
            continue;
        }

        let Ok(mut graph) = graph.lock() else {
            error!(context, "graph lock poisoned, render thread exiting");
            break;
        };
        for _ in 0..BLOCKS_PER_LOCK {
            if output.slots() < block || !running.load(Ordering::Acquire) {
                break;
            }
            graph.process();
            let buffers = graph.terminal_output();
            for i in 0..RENDER_QUANTUM {
                for ch in 0..channels {
                    let sample = buffers.get(ch).map_or(0.0, |b| b[i]);
                    // slots checked above
                    let _ = output.push(sample);
                }
            }
        }
    }
    trace!(context, "render thread stopped");
}
