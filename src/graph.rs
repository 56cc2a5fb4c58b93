//! Audio graph - owns nodes, their connections and message queues

use core::marker::PhantomData;

use dasp_graph::{Buffer, Input, NodeData, Processor};
use hashbrown::HashMap;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use rtrb::{Consumer, Producer, RingBuffer};

use crate::error::{Error, Result};
use crate::node::{AudioNode, NodeId, ProcessContext};

/// Handle to a node living in an [`AudioGraph`].
///
/// Handles carry the id of the graph they were created in, so a handle from a
/// closed context can't be confused with a node of the next one.
pub struct NodeHandle<M: Send + 'static> {
    pub(crate) id: NodeId,
    pub(crate) graph_id: u32,
    pub(crate) sender: Producer<M>,
    pub(crate) _marker: PhantomData<M>,
}

impl<M: Send + 'static> NodeHandle<M> {
    /// Send a message to the node (applied next process cycle)
    ///
    /// Returns `Err(msg)` if the queue is full (message dropped)
    pub fn send(&mut self, msg: M) -> Result<(), M> {
        self.sender.push(msg).map_err(|rtrb::PushError::Full(v)| v)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn graph_id(&self) -> u32 {
        self.graph_id
    }
}

impl<M: Send + 'static> core::fmt::Debug for NodeHandle<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("graph_id", &self.graph_id)
            .finish()
    }
}

/// One edge of the graph: output of `from` feeding input port `input` of `to`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Connection {
    pub from: NodeId,
    pub to: NodeId,
    pub input: usize,
}

// Type-erased wrapper so we can store heterogeneous nodes
trait ErasedNode: Send {
    fn process_erased(&mut self, ctx: &ProcessContext, inputs: &[Input], outputs: &mut [Buffer]);
}

struct NodeWrapper<N: AudioNode> {
    node: N,
    receiver: Consumer<N::Message>,
}

impl<N: AudioNode> ErasedNode for NodeWrapper<N> {
    fn process_erased(&mut self, ctx: &ProcessContext, inputs: &[Input], outputs: &mut [Buffer]) {
        // Split borrow to avoid conflict between receiver and node
        let receiver = &mut self.receiver;
        let node = &mut self.node;

        let messages = core::iter::from_fn(|| receiver.pop().ok());
        node.process(ctx, messages, inputs, outputs);
    }
}

// Adapter for dasp_graph
struct DaspAdapter {
    node: Box<dyn ErasedNode>,
    ctx: ProcessContext,
}

impl dasp_graph::Node for DaspAdapter {
    fn process(&mut self, inputs: &[Input], outputs: &mut [Buffer]) {
        self.node.process_erased(&self.ctx, inputs, outputs);
    }
}

/// Edge weight is the destination input port.
type InnerGraph = petgraph::graph::Graph<NodeData<DaspAdapter>, usize>;

struct Slot {
    index: NodeIndex,
    num_inputs: usize,
}

/// An audio processing graph at a fixed sample rate
pub struct AudioGraph {
    id: u32,
    graph: InnerGraph,
    processor: Processor<InnerGraph>,
    ctx: ProcessContext,

    slots: HashMap<NodeId, Slot>,
    next_node_id: u32,

    terminal: Option<NodeIndex>,
}

impl AudioGraph {
    /// Create a new graph with the given id and sample rate
    pub fn new(id: u32, sample_rate: u32) -> Self {
        Self {
            id,
            graph: InnerGraph::with_capacity(16, 16),
            processor: Processor::with_capacity(16),
            ctx: ProcessContext {
                sample_rate,
                buffer_size: crate::config::RENDER_QUANTUM,
            },
            slots: HashMap::new(),
            next_node_id: 0,
            terminal: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate
    }

    /// Number of nodes ever added to this graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Add a node, returns a handle for sending messages
    pub fn add<N: AudioNode>(&mut self, node: N) -> NodeHandle<N::Message> {
        self.add_with_queue_size(node, 64)
    }

    /// Add a node with a custom message queue size
    pub fn add_with_queue_size<N: AudioNode>(&mut self, node: N, queue_size: usize) -> NodeHandle<N::Message> {
        let id = NodeId {
            graph: self.id,
            index: self.next_node_id,
        };
        self.next_node_id += 1;

        let (producer, consumer) = RingBuffer::new(queue_size);

        let num_inputs = node.num_inputs();
        // 0 outputs = sink, but dasp_graph still needs a buffer for inputs
        let num_buffers = node.num_outputs().max(1);
        let wrapper = NodeWrapper { node, receiver: consumer };
        let adapter = DaspAdapter {
            node: Box::new(wrapper),
            ctx: self.ctx,
        };

        let buffers = (0..num_buffers).map(|_| Buffer::SILENT).collect();
        let index = self.graph.add_node(NodeData::new(adapter, buffers));
        self.slots.insert(id, Slot { index, num_inputs });

        NodeHandle {
            id,
            graph_id: self.id,
            sender: producer,
            _marker: PhantomData,
        }
    }

    fn slot(&self, id: NodeId) -> Result<&Slot> {
        if id.graph != self.id {
            return Err(Error::ForeignNode(id));
        }
        self.slots.get(&id).ok_or(Error::NodeNotFound(id))
    }

    /// Whether `id` names a node of this graph.
    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.contains_key(&id)
    }

    /// Connect the output of `from` to input port `input` of `to`.
    ///
    /// Connecting the same pair and port twice is a no-op.
    pub fn connect(&mut self, from: NodeId, to: NodeId, input: usize) -> Result<()> {
        let from_idx = self.slot(from)?.index;
        let to_slot = self.slot(to)?;
        if input >= to_slot.num_inputs {
            return Err(Error::InvalidPort { node: to, port: input });
        }
        let to_idx = to_slot.index;

        let exists = self
            .graph
            .edges_directed(from_idx, Direction::Outgoing)
            .any(|e| e.target() == to_idx && *e.weight() == input);
        if !exists {
            self.graph.add_edge(from_idx, to_idx, input);
        }
        Ok(())
    }

    /// Remove every outgoing connection of `node`.
    ///
    /// Returns the number of connections removed, or [`Error::NotConnected`]
    /// if there were none.
    pub fn disconnect(&mut self, node: NodeId) -> Result<usize> {
        let idx = self.slot(node)?.index;
        let mut removed = 0;
        // remove_edge swaps indices around, so look the next edge up each time
        while let Some(edge) = self.first_outgoing(idx) {
            self.graph.remove_edge(edge);
            removed += 1;
        }
        if removed == 0 {
            return Err(Error::NotConnected(node));
        }
        Ok(removed)
    }

    fn first_outgoing(&self, idx: NodeIndex) -> Option<EdgeIndex> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .next()
            .map(|e| e.id())
    }

    /// Every connection in the graph, sorted.
    pub fn connections(&self) -> Vec<Connection> {
        let ids: HashMap<NodeIndex, NodeId> =
            self.slots.iter().map(|(id, slot)| (slot.index, *id)).collect();

        let mut out: Vec<Connection> = self
            .graph
            .edge_references()
            .filter_map(|e| {
                Some(Connection {
                    from: *ids.get(&e.source())?,
                    to: *ids.get(&e.target())?,
                    input: *e.weight(),
                })
            })
            .collect();
        out.sort();
        out
    }

    /// Set which node to process to (the destination)
    pub fn set_terminal(&mut self, node: NodeId) -> Result<()> {
        self.terminal = Some(self.slot(node)?.index);
        Ok(())
    }

    /// Process one block of audio through the graph
    pub fn process(&mut self) {
        if let Some(terminal) = self.terminal {
            self.processor.process(&mut self.graph, terminal);
        }
    }

    /// Output buffers of the terminal node from the last [`process`](Self::process).
    pub fn terminal_output(&self) -> &[Buffer] {
        match self.terminal {
            Some(t) => &self.graph[t].buffers,
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{ChannelMerger, Destination};

    /// Writes a constant into its single output.
    struct Constant(f32);

    impl AudioNode for Constant {
        type Message = f32;

        fn process(
            &mut self,
            _ctx: &ProcessContext,
            messages: impl Iterator<Item = f32>,
            _inputs: &[Input],
            outputs: &mut [Buffer],
        ) {
            for v in messages {
                self.0 = v;
            }
            outputs[0].iter_mut().for_each(|s| *s = self.0);
        }
    }

    fn graph_with_destination(channels: usize) -> (AudioGraph, NodeId) {
        let mut g = AudioGraph::new(7, 48000);
        let dest = g.add(Destination::new(channels)).id();
        g.set_terminal(dest).unwrap();
        (g, dest)
    }

    #[test]
    fn connect_is_idempotent() {
        let (mut g, dest) = graph_with_destination(2);
        let c = g.add(Constant(0.5)).id();

        g.connect(c, dest, 0).unwrap();
        g.connect(c, dest, 0).unwrap();

        assert_eq!(g.connections(), vec![Connection { from: c, to: dest, input: 0 }]);
    }

    #[test]
    fn disconnect_removes_all_outgoing() {
        let (mut g, dest) = graph_with_destination(2);
        let c = g.add(Constant(0.5)).id();
        let merger = g.add(ChannelMerger::new(2)).id();

        g.connect(c, merger, 0).unwrap();
        g.connect(c, merger, 1).unwrap();
        g.connect(merger, dest, 0).unwrap();

        assert_eq!(g.disconnect(c).unwrap(), 2);
        assert_eq!(g.connections(), vec![Connection { from: merger, to: dest, input: 0 }]);
    }

    #[test]
    fn disconnect_without_connections_errors() {
        let (mut g, _dest) = graph_with_destination(2);
        let c = g.add(Constant(0.5)).id();

        assert!(matches!(g.disconnect(c), Err(Error::NotConnected(id)) if id == c));
        assert!(matches!(g.disconnect(NodeId { graph: 7, index: 99 }), Err(Error::NodeNotFound(_))));
        assert!(matches!(g.disconnect(NodeId { graph: 8, index: 0 }), Err(Error::ForeignNode(_))));
    }

    #[test]
    fn connect_rejects_bad_port() {
        let (mut g, _dest) = graph_with_destination(2);
        let c = g.add(Constant(0.5)).id();
        let merger = g.add(ChannelMerger::new(2)).id();

        assert!(matches!(g.connect(c, merger, 2), Err(Error::InvalidPort { port: 2, .. })));
        // sources have no inputs at all
        assert!(g.connect(merger, c, 0).is_err());
    }

    #[test]
    fn processes_towards_terminal() {
        let (mut g, dest) = graph_with_destination(2);
        let mut handle = g.add(Constant(0.25));
        g.connect(handle.id(), dest, 0).unwrap();

        g.process();
        let out = g.terminal_output();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|b| b.iter().all(|&s| s == 0.25)));

        handle.send(-0.5).unwrap();
        g.process();
        assert!(g.terminal_output()[1].iter().all(|&s| s == -0.5));
    }

    #[test]
    fn unconnected_destination_is_silent() {
        let (mut g, _dest) = graph_with_destination(2);
        let _ = g.add(Constant(1.0));

        g.process();
        assert!(g.terminal_output().iter().all(|b| b.iter().all(|&s| s == 0.0)));
    }
}
