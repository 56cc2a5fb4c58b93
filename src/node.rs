//! Core node trait and context types.

use dasp_graph::{Buffer, Input};

/// Information available during audio processing.
///
/// Passed to every [`AudioNode::process`] call. Contains the context's sample rate
/// and the block size (always 64 frames).
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// Sample rate of the processing context in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,
    /// Number of frames per block (currently always 64)
    pub buffer_size: usize,
}

/// Unique identifier for a node.
///
/// Ids carry the graph they were issued by, so an id from a closed context
/// is never mistaken for a node of the next one. The router only ever holds
/// these; the graph owns the nodes themselves.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId {
    pub(crate) graph: u32,
    pub(crate) index: u32,
}

impl NodeId {
    /// Id of the graph this node belongs to.
    pub fn graph_id(&self) -> u32 {
        self.graph
    }
}

/// The core trait for audio processing nodes.
///
/// Nodes come in three shapes:
/// - **Sources**: 0 inputs, 1+ outputs - the microphone source
/// - **Effects**: 1+ inputs, 1+ outputs - the suppression stage, the channel merger
/// - **Destination**: the terminal node whose output is handed to the device
///
/// # Message-Based Parameters
///
/// Nodes don't share mutable state with the control thread. Instead they receive
/// messages, drained at the start of each block:
///
/// ```
/// use stille::{AudioNode, ProcessContext};
/// use dasp_graph::{Buffer, Input};
///
/// enum TrimMessage {
///     SetLevel(f32),
/// }
///
/// struct Trim {
///     level: f32,
/// }
///
/// impl AudioNode for Trim {
///     type Message = TrimMessage;
///
///     fn process(
///         &mut self,
///         _ctx: &ProcessContext,
///         messages: impl Iterator<Item = TrimMessage>,
///         inputs: &[Input],
///         outputs: &mut [Buffer],
///     ) {
///         for msg in messages {
///             match msg {
///                 TrimMessage::SetLevel(l) => self.level = l,
///             }
///         }
///
///         let Some(input) = inputs.first() else {
///             outputs[0].iter_mut().for_each(|s| *s = 0.0);
///             return;
///         };
///         for (out, inp) in outputs[0].iter_mut().zip(input.buffers()[0].iter()) {
///             *out = inp * self.level;
///         }
///     }
///
///     fn num_inputs(&self) -> usize { 1 }
/// }
/// ```
///
/// Nodes without runtime parameters use `()` as their message type.
pub trait AudioNode: Send + 'static {
    /// Message type for parameter updates.
    ///
    /// Use a custom enum for nodes with parameters, or `()` for nodes without.
    type Message: Send + 'static;

    /// Process one block of audio.
    ///
    /// Called once per block (64 frames) on the render thread. Implementations should:
    /// 1. Drain and handle all pending messages
    /// 2. Read from `inputs` (if any)
    /// 3. Write every buffer in `outputs`
    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = Self::Message>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    );

    /// Number of connectable inputs (0 for sources).
    fn num_inputs(&self) -> usize { 0 }

    /// Number of output channels.
    fn num_outputs(&self) -> usize { 1 }
}
