//! Built-in audio nodes.
//!
//! Nodes are organized into three categories:
//!
//! ## Sources ([`source`])
//!
//! - [`StreamSource`] - Pulls captured microphone samples into the graph
//!
//! ## Effects ([`effect`])
//!
//! - [`ModuleProcessor`] - Hosts a frame-based processor created from a registered module
//! - [`ChannelMerger`] - Combines N mono inputs into one N-channel signal
//!
//! ## Sinks ([`sink`])
//!
//! - [`Destination`] - Terminal node; its output is what the device plays
//!
//! Only [`ModuleProcessor`] takes messages ([`ProcessorMessage`]); the rest use `()`.

pub mod source;
pub mod effect;
pub mod sink;

pub use source::StreamSource;
pub use effect::{ChannelMerger, ModuleProcessor, ProcessorMessage};
pub use sink::Destination;
