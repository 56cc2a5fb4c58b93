//! Audio effect nodes (processors with audio inputs and outputs)

mod merger;
mod module_processor;

pub use merger::ChannelMerger;
pub use module_processor::{ModuleProcessor, ProcessorMessage};
