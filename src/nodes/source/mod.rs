//! Audio source nodes (no audio inputs)

mod stream_source;

pub use stream_source::StreamSource;
