//! Stille - microphone monitoring with optional noise suppression
//!
//! Design principles:
//! - One processing context per session, bound to the output device's sample rate
//! - Nodes are built once per context and only ever rewired, never rebuilt
//! - Switching paths always disconnects everything first; there's no mode flag to go stale
//! - Nodes receive parameters via message ring buffers, not shared state
//! - Devices sit behind [`AudioHost`], so everything above runs against [`MockHost`] too
//!
//! ```no_run
//! # #[cfg(feature = "cpal_io")]
//! # fn main() {
//! use stille::{CpalHost, Mode, Session};
//!
//! let mut session = Session::new(CpalHost::new());
//! session.start(Mode::Suppressed);
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! session.start(Mode::Raw);
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! session.stop();
//! # }
//! # #[cfg(not(feature = "cpal_io"))]
//! # fn main() {}
//! ```

pub mod config;
mod context;
mod error;
mod event;
mod graph;
pub mod host;
pub mod module;
mod node;
pub mod nodes;
pub mod session;
mod stream;

pub use config::{CaptureConstraints, ProcessorOptions, RestartPolicy, SessionConfig};
pub use context::{AudioContext, ContextState};
pub use error::{Error, Result};
pub use event::{EventCallback, FallbackReason, SessionEvent};
pub use graph::{AudioGraph, Connection, NodeHandle};
#[cfg(feature = "cpal_io")]
pub use host::CpalHost;
pub use host::{AudioHost, CaptureTrack, HostCapabilities, MockHost, OutputDevice, TrackSettings};
pub use module::{FrameProcessor, ProcessorModule, ProcessorRegistry, RnnoiseModule};
pub use node::{AudioNode, NodeId, ProcessContext};
pub use session::{Mode, Route, Session, SharedSession};
pub use stream::MediaStream;
