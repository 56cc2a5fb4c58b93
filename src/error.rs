//! Error types.
//!
//! The engine layers ([`AudioGraph`](crate::AudioGraph), [`AudioContext`](crate::AudioContext),
//! the hosts) return these from fallible calls. The [`Session`](crate::Session) is the
//! boundary: it logs them, keeps the last one around, and never hands one to its caller.

/// Errors produced while building, wiring, or tearing down the audio graph.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The user (or the OS) refused microphone access.
    #[error("permission denied for audio capture (check OS privacy settings)")]
    PermissionDenied,

    /// No default input device is configured.
    #[error("no audio input device available")]
    NoInputDevice,

    /// No default output device is configured.
    #[error("no audio output device available")]
    NoOutputDevice,

    /// The device exists but cannot be opened right now.
    #[error("device unavailable: {name}")]
    DeviceUnavailable {
        /// Name of the device.
        name: String,
    },

    /// The device can't run with the requested channel count / sample rate.
    #[error("device '{name}' does not support {channels} ch @ {sample_rate}Hz")]
    UnsupportedConfig {
        /// Name of the device.
        name: String,
        /// Requested channel count.
        channels: u16,
        /// Requested sample rate.
        sample_rate: u32,
    },

    /// Anything else reported by the audio backend.
    #[error("audio backend error: {0}")]
    Backend(String),

    /// The processing context was closed; its nodes are gone.
    #[error("processing context is closed")]
    ContextClosed,

    /// A node handle from another processing context was used.
    #[error("node {0:?} belongs to a different processing context")]
    ForeignNode(crate::NodeId),

    /// The node is not part of this graph.
    #[error("node {0:?} not found in graph")]
    NodeNotFound(crate::NodeId),

    /// `disconnect` was called on a node without outgoing connections.
    #[error("node {0:?} has no outgoing connections")]
    NotConnected(crate::NodeId),

    /// An output or input index outside the node's channel layout.
    #[error("invalid port {port} on node {node:?}")]
    InvalidPort {
        /// Node the port was requested on.
        node: crate::NodeId,
        /// Offending port index.
        port: usize,
    },

    /// A module with this id was already registered with the context.
    #[error("module '{0}' is already registered")]
    ModuleAlreadyRegistered(String),

    /// The module failed to register its processors.
    #[error("module '{module}' failed to register: {reason}")]
    ModuleRegistration {
        /// Module id.
        module: String,
        /// Why registration failed.
        reason: String,
    },

    /// No processor was registered under this name.
    #[error("no processor registered as '{0}'")]
    UnknownProcessor(String),

    /// The processor rejected its construction options.
    #[error("invalid options for processor '{name}': {reason}")]
    InvalidProcessorOptions {
        /// Processor name.
        name: String,
        /// What was wrong with the options.
        reason: String,
    },

    /// The stream's sample ring was already handed to a source node.
    #[error("input stream is already attached to a source node")]
    StreamAlreadyAttached,

    /// A worker thread (render or device) panicked.
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),

    /// A lock was poisoned by a panicking thread.
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

impl Error {
    /// Creates a backend error from anything printable.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    /// Creates a module registration error.
    pub fn registration(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ModuleRegistration {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is a device/permission failure from the capture side.
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied
                | Self::NoInputDevice
                | Self::DeviceUnavailable { .. }
                | Self::UnsupportedConfig { .. }
        )
    }
}

/// Crate result alias.
pub type Result<T, E = Error> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_config_display() {
        let err = Error::UnsupportedConfig {
            name: "USB Mic".to_string(),
            channels: 1,
            sample_rate: 48000,
        };
        assert_eq!(err.to_string(), "device 'USB Mic' does not support 1 ch @ 48000Hz");
    }

    #[test]
    fn test_registration_error() {
        let err = Error::registration("rnnoise", "out of memory");
        assert_eq!(err.to_string(), "module 'rnnoise' failed to register: out of memory");
    }

    #[test]
    fn test_capture_failures() {
        assert!(Error::PermissionDenied.is_capture_failure());
        assert!(Error::NoInputDevice.is_capture_failure());
        assert!(!Error::ContextClosed.is_capture_failure());
    }
}
