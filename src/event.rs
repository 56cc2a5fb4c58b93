//! Session events.
//!
//! Events report what a [`Session`](crate::Session) did. They are for the
//! UI layer and for logging. `start` and `stop` never return errors, so this
//! is where a caller finds out that a start failed or fell back.

use std::sync::Arc;

use crate::session::{Mode, Route};

/// Why the suppressed path was not taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    /// The host can't load processing modules.
    ModulesUnsupported,
    /// The context runs at a rate the suppressor can't process.
    SampleRateMismatch {
        /// Rate the context negotiated.
        actual: u32,
        /// Rate the suppressor needs.
        required: u32,
    },
    /// Loading the suppression module failed earlier in this session.
    ModuleFailed,
}

/// Something a session did.
///
/// # Example
///
/// ```
/// use stille::SessionEvent;
///
/// fn handle_event(event: SessionEvent) {
///     match event {
///         SessionEvent::Started { requested, route, sample_rate } => {
///             eprintln!("asked for {:?}, playing {:?} @ {}Hz", requested, route, sample_rate);
///         }
///         SessionEvent::Fallback { reason } => {
///             eprintln!("suppression unavailable: {:?}", reason);
///         }
///         SessionEvent::Stopped => eprintln!("stopped"),
///         SessionEvent::Error { message } => eprintln!("start failed: {}", message),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A start completed.
    Started {
        /// Mode the caller asked for.
        requested: Mode,
        /// Route the graph ended up in.
        route: Route,
        /// Rate the context runs at.
        sample_rate: u32,
    },

    /// Suppression was asked for but the raw path was routed instead.
    Fallback {
        /// Why.
        reason: FallbackReason,
    },

    /// A session was stopped and released its resources.
    Stopped,

    /// A start attempt failed. Whatever was acquired before the failure stays.
    Error {
        /// Description of the error.
        message: String,
    },
}

/// Callback receiving [`SessionEvent`]s.
///
/// Called on the thread driving the session, inside `start`/`stop`.
pub type EventCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;
