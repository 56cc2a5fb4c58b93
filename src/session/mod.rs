//! Monitoring sessions.
//!
//! A [`Session`] plays the microphone back through the output device, either
//! raw or through the noise suppressor, and switches between the two without
//! re-acquiring anything. It is built from four parts, each usable on its own:
//!
//! 1. [`probe`] - checks whether a context can run the suppressor
//! 2. [`resources`] - lazily creates the context and opens the microphone
//! 3. [`graph_builder`] - builds the node set once per context
//! 4. [`router`] - wires the nodes into exactly one path
//!
//! `start` and `stop` never fail. Errors are logged, kept in
//! [`last_error`](Session::last_error) and reported as [`SessionEvent`]s.

pub mod graph_builder;
pub mod probe;
pub mod resources;
pub mod router;

pub use graph_builder::GraphNodes;
pub use probe::Capability;
pub use router::Route;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use crate::config::{RestartPolicy, SessionConfig, TARGET_SAMPLE_RATE};
use crate::context::AudioContext;
use crate::error::{Error, Result};
use crate::event::{EventCallback, FallbackReason, SessionEvent};
use crate::host::AudioHost;
use crate::module::{ProcessorModule, RnnoiseModule};
use crate::stream::MediaStream;

/// What the caller asks `start` for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Microphone straight to the speakers.
    Raw,
    /// Microphone through the noise suppressor.
    Suppressed,
}

/// Microphone monitoring with optional noise suppression.
///
/// # Example
///
/// ```
/// use stille::{MockHost, Mode, Route, Session};
///
/// let host = MockHost::new();
/// let mut session = Session::new(host.clone());
///
/// assert_eq!(session.start(Mode::Suppressed), Route::Suppressed);
/// assert_eq!(session.start(Mode::Raw), Route::Raw);
///
/// session.stop();
/// assert_eq!(host.live_tracks(), 0);
/// assert_eq!(host.open_outputs(), 0);
/// ```
pub struct Session<H: AudioHost> {
    host: H,
    config: SessionConfig,
    module: Arc<dyn ProcessorModule>,
    on_event: Option<EventCallback>,

    context: Option<AudioContext>,
    stream: Option<MediaStream>,
    nodes: GraphNodes,

    last_error: Option<Error>,
}

impl<H: AudioHost> Session<H> {
    /// A session with the default configuration and the RNNoise module.
    pub fn new(host: H) -> Self {
        Self::with_config(host, SessionConfig::default())
    }

    pub fn with_config(host: H, config: SessionConfig) -> Self {
        Self {
            host,
            config,
            module: Arc::new(RnnoiseModule),
            on_event: None,
            context: None,
            stream: None,
            nodes: GraphNodes::new(),
            last_error: None,
        }
    }

    /// Use `module` to define the suppression processor (builder pattern).
    ///
    /// The module must define a processor under the configured processor name.
    pub fn with_module(mut self, module: Arc<dyn ProcessorModule>) -> Self {
        self.module = module;
        self
    }

    /// Receive [`SessionEvent`]s (builder pattern).
    pub fn on_event(mut self, callback: EventCallback) -> Self {
        self.on_event = Some(callback);
        self
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(callback) = &self.on_event {
            callback(event);
        }
    }

    /// Start monitoring in `mode`, or switch an active session to it.
    ///
    /// Returns the route the graph is in afterwards. On failure that's
    /// whatever the failed attempt left behind, usually
    /// [`Route::Disconnected`].
    pub fn start(&mut self, mode: Mode) -> Route {
        if self.is_active() && self.config.restart_policy == RestartPolicy::Rebuild {
            self.stop();
        }
        self.last_error = None;

        match self.try_start(mode) {
            Ok((route, fallback)) => {
                if let Some(reason) = fallback {
                    self.emit(SessionEvent::Fallback { reason });
                }
                let sample_rate = self.sample_rate().unwrap_or_default();
                info!(?mode, ?route, sample_rate, "monitoring");
                self.emit(SessionEvent::Started {
                    requested: mode,
                    route,
                    sample_rate,
                });
                route
            }
            Err(e) => {
                error!(?mode, error = %e, "failed to start monitoring");
                self.emit(SessionEvent::Error {
                    message: e.to_string(),
                });
                self.last_error = Some(e);
                self.route()
            }
        }
    }

    fn try_start(&mut self, mode: Mode) -> Result<(Route, Option<FallbackReason>)> {
        let ctx = resources::ensure_context(&mut self.context, &mut self.host, self.config.sample_rate)?;
        let stream = resources::ensure_input_stream(&mut self.stream, &mut self.host, &self.config.capture)?;

        let cap = probe::probe(ctx, TARGET_SAMPLE_RATE);
        self.nodes
            .ensure_graph(ctx, stream, self.module.as_ref(), &cap, &self.config)?;

        match mode {
            Mode::Raw => Ok((router::route_raw(ctx, &self.nodes)?, None)),
            Mode::Suppressed => router::route_suppressed(ctx, &mut self.nodes, &cap),
        }
    }

    /// Tear everything down: disconnect the nodes, stop the microphone, close
    /// the context and forget every handle. Does nothing when inactive.
    pub fn stop(&mut self) {
        if !self.is_active() {
            return;
        }

        if let Some(ctx) = self.context.as_mut() {
            router::safe_disconnect(ctx, &self.nodes);
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop_all_tracks();
        }
        if let Some(mut ctx) = self.context.take() {
            if let Err(e) = ctx.close() {
                warn!(context = ctx.id(), error = %e, "audio context did not close cleanly");
            }
        }
        self.nodes.clear();

        info!("monitoring stopped");
        self.emit(SessionEvent::Stopped);
    }

    /// Whether the session holds a context or a microphone.
    pub fn is_active(&self) -> bool {
        self.context.is_some() || self.stream.is_some()
    }

    /// The route read back from the graph. `Disconnected` when inactive.
    pub fn route(&self) -> Route {
        self.observed_route().unwrap_or(Route::Disconnected)
    }

    /// The route read back from the graph, `None` for unrecognized wiring.
    pub fn observed_route(&self) -> Option<Route> {
        match &self.context {
            Some(ctx) => router::observe_route(ctx, &self.nodes),
            None => Some(Route::Disconnected),
        }
    }

    /// Error of the last failed `start`, cleared by the next `start`.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn context(&self) -> Option<&AudioContext> {
        self.context.as_ref()
    }

    /// Rate of the current context.
    pub fn sample_rate(&self) -> Option<u32> {
        self.context.as_ref().map(AudioContext::sample_rate)
    }

    pub fn has_input_stream(&self) -> bool {
        self.stream.is_some()
    }

    pub fn nodes(&self) -> &GraphNodes {
        &self.nodes
    }
}

impl<H: AudioHost> Drop for Session<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A [`Session`] behind a mutex, for driving one session from several threads.
///
/// Each `start`/`stop` runs to completion before the next one begins.
pub struct SharedSession<H: AudioHost> {
    inner: Arc<Mutex<Session<H>>>,
}

impl<H: AudioHost> Clone for SharedSession<H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<H: AudioHost> SharedSession<H> {
    pub fn new(session: Session<H>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Lock the session for inspection.
    ///
    /// A session whose lock was poisoned is still handed out; `start` and
    /// `stop` leave it consistent at every step.
    pub fn lock(&self) -> MutexGuard<'_, Session<H>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(&self, mode: Mode) -> Route {
        self.lock().start(mode)
    }

    pub fn stop(&self) {
        self.lock().stop()
    }
}
