//! Graph builder
//!
//! Builds the session's fixed node set once per context and caches the
//! handles. Wiring is left to the router.

use tracing::{debug, error};

use crate::config::SessionConfig;
use crate::context::AudioContext;
use crate::error::Result;
use crate::graph::NodeHandle;
use crate::module::ProcessorModule;
use crate::node::NodeId;
use crate::nodes::ProcessorMessage;
use crate::session::probe::Capability;
use crate::stream::MediaStream;

/// Cached nodes of one context, plus the module bookkeeping.
#[derive(Debug, Default)]
pub struct GraphNodes {
    pub(crate) source: Option<NodeHandle<()>>,
    pub(crate) suppressor: Option<NodeHandle<ProcessorMessage>>,
    pub(crate) merger: Option<NodeHandle<()>>,
    module_loaded: bool,
    module_failed: bool,
}

impl GraphNodes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(&self) -> Option<NodeId> {
        self.source.as_ref().map(NodeHandle::id)
    }

    pub fn suppressor(&self) -> Option<NodeId> {
        self.suppressor.as_ref().map(NodeHandle::id)
    }

    pub fn merger(&self) -> Option<NodeId> {
        self.merger.as_ref().map(NodeHandle::id)
    }

    /// Every cached node, in build order.
    pub fn ids(&self) -> Vec<NodeId> {
        [self.source(), self.suppressor(), self.merger()]
            .iter()
            .flatten()
            .copied()
            .collect()
    }

    pub fn module_loaded(&self) -> bool {
        self.module_loaded
    }

    /// Whether loading the module failed for the current context.
    pub fn module_failed(&self) -> bool {
        self.module_failed
    }

    /// Build whatever is missing: the source, then (when `cap` allows) the
    /// module and the suppressor, then the merger.
    ///
    /// A module registration failure is returned, and the module is not tried
    /// again until [`clear`](Self::clear).
    pub fn ensure_graph(
        &mut self,
        ctx: &mut AudioContext,
        stream: &mut MediaStream,
        module: &dyn ProcessorModule,
        cap: &Capability,
        config: &SessionConfig,
    ) -> Result<()> {
        if self.source.is_none() {
            let source = ctx.create_media_stream_source(stream)?;
            debug!(node = ?source.id(), "built source node");
            self.source = Some(source);
        }

        if cap.can_process() && !self.module_loaded && !self.module_failed {
            match ctx.add_module(module) {
                Ok(()) => self.module_loaded = true,
                Err(e) => {
                    error!(module = module.id(), error = %e, "suppression module failed to load");
                    self.module_failed = true;
                    return Err(e);
                }
            }
        }

        if self.module_loaded && self.suppressor.is_none() {
            let suppressor =
                ctx.create_processor(config.processor_name, config.processor_options.clone())?;
            debug!(node = ?suppressor.id(), "built suppression node");
            self.suppressor = Some(suppressor);
        }

        if self.merger.is_none() {
            let merger = ctx.create_channel_merger(2)?;
            debug!(node = ?merger.id(), "built merger node");
            self.merger = Some(merger);
        }

        Ok(())
    }

    /// Forget every handle and both module flags.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureConstraints;
    use crate::error::Error;
    use crate::host::MockHost;
    use crate::module::{ProcessorRegistry, RnnoiseModule};
    use crate::session::probe::probe;

    struct Failing;

    impl ProcessorModule for Failing {
        fn id(&self) -> &str { "failing" }

        fn register(&self, _registry: &mut ProcessorRegistry) -> Result<()> {
            Err(Error::registration("failing", "corrupt module"))
        }
    }

    fn setup(host: &mut MockHost) -> (AudioContext, MediaStream) {
        let ctx = AudioContext::new(host, 48_000).unwrap();
        let stream = MediaStream::open(host, &CaptureConstraints::default()).unwrap();
        (ctx, stream)
    }

    #[test]
    fn builds_each_node_once() {
        let mut host = MockHost::new();
        let (mut ctx, mut stream) = setup(&mut host);
        let cap = probe(&ctx, 48_000);
        let config = SessionConfig::default();
        let mut nodes = GraphNodes::new();

        nodes.ensure_graph(&mut ctx, &mut stream, &RnnoiseModule, &cap, &config).unwrap();
        let first = nodes.ids();
        assert_eq!(first.len(), 3);
        assert!(nodes.module_loaded());

        nodes.ensure_graph(&mut ctx, &mut stream, &RnnoiseModule, &cap, &config).unwrap();
        assert_eq!(nodes.ids(), first);
        // destination + three
        assert_eq!(ctx.node_count(), 4);
        assert!(ctx.connections().is_empty());
    }

    #[test]
    fn skips_suppressor_without_capability() {
        let mut host = MockHost::new().with_output_rate(44_100);
        let (mut ctx, mut stream) = setup(&mut host);
        let cap = probe(&ctx, 48_000);
        let mut nodes = GraphNodes::new();

        nodes
            .ensure_graph(&mut ctx, &mut stream, &RnnoiseModule, &cap, &SessionConfig::default())
            .unwrap();
        assert!(nodes.suppressor().is_none());
        assert!(!nodes.module_loaded());
        assert!(nodes.source().is_some() && nodes.merger().is_some());
    }

    #[test]
    fn failed_module_is_not_retried() {
        let mut host = MockHost::new();
        let (mut ctx, mut stream) = setup(&mut host);
        let cap = probe(&ctx, 48_000);
        let config = SessionConfig::default();
        let mut nodes = GraphNodes::new();

        assert!(nodes.ensure_graph(&mut ctx, &mut stream, &Failing, &cap, &config).is_err());
        assert!(nodes.module_failed());
        assert!(nodes.merger().is_none());

        nodes.ensure_graph(&mut ctx, &mut stream, &Failing, &cap, &config).unwrap();
        assert!(nodes.suppressor().is_none());
        assert!(nodes.merger().is_some());

        nodes.clear();
        assert!(!nodes.module_failed() && nodes.ids().is_empty());
    }
}
