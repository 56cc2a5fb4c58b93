//! Router
//!
//! Wires the cached nodes into exactly one path to the destination:
//!
//! ```text
//! raw:         source ──────────────────────────────► destination
//! suppressed:  source ──► suppressor ══► merger 0/1 ──► destination
//! ```
//!
//! Every transition starts by disconnecting every cached node, so the result
//! depends only on the transition called and never on what was wired before.
//! There is no stored route; [`observe_route`] reads it back from the graph.

use tracing::{debug, warn};

use crate::context::AudioContext;
use crate::error::Result;
use crate::event::FallbackReason;
use crate::graph::Connection;
use crate::node::NodeId;
use crate::nodes::ProcessorMessage;
use crate::session::graph_builder::GraphNodes;
use crate::session::probe::Capability;

/// Which path reaches the destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Route {
    /// Nothing is connected.
    Disconnected,
    /// Microphone straight to the output.
    Raw,
    /// Microphone through the suppressor, duplicated to both channels.
    Suppressed,
}

/// Disconnect every cached node, ignoring nodes that weren't connected and
/// contexts that are already closed.
pub fn safe_disconnect(ctx: &mut AudioContext, nodes: &GraphNodes) {
    for id in nodes.ids() {
        match ctx.disconnect(id) {
            Ok(removed) => debug!(node = ?id, removed, "disconnected"),
            Err(e) => debug!(node = ?id, error = %e, "nothing to disconnect"),
        }
    }
}

/// Route the microphone straight to the destination.
pub fn route_raw(ctx: &mut AudioContext, nodes: &GraphNodes) -> Result<Route> {
    safe_disconnect(ctx, nodes);
    let Some(source) = nodes.source() else {
        warn!("no source node to route");
        return Ok(Route::Disconnected);
    };
    ctx.connect(source, ctx.destination(), 0)?;
    Ok(Route::Raw)
}

/// Route the microphone through the suppressor.
///
/// Falls back to [`route_raw`] (with a warning) when there is no suppressor
/// or the context runs at the wrong rate, and says why.
pub fn route_suppressed(
    ctx: &mut AudioContext,
    nodes: &mut GraphNodes,
    cap: &Capability,
) -> Result<(Route, Option<FallbackReason>)> {
    let available = match (nodes.suppressor(), nodes.merger()) {
        (Some(sup), Some(mer)) if cap.rate_matches() => Some((sup, mer)),
        _ => None,
    };

    let Some((suppressor, merger)) = available else {
        let reason = fallback_reason(nodes, cap);
        warn!(reason = ?reason, "suppression unavailable, routing raw audio");
        return Ok((route_raw(ctx, nodes)?, Some(reason)));
    };

    safe_disconnect(ctx, nodes);
    let Some(source) = nodes.source() else {
        warn!("no source node to route");
        return Ok((Route::Disconnected, None));
    };

    // audio buffered while the suppressor was off the path is stale
    if let Some(handle) = nodes.suppressor.as_mut() {
        if handle.send(ProcessorMessage::Reset).is_err() {
            debug!("suppressor queue full, reset dropped");
        }
    }

    ctx.connect(source, suppressor, 0)?;
    ctx.connect(suppressor, merger, 0)?;
    ctx.connect(suppressor, merger, 1)?;
    ctx.connect(merger, ctx.destination(), 0)?;
    Ok((Route::Suppressed, None))
}

fn fallback_reason(nodes: &GraphNodes, cap: &Capability) -> FallbackReason {
    if let Some(reason) = cap.missing() {
        reason
    } else if nodes.module_failed() {
        FallbackReason::ModuleFailed
    } else {
        // capable and not failed, but never built: the graph wasn't built yet
        FallbackReason::ModulesUnsupported
    }
}

/// Read the current route back from the context's wiring.
///
/// `None` when the cached nodes are wired in a way neither transition produces.
pub fn observe_route(ctx: &AudioContext, nodes: &GraphNodes) -> Option<Route> {
    let ours = nodes.ids();
    let mut wired: Vec<Connection> = ctx
        .connections()
        .into_iter()
        .filter(|c| ours.contains(&c.from))
        .collect();
    wired.sort();

    if wired.is_empty() {
        return Some(Route::Disconnected);
    }

    let destination = ctx.destination();
    let link = |from: NodeId, to: NodeId, input: usize| Connection { from, to, input };

    if let Some(source) = nodes.source() {
        if wired == [link(source, destination, 0)] {
            return Some(Route::Raw);
        }
        if let (Some(sup), Some(mer)) = (nodes.suppressor(), nodes.merger()) {
            let mut suppressed = vec![
                link(source, sup, 0),
                link(sup, mer, 0),
                link(sup, mer, 1),
                link(mer, destination, 0),
            ];
            suppressed.sort();
            if wired == suppressed {
                return Some(Route::Suppressed);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureConstraints, SessionConfig};
    use crate::host::MockHost;
    use crate::module::RnnoiseModule;
    use crate::session::probe::probe;
    use crate::stream::MediaStream;

    fn built(host: &mut MockHost) -> (AudioContext, MediaStream, GraphNodes, Capability) {
        let mut ctx = AudioContext::new(host, 48_000).unwrap();
        let mut stream = MediaStream::open(host, &CaptureConstraints::default()).unwrap();
        let cap = probe(&ctx, 48_000);
        let mut nodes = GraphNodes::new();
        nodes
            .ensure_graph(&mut ctx, &mut stream, &RnnoiseModule, &cap, &SessionConfig::default())
            .unwrap();
        (ctx, stream, nodes, cap)
    }

    #[test]
    fn fresh_graph_is_disconnected() {
        let mut host = MockHost::new();
        let (ctx, _stream, nodes, _) = built(&mut host);
        assert_eq!(observe_route(&ctx, &nodes), Some(Route::Disconnected));
    }

    #[test]
    fn exactly_one_path_after_any_sequence() {
        let mut host = MockHost::new();
        let (mut ctx, _stream, mut nodes, cap) = built(&mut host);

        let steps = [true, true, false, true, false, false, true];
        for suppressed in steps.iter().copied() {
            let route = if suppressed {
                route_suppressed(&mut ctx, &mut nodes, &cap).unwrap().0
            } else {
                route_raw(&mut ctx, &nodes).unwrap()
            };
            assert_eq!(observe_route(&ctx, &nodes), Some(route));

            let into_destination = ctx
                .connections()
                .iter()
                .filter(|c| c.to == ctx.destination())
                .count();
            assert_eq!(into_destination, 1);
        }
    }

    #[test]
    fn suppressed_path_wiring() {
        let mut host = MockHost::new();
        let (mut ctx, _stream, mut nodes, cap) = built(&mut host);

        let (route, fallback) = route_suppressed(&mut ctx, &mut nodes, &cap).unwrap();
        assert_eq!(route, Route::Suppressed);
        assert_eq!(fallback, None);

        let sup = nodes.suppressor().unwrap();
        let mer = nodes.merger().unwrap();
        let conns = ctx.connections();
        assert!(conns.contains(&Connection { from: sup, to: mer, input: 0 }));
        assert!(conns.contains(&Connection { from: sup, to: mer, input: 1 }));
        assert_eq!(conns.len(), 4);
    }

    #[test]
    fn rate_mismatch_routes_raw() {
        let mut host = MockHost::new().with_output_rate(44_100);
        let (mut ctx, _stream, mut nodes, cap) = built(&mut host);

        let (route, fallback) = route_suppressed(&mut ctx, &mut nodes, &cap).unwrap();
        assert_eq!(route, Route::Raw);
        assert_eq!(
            fallback,
            Some(FallbackReason::SampleRateMismatch { actual: 44_100, required: 48_000 })
        );
        assert_eq!(observe_route(&ctx, &nodes), Some(Route::Raw));
    }

    #[test]
    fn safe_disconnect_on_closed_context() {
        let mut host = MockHost::new();
        let (mut ctx, _stream, nodes, _) = built(&mut host);
        route_raw(&mut ctx, &nodes).unwrap();

        ctx.close().unwrap();
        safe_disconnect(&mut ctx, &nodes);
        safe_disconnect(&mut ctx, &nodes);
    }

    #[test]
    fn unknown_wiring_is_not_a_route() {
        let mut host = MockHost::new();
        let (mut ctx, _stream, nodes, _) = built(&mut host);
        let source = nodes.source().unwrap();
        let merger = nodes.merger().unwrap();

        ctx.connect(source, merger, 0).unwrap();
        assert_eq!(observe_route(&ctx, &nodes), None);

        route_raw(&mut ctx, &nodes).unwrap();
        assert_eq!(observe_route(&ctx, &nodes), Some(Route::Raw));
    }
}
