//! Graph discovery over the node arena.
//!
//! A `FilterGraph` is a snapshot: the set of nodes reachable from a seed node
//! through connected edges, plus the edges between them. It is rebuilt, not
//! patched, after topology changes; [`FilterGraph::is_stale`] tells when.

use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::executor::Pipeline;
use crate::pipeline::id::{NodeId, PlugRef, SocketRef};
use crate::pipeline::registration;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

/// Which edges to follow from a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeDirection {
    /// Plugs, towards the data sources.
    Upstream,
    /// Sockets, towards the consumers.
    Downstream,
    #[default]
    Both,
}

impl EdgeDirection {
    pub fn upstream(self) -> bool {
        matches!(self, EdgeDirection::Upstream | EdgeDirection::Both)
    }

    pub fn downstream(self) -> bool {
        matches!(self, EdgeDirection::Downstream | EdgeDirection::Both)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GraphOptions {
    pub direction: EdgeDirection,
    /// Registration pattern. Non-matching nodes are traversed but not listed.
    pub name_filter: Option<String>,
}

impl GraphOptions {
    pub fn upstream() -> Self {
        Self {
            direction: EdgeDirection::Upstream,
            name_filter: None,
        }
    }

    pub fn downstream() -> Self {
        Self {
            direction: EdgeDirection::Downstream,
            name_filter: None,
        }
    }

    pub fn filtered(mut self, pattern: impl Into<String>) -> Self {
        self.name_filter = Some(pattern.into());
        self
    }
}

/// A connected socket/plug pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphEdge {
    pub socket: SocketRef,
    pub plug: PlugRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    /// Nodes without connected plugs.
    pub sources: usize,
    /// Nodes without connected sockets.
    pub sinks: usize,
    /// Nodes that need a context but hold none.
    pub missing_contexts: usize,
}

#[derive(Debug, Clone)]
pub struct FilterGraph {
    seed: NodeId,
    nodes: BTreeSet<NodeId>,
    edges: Vec<GraphEdge>,
    options: GraphOptions,
    generation: u64,
}

impl FilterGraph {
    /// Discover every node reachable from `seed` in the requested direction.
    ///
    /// Expands a frontier until it stops growing; each node is visited once,
    /// so diamonds and long chains are handled alike.
    pub fn from_node(pipeline: &Pipeline, seed: NodeId, options: GraphOptions) -> PipelineResult<Self> {
        pipeline.node(seed)?;
        let mut known = BTreeSet::from([seed]);
        let mut edges = BTreeSet::new();
        let mut frontier = vec![seed];

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for id in frontier {
                let node = pipeline.node(id)?;
                if options.direction.upstream() {
                    for (index, plug) in node.plugs().iter().enumerate() {
                        if let Some(socket) = plug.remote() {
                            edges.insert(GraphEdge {
                                socket,
                                plug: PlugRef::new(id, index),
                            });
                            if known.insert(socket.node) {
                                next.push(socket.node);
                            }
                        }
                    }
                }
                if options.direction.downstream() {
                    for (index, socket) in node.sockets().iter().enumerate() {
                        for &plug in socket.requesting() {
                            edges.insert(GraphEdge {
                                socket: SocketRef::new(id, index),
                                plug,
                            });
                            if known.insert(plug.node) {
                                next.push(plug.node);
                            }
                        }
                    }
                }
            }
            frontier = next;
        }

        if let Some(pattern) = options.name_filter.as_deref() {
            known.retain(|id| {
                pipeline
                    .node(*id)
                    .is_ok_and(|n| registration::matches(pattern, n.registration()))
            });
            edges.retain(|e| known.contains(&e.socket.node) && known.contains(&e.plug.node));
        }

        tracing::trace!(
            "Discovered {} node(s), {} edge(s) from {:?}",
            known.len(),
            edges.len(),
            seed
        );

        Ok(Self {
            seed,
            nodes: known,
            edges: edges.into_iter().collect(),
            options,
            generation: pipeline.generation(),
        })
    }

    pub fn seed(&self) -> NodeId {
        self.seed
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn options(&self) -> &GraphOptions {
        &self.options
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the pipeline changed since this snapshot was taken.
    pub fn is_stale(&self, pipeline: &Pipeline) -> bool {
        self.generation != pipeline.generation()
    }

    /// Nodes whose registration matches `pattern`.
    pub fn find_nodes(&self, pipeline: &Pipeline, pattern: &str) -> Vec<NodeId> {
        self.nodes
            .iter()
            .copied()
            .filter(|id| {
                pipeline
                    .node(*id)
                    .is_ok_and(|n| registration::matches(pattern, n.registration()))
            })
            .collect()
    }

    // ── Topological sort (Kahn's algorithm) ──

    /// Nodes ordered so that every node comes after the nodes feeding it.
    pub fn topological_order(&self) -> PipelineResult<Vec<NodeId>> {
        let mut in_degree: BTreeMap<NodeId, usize> = self.nodes.iter().map(|&n| (n, 0)).collect();
        let mut adj: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();

        for edge in &self.edges {
            adj.entry(edge.socket.node).or_default().push(edge.plug.node);
            if let Some(d) = in_degree.get_mut(&edge.plug.node) {
                *d += 1;
            }
        }

        let mut queue: Vec<NodeId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&n, _)| n)
            .rev()
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = queue.pop() {
            order.push(node);
            for next in adj.get(&node).into_iter().flatten() {
                if let Some(d) = in_degree.get_mut(next) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push(*next);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            tracing::warn!(
                "Filter graph has a cycle! Only {} of {} nodes ordered.",
                order.len(),
                self.nodes.len()
            );
            let edge = self
                .edges
                .iter()
                .find(|e| !order.contains(&e.plug.node))
                .copied()
                .ok_or(PipelineError::InvalidNode(self.seed))?;
            return Err(PipelineError::CycleDetected {
                socket: edge.socket,
                plug: edge.plug,
            });
        }
        Ok(order)
    }

    /// Bind contexts for every node in the graph, sources first.
    ///
    /// Returns the number of nodes that hold a context afterwards.
    pub fn prepare_contexts(&self, pipeline: &mut Pipeline, force: bool) -> PipelineResult<usize> {
        let mut bound = 0;
        for id in self.topological_order()? {
            if pipeline.set_context(id, force)?.is_some() {
                bound += 1;
            }
        }
        Ok(bound)
    }

    /// Whether any node needs a context it does not have, or the snapshot is stale.
    pub fn is_dirty(&self, pipeline: &Pipeline) -> bool {
        self.is_stale(pipeline)
            || self.nodes.iter().any(|id| {
                pipeline
                    .node(*id)
                    .map_or(true, |n| n.needs_context() && n.context().is_none())
            })
    }

    pub fn stats(&self, pipeline: &Pipeline) -> GraphStats {
        let mut stats = GraphStats {
            nodes: self.nodes.len(),
            edges: self.edges.len(),
            ..Default::default()
        };
        for id in &self.nodes {
            if !self.edges.iter().any(|e| e.plug.node == *id) {
                stats.sources += 1;
            }
            if !self.edges.iter().any(|e| e.socket.node == *id) {
                stats.sinks += 1;
            }
            if pipeline
                .node(*id)
                .is_ok_and(|n| n.needs_context() && n.context().is_none())
            {
                stats.missing_contexts += 1;
            }
        }
        stats
    }

    /// Graphviz rendering, one statement per node and edge.
    pub fn to_dot(&self, pipeline: &Pipeline) -> String {
        let mut out = String::from("digraph filters {\n    rankdir=LR;\n");
        for id in &self.nodes {
            let label = pipeline
                .node(*id)
                .map(|n| n.display_name().to_string())
                .unwrap_or_else(|_| "?".to_string());
            let _ = writeln!(out, "    n{} [label=\"{}\"];", id.0, label.replace('"', "'"));
        }
        for e in &self.edges {
            let _ = writeln!(
                out,
                "    n{} -> n{} [taillabel=\"{}\", headlabel=\"{}\"];",
                e.socket.node.0, e.plug.node.0, e.socket.index, e.plug.index
            );
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::pipeline::cache::ContextCache;
    use crate::pipeline::nodes::{BLEND, MATRIX, OUTPUT, ROOT};
    use crate::pipeline::options::Options;
    use crate::pipeline::registry::ModuleRegistry;
    use std::sync::Arc;

    fn pipeline() -> Pipeline {
        Pipeline::with_cache(
            Arc::new(ModuleRegistry::with_builtins()),
            EngineConfig::default(),
            Arc::new(ContextCache::new()),
        )
    }

    fn node(p: &mut Pipeline, reg: &str) -> NodeId {
        p.new_node(reg, Options::new()).unwrap()
    }

    #[test]
    fn test_topological_sort_linear() {
        let mut p = pipeline();
        let a = node(&mut p, ROOT);
        let b = node(&mut p, MATRIX);
        let c = node(&mut p, OUTPUT);
        p.connect(a, 0, b, 0).unwrap();
        p.connect(b, 0, c, 0).unwrap();

        let graph = FilterGraph::from_node(&p, c, GraphOptions::default()).unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec![a, b, c]);
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn test_topological_sort_diamond() {
        let mut p = pipeline();
        // Diamond: A → B, A → C, B → D, C → D
        let a = node(&mut p, ROOT);
        let b = node(&mut p, MATRIX);
        let c = node(&mut p, MATRIX);
        let d = node(&mut p, BLEND);
        p.connect(a, 0, b, 0).unwrap();
        p.connect(a, 0, c, 0).unwrap();
        p.connect(b, 0, d, 0).unwrap();
        p.connect(c, 0, d, 1).unwrap();

        let graph = FilterGraph::from_node(&p, b, GraphOptions::default()).unwrap();
        assert_eq!(graph.len(), 4);

        let order = graph.topological_order().unwrap();
        let pos = |nid: NodeId| order.iter().position(|&x| x == nid).unwrap();
        assert!(pos(a) < pos(b));
        assert!(pos(a) < pos(c));
        assert!(pos(b) < pos(d));
        assert!(pos(c) < pos(d));
    }

    #[test]
    fn test_direction_limits_discovery() {
        let mut p = pipeline();
        let a = node(&mut p, ROOT);
        let b = node(&mut p, MATRIX);
        let c = node(&mut p, OUTPUT);
        p.connect(a, 0, b, 0).unwrap();
        p.connect(b, 0, c, 0).unwrap();

        let up = FilterGraph::from_node(&p, b, GraphOptions::upstream()).unwrap();
        assert!(up.contains(a) && up.contains(b) && !up.contains(c));

        let down = FilterGraph::from_node(&p, b, GraphOptions::downstream()).unwrap();
        assert!(!down.contains(a) && down.contains(c));
    }

    #[test]
    fn test_name_filter_traverses_but_hides() {
        let mut p = pipeline();
        let a = node(&mut p, ROOT);
        let b = node(&mut p, MATRIX);
        let c = node(&mut p, OUTPUT);
        p.connect(a, 0, b, 0).unwrap();
        p.connect(b, 0, c, 0).unwrap();

        let opts = GraphOptions::default().filtered("image");
        let graph = FilterGraph::from_node(&p, c, opts).unwrap();
        let listed: Vec<_> = graph.nodes().collect();
        assert_eq!(listed, vec![a, c]);
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_isolated_node_graph() {
        let mut p = pipeline();
        let a = node(&mut p, MATRIX);
        let graph = FilterGraph::from_node(&p, a, GraphOptions::default()).unwrap();
        assert_eq!(graph.len(), 1);
        let stats = graph.stats(&p);
        assert_eq!(stats.sources, 1);
        assert_eq!(stats.sinks, 1);
        assert_eq!(stats.missing_contexts, 1);
        assert!(graph.is_dirty(&p));
    }

    #[test]
    fn test_prepare_contexts_clears_dirty() {
        let mut p = pipeline();
        let a = node(&mut p, ROOT);
        let b = node(&mut p, MATRIX);
        p.connect(a, 0, b, 0).unwrap();
        let graph = FilterGraph::from_node(&p, a, GraphOptions::default()).unwrap();
        assert!(graph.is_dirty(&p));
        assert_eq!(graph.prepare_contexts(&mut p, false).unwrap(), 1);
        assert!(!graph.is_dirty(&p));
    }

    #[test]
    fn test_snapshot_goes_stale_on_topology_change() {
        let mut p = pipeline();
        let a = node(&mut p, ROOT);
        let b = node(&mut p, MATRIX);
        let graph = FilterGraph::from_node(&p, a, GraphOptions::default()).unwrap();
        assert!(!graph.is_stale(&p));
        p.connect(a, 0, b, 0).unwrap();
        assert!(graph.is_stale(&p));
    }

    #[test]
    fn test_to_dot_lists_nodes_and_edges() {
        let mut p = pipeline();
        let a = node(&mut p, ROOT);
        let b = node(&mut p, OUTPUT);
        p.connect(a, 0, b, 0).unwrap();
        let dot = FilterGraph::from_node(&p, a, GraphOptions::default())
            .unwrap()
            .to_dot(&p);
        assert!(dot.starts_with("digraph filters {"));
        assert!(dot.contains("n0 [label=\"root\"]"));
        assert!(dot.contains("n0 -> n1"));
    }
}
