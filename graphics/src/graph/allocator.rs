//! Per-frame node arena and graph composition.

use crate::error::GraphicsError;

use super::node::{Node, NodeHandle};

/// Default node budget of one frame.
pub const DEFAULT_MAX_NODES: usize = 256;

/// Configuration of a [`RenderGraphAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// Maximum nodes allocated between two resets.
    pub max_nodes: usize,
}

impl GraphConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn validate(&self) -> Result<(), GraphicsError> {
        if self.max_nodes == 0 {
            return Err(GraphicsError::InvalidConfiguration(
                "render graph max_nodes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
        }
    }
}

/// A sub-graph: every node reachable from its roots by following successors.
///
/// A single node is a one-node graph. Graphs are plain handle lists, so they
/// are cheap to clone and compose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    roots: Vec<NodeHandle>,
}

impl Graph {
    /// A graph with no nodes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Entry nodes of the graph.
    pub fn roots(&self) -> &[NodeHandle] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn push_root(&mut self, node: NodeHandle) {
        if !self.roots.contains(&node) {
            self.roots.push(node);
        }
    }
}

impl From<NodeHandle> for Graph {
    fn from(node: NodeHandle) -> Self {
        Self { roots: vec![node] }
    }
}

impl From<&[NodeHandle]> for Graph {
    fn from(nodes: &[NodeHandle]) -> Self {
        gather(nodes.iter().copied())
    }
}

/// Bundle nodes or graphs into one graph.
pub fn gather<G, I>(items: I) -> Graph
where
    G: Into<Graph>,
    I: IntoIterator<Item = G>,
{
    let mut graph = Graph::empty();
    for item in items {
        for root in item.into().roots {
            graph.push_root(root);
        }
    }
    graph
}

/// Direction of a [`RenderGraphAllocator::traverse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow successors.
    Forward,
    /// Follow predecessors.
    Backward,
}

/// Per-frame bump arena of render graph nodes.
///
/// Every frame slot owns one allocator. Nodes are allocated while the frame's
/// graph is built, executed once, and invalidated together by
/// [`reset`](Self::reset). Node storage is reused across frames.
///
/// # Thread Safety
///
/// Construction takes `&mut self`. Subsystems building the same frame from
/// several threads share the allocator behind a `parking_lot::Mutex`.
#[derive(Debug, Default)]
pub struct RenderGraphAllocator {
    nodes: Vec<Node>,
    len: usize,
    generation: u32,
    config: GraphConfig,
}

impl RenderGraphAllocator {
    /// Create an allocator with the default node budget.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self {
            nodes: Vec::with_capacity(config.max_nodes.min(DEFAULT_MAX_NODES)),
            len: 0,
            generation: 0,
            config,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Allocate a node.
    ///
    /// # Panics
    ///
    /// Panics if the frame already holds `max_nodes` nodes.
    pub fn allocate(&mut self, name: &str) -> NodeHandle {
        assert!(
            self.len < self.config.max_nodes,
            "render graph allocator exhausted (max_nodes: {})",
            self.config.max_nodes
        );
        self.push(name)
    }

    /// Allocate a node, or report an exhausted budget.
    pub fn try_allocate(&mut self, name: &str) -> Result<NodeHandle, GraphicsError> {
        if self.len >= self.config.max_nodes {
            return Err(GraphicsError::InvalidConfiguration(format!(
                "render graph allocator exhausted (max_nodes: {})",
                self.config.max_nodes
            )));
        }
        Ok(self.push(name))
    }

    fn push(&mut self, name: &str) -> NodeHandle {
        let index = self.len;
        match self.nodes.get_mut(index) {
            Some(node) => node.reuse(name),
            None => self.nodes.push(Node::new(name.to_string())),
        }
        self.len += 1;
        NodeHandle::new(index as u32, self.generation)
    }

    /// Invalidate every node of the frame.
    ///
    /// Callbacks that never ran are dropped here, releasing whatever they
    /// captured.
    pub fn reset(&mut self) {
        for node in &mut self.nodes[..self.len] {
            node.clear();
        }
        log::trace!(
            "RenderGraphAllocator: reset {} nodes (generation {})",
            self.len,
            self.generation
        );
        self.len = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Get a node.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn node(&self, handle: NodeHandle) -> &Node {
        self.check(handle);
        &self.nodes[handle.index()]
    }

    /// Get a node for modification.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale.
    pub fn node_mut(&mut self, handle: NodeHandle) -> &mut Node {
        self.check(handle);
        &mut self.nodes[handle.index()]
    }

    /// Iterate over the live nodes in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, &Node)> {
        let generation = self.generation;
        self.nodes[..self.len]
            .iter()
            .enumerate()
            .map(move |(i, node)| (NodeHandle::new(i as u32, generation), node))
    }

    /// Order `to` after `from`.
    pub fn add_next(&mut self, from: NodeHandle, to: NodeHandle) {
        assert!(from != to, "render graph node cannot follow itself");
        self.check(from);
        self.check(to);
        self.nodes[from.index()].link_next(to);
        self.nodes[to.index()].link_previous(from);
    }

    /// Visit every node reachable from the graph's roots once, depth first.
    pub fn traverse<F>(&self, graph: &Graph, direction: Direction, mut visit: F)
    where
        F: FnMut(NodeHandle, &Node),
    {
        let mut visited = vec![false; self.len];
        let mut stack: Vec<NodeHandle> = graph.roots.iter().rev().copied().collect();

        while let Some(handle) = stack.pop() {
            self.check(handle);
            if std::mem::replace(&mut visited[handle.index()], true) {
                continue;
            }

            let node = &self.nodes[handle.index()];
            visit(handle, node);

            let edges = match direction {
                Direction::Forward => node.next(),
                Direction::Backward => node.previous(),
            };
            stack.extend(
                edges
                    .iter()
                    .rev()
                    .filter(|edge| !visited[edge.index()])
                    .copied(),
            );
        }
    }

    /// Every node of the graph, in traversal order.
    pub fn reachable(&self, graph: &Graph) -> Vec<NodeHandle> {
        let mut nodes = Vec::new();
        self.traverse(graph, Direction::Forward, |handle, _| nodes.push(handle));
        nodes
    }

    /// Visit the nodes of the graph that have no predecessor inside it.
    pub fn iterate_starting_nodes<F>(&self, graph: &Graph, mut visit: F)
    where
        F: FnMut(NodeHandle),
    {
        let members = self.membership(graph);
        for handle in self.reachable(graph) {
            let node = &self.nodes[handle.index()];
            if !node.previous().iter().any(|prev| members[prev.index()]) {
                visit(handle);
            }
        }
    }

    /// Visit the nodes of the graph that have no successor.
    pub fn iterate_ending_nodes<F>(&self, graph: &Graph, mut visit: F)
    where
        F: FnMut(NodeHandle),
    {
        self.traverse(graph, Direction::Forward, |handle, node| {
            if node.next().is_empty() {
                visit(handle);
            }
        });
    }

    /// Starting nodes of the graph.
    pub fn starting_nodes(&self, graph: &Graph) -> Vec<NodeHandle> {
        let mut nodes = Vec::new();
        self.iterate_starting_nodes(graph, |handle| nodes.push(handle));
        nodes
    }

    /// Ending nodes of the graph.
    pub fn ending_nodes(&self, graph: &Graph) -> Vec<NodeHandle> {
        let mut nodes = Vec::new();
        self.iterate_ending_nodes(graph, |handle| nodes.push(handle));
        nodes
    }

    /// Run `right` after `left`.
    ///
    /// Every ending node of `left` is linked to every starting node of
    /// `right`. The result is rooted at `left`, or is `right` if `left` is
    /// empty.
    pub fn concat(&mut self, left: &Graph, right: &Graph) -> Graph {
        if left.is_empty() {
            return right.clone();
        }

        let ends = self.ending_nodes(left);
        let starts = self.starting_nodes(right);
        for &end in &ends {
            for &start in &starts {
                self.add_next(end, start);
            }
        }
        left.clone()
    }

    /// Per-index flags for the nodes reachable from `graph`.
    pub(crate) fn membership(&self, graph: &Graph) -> Vec<bool> {
        let mut members = vec![false; self.len];
        self.traverse(graph, Direction::Forward, |handle, _| {
            members[handle.index()] = true;
        });
        members
    }

    fn check(&self, handle: NodeHandle) {
        assert!(
            handle.generation() == self.generation && handle.index() < self.len,
            "stale render graph node handle {:?} (allocator generation {})",
            handle,
            self.generation
        );
    }
}

/// Builds a graph by chaining sub-graphs one after another.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    head: Graph,
    tail: Graph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `graph` after everything added so far.
    pub fn concat(&mut self, allocator: &mut RenderGraphAllocator, graph: impl Into<Graph>) {
        let graph = graph.into();
        if graph.is_empty() {
            return;
        }

        if self.head.is_empty() {
            self.head = graph.clone();
        } else {
            allocator.concat(&self.tail, &graph);
        }
        self.tail = graph;
    }

    /// The first sub-graph.
    pub fn head(&self) -> &Graph {
        &self.head
    }

    /// The last sub-graph.
    pub fn tail(&self) -> &Graph {
        &self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_empty()
    }

    /// The whole chain, rooted at its first sub-graph.
    pub fn build(self) -> Graph {
        self.head
    }
}
