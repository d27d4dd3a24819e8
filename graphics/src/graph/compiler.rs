//! Render graph compilation.
//!
//! Compilation turns a [`Graph`] into a [`CompiledGraph`]: a topological
//! execution order plus, for every node, the pipeline barrier that has to be
//! recorded right before its callback.
//!
//! # Ordering
//!
//! Kahn's algorithm over the nodes reachable from the graph roots, breadth
//! first: nodes run in the order they become ready, and nodes that become
//! ready together run in allocation order. The same graph always compiles to
//! the same order. Every structural error is reported before anything is
//! recorded:
//!
//! - a node recorded earlier in the frame: [`GraphicsError::AlreadyRecorded`]
//! - a reachable node waiting on a predecessor outside the graph:
//!   [`GraphicsError::NoProgress`]
//! - a cycle: [`GraphicsError::CyclicDependency`]
//!
//! # Barriers
//!
//! Resource state is tracked per image subresource (image, aspect, mip level,
//! array layer) and per buffer. For each access in execution order:
//!
//! | Previous use | Access | Barrier |
//! |--------------|--------|---------|
//! | none (first use this frame) | any | entry barrier from earlier submissions |
//! | write | read | unless the write is already visible to the read's stages and access |
//! | write or reads | write | always |
//! | any | different image layout | always, with the layout transition |
//!
//! The source stages of a barrier are the `dst_stages` of the nodes that
//! produced the hazard; the destination stages are the consuming node's
//! `src_stages`. All barriers of one node are batched into one command.

use std::collections::{HashMap, VecDeque};

use crate::backend::{BufferBarrier, ImageBarrier, PipelineBarrier};
use crate::error::GraphicsError;
use crate::types::{
    AccessFlags, BufferHandle, BufferRange, ImageAspects, ImageHandle, ImageLayout, ImageRange,
    PipelineStages,
};

use super::allocator::{Graph, RenderGraphAllocator};
use super::node::{Node, NodeHandle, NodeState};

/// One aspect of one mip level and array layer of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Subresource {
    image: ImageHandle,
    aspect: ImageAspects,
    mip_level: u32,
    array_layer: u32,
}

impl Subresource {
    fn range(&self) -> ImageRange {
        ImageRange::new(self.image, self.aspect)
            .with_mip_level(self.mip_level)
            .with_array_layer(self.array_layer)
    }
}

fn subresources(range: &ImageRange) -> impl Iterator<Item = Subresource> + '_ {
    range.aspects.iter().map(|aspect| Subresource {
        image: range.image,
        aspect,
        mip_level: range.mip_level,
        array_layer: range.array_layer,
    })
}

/// Layouts images are known to be in before a graph executes.
///
/// Subresources without a known layout are treated as
/// [`ImageLayout::Undefined`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageLayouts {
    layouts: HashMap<Subresource, ImageLayout>,
}

impl ImageLayouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the layout of every aspect in `range`.
    pub fn set(&mut self, range: &ImageRange, layout: ImageLayout) {
        for sub in subresources(range) {
            self.layouts.insert(sub, layout);
        }
    }

    /// Layout of the first aspect in `range`.
    pub fn get(&self, range: &ImageRange) -> ImageLayout {
        subresources(range)
            .next()
            .map_or(ImageLayout::Undefined, |sub| self.layout_of(&sub))
    }

    /// Forget every subresource of `image`, e.g. after it was destroyed.
    pub fn forget(&mut self, image: ImageHandle) {
        self.layouts.retain(|sub, _| sub.image != image);
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }

    fn layout_of(&self, sub: &Subresource) -> ImageLayout {
        self.layouts
            .get(sub)
            .copied()
            .unwrap_or(ImageLayout::Undefined)
    }

    fn update(&mut self, changes: impl IntoIterator<Item = (Subresource, ImageLayout)>) {
        self.layouts.extend(changes);
    }
}

/// A graph ready for execution.
#[derive(Debug, Default)]
pub struct CompiledGraph {
    order: Vec<NodeHandle>,
    barriers: Vec<Option<PipelineBarrier>>,
    final_layouts: Vec<(Subresource, ImageLayout)>,
}

impl CompiledGraph {
    /// Execution order.
    pub fn order(&self) -> &[NodeHandle] {
        &self.order
    }

    /// Barrier to record before the node at `position` in the order.
    pub fn barrier(&self, position: usize) -> Option<&PipelineBarrier> {
        self.barriers.get(position).and_then(Option::as_ref)
    }

    /// Nodes in order, each with the barrier recorded before it.
    pub fn iter(&self) -> impl Iterator<Item = (NodeHandle, Option<&PipelineBarrier>)> {
        self.order
            .iter()
            .zip(&self.barriers)
            .map(|(&node, barrier)| (node, barrier.as_ref()))
    }

    /// Number of barriers.
    pub fn barrier_count(&self) -> usize {
        self.barriers.iter().flatten().count()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Store the layouts images are left in once the graph has executed.
    pub fn apply_final_layouts(&self, layouts: &mut ImageLayouts) {
        layouts.update(self.final_layouts.iter().copied());
    }
}

/// Compile `graph` assuming images start in `layouts`.
pub fn compile(
    allocator: &RenderGraphAllocator,
    graph: &Graph,
    layouts: &ImageLayouts,
) -> Result<CompiledGraph, GraphicsError> {
    let order = topological_order(allocator, graph)?;

    let mut tracker = HazardTracker::new(layouts);
    let barriers = order
        .iter()
        .map(|&handle| tracker.process(allocator.node(handle)))
        .collect::<Result<Vec<_>, _>>()?;

    let compiled = CompiledGraph {
        order,
        barriers,
        final_layouts: tracker.final_layouts(),
    };
    log::trace!(
        "RenderGraph: compiled {} nodes with {} barriers",
        compiled.len(),
        compiled.barrier_count()
    );
    Ok(compiled)
}

fn topological_order(
    allocator: &RenderGraphAllocator,
    graph: &Graph,
) -> Result<Vec<NodeHandle>, GraphicsError> {
    let mut reachable = allocator.reachable(graph);
    reachable.sort_unstable();

    if let Some(&recorded) = reachable
        .iter()
        .find(|&&handle| allocator.node(handle).state() == NodeState::Recorded)
    {
        return Err(GraphicsError::AlreadyRecorded {
            node: allocator.node(recorded).name().to_string(),
        });
    }

    // Kahn's algorithm. In-degree counts every predecessor, including ones
    // outside the graph: those can never run, which stalls the traversal.
    let mut in_degree = vec![0usize; allocator.len()];
    for &handle in &reachable {
        in_degree[handle.index()] = allocator.node(handle).previous().len();
    }

    let mut queue: VecDeque<NodeHandle> = reachable
        .iter()
        .copied()
        .filter(|handle| in_degree[handle.index()] == 0)
        .collect();
    let mut order = Vec::with_capacity(reachable.len());

    while let Some(handle) = queue.pop_front() {
        order.push(handle);

        let mut ready: Vec<NodeHandle> = Vec::new();
        for &next in allocator.node(handle).next() {
            in_degree[next.index()] -= 1;
            if in_degree[next.index()] == 0 {
                ready.push(next);
            }
        }
        ready.sort_unstable();
        queue.extend(ready);
    }

    if order.len() == reachable.len() {
        return Ok(order);
    }

    Err(stall_error(allocator, graph, &order, reachable.len()))
}

/// Explain why ordering stopped before every reachable node was placed.
fn stall_error(
    allocator: &RenderGraphAllocator,
    graph: &Graph,
    order: &[NodeHandle],
    reachable: usize,
) -> GraphicsError {
    let members = allocator.membership(graph);
    let mut placed = vec![false; allocator.len()];
    for handle in order {
        placed[handle.index()] = true;
    }

    let pending: Vec<NodeHandle> = allocator
        .reachable(graph)
        .into_iter()
        .filter(|handle| !placed[handle.index()])
        .collect();

    let waits_outside = pending.iter().any(|&handle| {
        allocator
            .node(handle)
            .previous()
            .iter()
            .any(|prev| !members[prev.index()])
    });
    if waits_outside {
        log::error!(
            "RenderGraph: no progress after {} of {} nodes",
            order.len(),
            reachable
        );
        return GraphicsError::NoProgress {
            executed: order.len(),
            reachable,
        };
    }

    // Every pending node has a pending predecessor. Walking predecessors
    // for as many steps as there are pending nodes must end on a cycle.
    let mut current = pending[0];
    for _ in 0..pending.len() {
        if let Some(&prev) = allocator
            .node(current)
            .previous()
            .iter()
            .find(|prev| members[prev.index()] && !placed[prev.index()])
        {
            current = prev;
        }
    }

    let node = allocator.node(current).name().to_string();
    log::error!("RenderGraph: cycle through '{node}'");
    GraphicsError::CyclicDependency { node }
}

#[derive(Debug, Clone, Copy, Default)]
struct Usage {
    stages: PipelineStages,
    access: AccessFlags,
}

impl Usage {
    fn new(stages: PipelineStages, access: AccessFlags) -> Self {
        Self { stages, access }
    }

    fn empty() -> Self {
        Self::new(PipelineStages::empty(), AccessFlags::empty())
    }

    fn covers(&self, other: &Usage) -> bool {
        let stages = self.stages.contains(PipelineStages::ALL_COMMANDS)
            || self.stages.contains(other.stages);
        stages && self.access.contains(other.access)
    }
}

#[derive(Debug, Clone, Copy)]
struct ResourceState {
    /// Last write, or the unknown producer before the first use this frame.
    writer: Usage,
    /// Reads since the last write, by their finishing stages.
    readers: Usage,
    /// What the last write was made visible to.
    visible: Usage,
    layout: ImageLayout,
}

impl ResourceState {
    fn entry(layout: ImageLayout) -> Self {
        let writer = if layout == ImageLayout::Undefined {
            Usage::new(PipelineStages::TOP_OF_PIPE, AccessFlags::empty())
        } else {
            Usage::new(PipelineStages::ALL_COMMANDS, AccessFlags::MEMORY_WRITE)
        };
        Self {
            writer,
            readers: Usage::empty(),
            visible: Usage::empty(),
            layout,
        }
    }

    /// Apply an access. Returns the source half of the barrier it needs.
    fn access(
        &mut self,
        src_stages: PipelineStages,
        dst_stages: PipelineStages,
        access: AccessFlags,
        layout: ImageLayout,
    ) -> Option<Usage> {
        let wait = Usage::new(src_stages, access);
        let source = Usage::new(
            self.writer.stages | self.readers.stages,
            self.writer.access & AccessFlags::WRITES,
        );

        if access.is_write() || layout != self.layout {
            self.writer = if access.is_write() {
                Usage::new(dst_stages, access)
            } else {
                // A layout transition counts as a write.
                Usage::new(src_stages, AccessFlags::empty())
            };
            self.readers = if access.is_write() {
                Usage::empty()
            } else {
                Usage::new(dst_stages, access)
            };
            self.visible = if access.is_write() {
                Usage::empty()
            } else {
                wait
            };
            self.layout = layout;
            return Some(source);
        }

        self.readers.stages |= dst_stages;
        self.readers.access |= access;
        if self.visible.covers(&wait) {
            return None;
        }

        self.visible.stages |= wait.stages;
        self.visible.access |= wait.access;
        Some(Usage::new(self.writer.stages, self.writer.access & AccessFlags::WRITES))
    }
}

struct HazardTracker<'a> {
    initial: &'a ImageLayouts,
    images: HashMap<Subresource, ResourceState>,
    buffers: HashMap<BufferHandle, ResourceState>,
}

impl<'a> HazardTracker<'a> {
    fn new(initial: &'a ImageLayouts) -> Self {
        Self {
            initial,
            images: HashMap::new(),
            buffers: HashMap::new(),
        }
    }

    fn process(&mut self, node: &Node) -> Result<Option<PipelineBarrier>, GraphicsError> {
        let mut barrier = PipelineBarrier::new(PipelineStages::empty(), node.src_stages());

        for (sub, layout, access) in merged_images(node)? {
            let initial = self.initial.layout_of(&sub);
            let state = self
                .images
                .entry(sub)
                .or_insert_with(|| ResourceState::entry(initial));
            let old_layout = state.layout;

            let Some(src) = state.access(node.src_stages(), node.dst_stages(), access, layout)
            else {
                continue;
            };
            barrier.src_stages |= src.stages;

            // Aspects of one mip and layer sharing a transition share a barrier.
            match barrier.image_barriers.iter_mut().find(|image| {
                image.range.image == sub.image
                    && image.range.mip_level == sub.mip_level
                    && image.range.array_layer == sub.array_layer
                    && image.old_layout == old_layout
                    && image.new_layout == layout
            }) {
                Some(image) => {
                    image.range.aspects |= sub.aspect;
                    image.src_access |= src.access;
                    image.dst_access |= access;
                }
                None => barrier.image_barriers.push(ImageBarrier {
                    range: sub.range(),
                    old_layout,
                    new_layout: layout,
                    src_access: src.access,
                    dst_access: access,
                }),
            }
        }

        for (range, access) in merged_buffers(node) {
            let state = self
                .buffers
                .entry(range.buffer)
                .or_insert_with(|| ResourceState::entry(ImageLayout::General));

            if let Some(src) = state.access(
                node.src_stages(),
                node.dst_stages(),
                access,
                ImageLayout::General,
            ) {
                barrier.src_stages |= src.stages;
                barrier.buffer_barriers.push(BufferBarrier {
                    range,
                    src_access: src.access,
                    dst_access: access,
                });
            }
        }

        if barrier.is_empty() {
            return Ok(None);
        }

        log::trace!(
            "RenderGraph: barrier before '{}' ({} images, {} buffers)",
            node.name(),
            barrier.image_barriers.len(),
            barrier.buffer_barriers.len()
        );
        Ok(Some(barrier))
    }

    fn final_layouts(&self) -> Vec<(Subresource, ImageLayout)> {
        self.images
            .iter()
            .map(|(&sub, state)| (sub, state.layout))
            .collect()
    }
}

/// Combine a node's image declarations per subresource, in declaration order.
fn merged_images(
    node: &Node,
) -> Result<Vec<(Subresource, ImageLayout, AccessFlags)>, GraphicsError> {
    let mut merged: Vec<(Subresource, ImageLayout, AccessFlags)> = Vec::new();
    for decl in node.images() {
        for sub in subresources(&decl.range) {
            match merged.iter_mut().find(|(seen, _, _)| *seen == sub) {
                Some((_, layout, _)) if *layout != decl.layout => {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "node '{}' declares {:?} of {:?} in both {:?} and {:?}",
                        node.name(),
                        sub.aspect,
                        sub.image,
                        layout,
                        decl.layout
                    )));
                }
                Some((_, _, access)) => *access |= decl.access,
                None => merged.push((sub, decl.layout, decl.access)),
            }
        }
    }
    Ok(merged)
}

/// Combine declarations of the same buffer within a node.
fn merged_buffers(node: &Node) -> Vec<(BufferRange, AccessFlags)> {
    let mut merged: Vec<(BufferRange, AccessFlags)> = Vec::new();
    for decl in node.buffers() {
        match merged
            .iter_mut()
            .find(|(range, _)| range.buffer == decl.range.buffer)
        {
            Some((range, access)) => {
                if *range != decl.range {
                    *range = BufferRange::whole(range.buffer);
                }
                *access |= decl.access;
            }
            None => merged.push((decl.range, decl.access)),
        }
    }
    merged
}
