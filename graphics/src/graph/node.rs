//! Render graph nodes.

use std::fmt;

use crate::backend::CommandRecorder;
use crate::container::ResourceContainer;
use crate::types::{
    AccessFlags, AccessMode, BufferRange, ImageLayout, ImageRange, PipelineStages,
};

/// Deferred work of a node.
///
/// Called once during execution with the frame index, the recorder of the
/// frame's command buffer and the frame's resource container.
pub type NodeCallback =
    Box<dyn FnOnce(u32, &mut dyn CommandRecorder, &mut ResourceContainer) + Send>;

/// Handle to a node in a [`RenderGraphAllocator`](super::RenderGraphAllocator).
///
/// Only valid until the allocator is reset. Using a handle from an earlier
/// frame panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

impl NodeHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Position of the node in its arena.
    pub fn index(self) -> usize {
        self.index as usize
    }

    /// Arena generation the handle belongs to.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

/// Lifecycle of a node within one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Freshly allocated.
    Allocated,
    /// At least one resource access was declared.
    AccessesDeclared,
    /// Linked to another node.
    Linked,
    /// Executed. Terminal until the arena is reset.
    Recorded,
}

/// A declared access to an image subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageAccess {
    pub range: ImageRange,
    /// Layout the image must be in while the node runs.
    pub layout: ImageLayout,
    pub access: AccessFlags,
}

impl ImageAccess {
    pub fn mode(&self) -> AccessMode {
        self.access.mode()
    }
}

/// A declared access to a buffer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferAccess {
    pub range: BufferRange,
    pub access: AccessFlags,
}

impl BufferAccess {
    pub fn mode(&self) -> AccessMode {
        self.access.mode()
    }
}

/// One unit of GPU work in a frame's render graph.
///
/// A node carries a diagnostic name, the pipeline stages it waits in
/// (`src_stages`) and finishes in (`dst_stages`), its declared resource
/// accesses, its edges and a callback that records its commands.
pub struct Node {
    name: String,
    src_stages: PipelineStages,
    dst_stages: PipelineStages,
    images: Vec<ImageAccess>,
    buffers: Vec<BufferAccess>,
    next: Vec<NodeHandle>,
    previous: Vec<NodeHandle>,
    callback: Option<NodeCallback>,
    state: NodeState,
}

impl Node {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            src_stages: PipelineStages::default(),
            dst_stages: PipelineStages::default(),
            images: Vec::new(),
            buffers: Vec::new(),
            next: Vec::new(),
            previous: Vec::new(),
            callback: None,
            state: NodeState::Allocated,
        }
    }

    /// Drop everything the node holds, keeping allocations for reuse.
    pub(crate) fn clear(&mut self) {
        self.name.clear();
        self.src_stages = PipelineStages::default();
        self.dst_stages = PipelineStages::default();
        self.images.clear();
        self.buffers.clear();
        self.next.clear();
        self.previous.clear();
        self.callback = None;
        self.state = NodeState::Allocated;
    }

    pub(crate) fn reuse(&mut self, name: &str) {
        self.clear();
        self.name.push_str(name);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Stages that must wait for earlier nodes.
    pub fn src_stages(&self) -> PipelineStages {
        self.src_stages
    }

    /// Stages later nodes must wait for.
    pub fn dst_stages(&self) -> PipelineStages {
        self.dst_stages
    }

    pub fn set_src_stages(&mut self, stages: PipelineStages) -> &mut Self {
        self.src_stages = stages;
        self
    }

    pub fn set_dst_stages(&mut self, stages: PipelineStages) -> &mut Self {
        self.dst_stages = stages;
        self
    }

    /// Set both stage masks.
    pub fn set_stages(&mut self, src: PipelineStages, dst: PipelineStages) -> &mut Self {
        self.src_stages = src;
        self.dst_stages = dst;
        self
    }

    /// Declare an access to an image subresource in `layout`.
    pub fn add_image(
        &mut self,
        range: ImageRange,
        layout: ImageLayout,
        access: AccessFlags,
    ) -> &mut Self {
        self.declare();
        self.images.push(ImageAccess {
            range,
            layout,
            access,
        });
        self
    }

    /// Declare an access to a buffer range.
    pub fn add_buffer(&mut self, range: BufferRange, access: AccessFlags) -> &mut Self {
        self.declare();
        self.buffers.push(BufferAccess { range, access });
        self
    }

    /// Set the callback that records this node's commands.
    pub fn set_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(u32, &mut dyn CommandRecorder, &mut ResourceContainer) + Send + 'static,
    {
        self.assert_not_recorded();
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn images(&self) -> &[ImageAccess] {
        &self.images
    }

    pub fn buffers(&self) -> &[BufferAccess] {
        &self.buffers
    }

    /// Successors.
    pub fn next(&self) -> &[NodeHandle] {
        &self.next
    }

    /// Predecessors.
    pub fn previous(&self) -> &[NodeHandle] {
        &self.previous
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub(crate) fn link_next(&mut self, node: NodeHandle) {
        self.assert_not_recorded();
        if !self.next.contains(&node) {
            self.next.push(node);
        }
        self.state = NodeState::Linked;
    }

    pub(crate) fn link_previous(&mut self, node: NodeHandle) {
        self.assert_not_recorded();
        if !self.previous.contains(&node) {
            self.previous.push(node);
        }
        self.state = NodeState::Linked;
    }

    /// Mark the node recorded and hand out its callback.
    pub(crate) fn record(&mut self) -> Option<NodeCallback> {
        self.assert_not_recorded();
        self.state = NodeState::Recorded;
        self.callback.take()
    }

    fn declare(&mut self) {
        self.assert_not_recorded();
        if self.state == NodeState::Allocated {
            self.state = NodeState::AccessesDeclared;
        }
    }

    fn assert_not_recorded(&self) {
        assert!(
            self.state != NodeState::Recorded,
            "render graph node '{}' modified after it was recorded",
            self.name
        );
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("src_stages", &self.src_stages)
            .field("dst_stages", &self.dst_stages)
            .field("images", &self.images)
            .field("buffers", &self.buffers)
            .field("next", &self.next)
            .field("previous", &self.previous)
            .field("has_callback", &self.callback.is_some())
            .field("state", &self.state)
            .finish()
    }
}
