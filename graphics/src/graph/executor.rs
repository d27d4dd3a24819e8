//! Render graph execution.

use vesta_core::profiling::profile_scope;

use crate::backend::CommandRecorder;
use crate::container::ResourceContainer;
use crate::error::GraphicsError;
use crate::types::{ImageLayout, ImageRange};

use super::allocator::{Graph, RenderGraphAllocator};
use super::compiler::{self, CompiledGraph, ImageLayouts};

/// Counters of one [`GraphExecutor::execute`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub nodes_executed: usize,
    pub barriers_emitted: usize,
}

/// Records render graphs into a command buffer.
///
/// The executor remembers the layout every image was left in, so the entry
/// barrier of the next frame transitions from the right layout.
#[derive(Debug, Default)]
pub struct GraphExecutor {
    layouts: ImageLayouts,
    debug_labels: bool,
}

impl GraphExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a debug label with the node name before every callback.
    pub fn with_debug_labels(mut self, enabled: bool) -> Self {
        self.debug_labels = enabled;
        self
    }

    /// Declare the layout an image is in before the next execution, e.g.
    /// after an upload recorded outside the graph.
    pub fn set_image_layout(&mut self, range: &ImageRange, layout: ImageLayout) {
        self.layouts.set(range, layout);
    }

    /// Layout the first aspect of `range` is known to be in.
    pub fn image_layout(&self, range: &ImageRange) -> ImageLayout {
        self.layouts.get(range)
    }

    pub fn layouts(&self) -> &ImageLayouts {
        &self.layouts
    }

    pub fn layouts_mut(&mut self) -> &mut ImageLayouts {
        &mut self.layouts
    }

    /// Compile without recording anything.
    pub fn compile(
        &self,
        allocator: &RenderGraphAllocator,
        graph: &Graph,
    ) -> Result<CompiledGraph, GraphicsError> {
        compiler::compile(allocator, graph, &self.layouts)
    }

    /// Record every node of `graph` in dependency order.
    ///
    /// Each node's barrier is recorded right before its callback, and the
    /// callback receives `frame_index`, `recorder` and `container`. Nodes are
    /// marked recorded and cannot run again until the allocator is reset.
    ///
    /// Structural errors are detected before the first callback runs, so a
    /// failing call records nothing.
    pub fn execute(
        &mut self,
        allocator: &mut RenderGraphAllocator,
        graph: &Graph,
        frame_index: u32,
        recorder: &mut dyn CommandRecorder,
        container: &mut ResourceContainer,
    ) -> Result<ExecutionStats, GraphicsError> {
        profile_scope!("execute_graph");

        let compiled = self.compile(allocator, graph)?;
        let mut stats = ExecutionStats::default();

        for (handle, barrier) in compiled.iter() {
            if let Some(barrier) = barrier {
                recorder.pipeline_barrier(barrier);
                stats.barriers_emitted += 1;
            }

            let node = allocator.node_mut(handle);
            log::trace!("RenderGraph: executing '{}'", node.name());
            if self.debug_labels {
                recorder.insert_label(node.name());
            }

            if let Some(callback) = node.record() {
                callback(frame_index, &mut *recorder, container);
            }
            stats.nodes_executed += 1;
        }

        compiled.apply_final_layouts(&mut self.layouts);
        Ok(stats)
    }
}
