//! GPU backend abstraction layer.
//!
//! The scheduler never talks to a GPU API directly. It consumes two traits:
//!
//! - [`GpuDevice`]: creates and destroys the objects the pools manage (descriptor
//!   sub-pools and sets, fences, semaphores, command buffers, query pools) and
//!   submits recorded work.
//! - [`CommandRecorder`]: the command emission surface handed to graph node
//!   callbacks and used by the executor to insert barriers.
//!
//! # Available Backends
//!
//! - `dummy` (default): records every command in memory, for tests and tools
//! - `vulkan-backend`: native Vulkan backend using ash

#[cfg(any(test, feature = "dummy"))]
pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::fmt;
use std::time::Duration;

use crate::error::GraphicsError;
use crate::types::{
    AccessFlags, BufferHandle, BufferRange, CommandBufferHandle, DescriptorPoolHandle,
    DescriptorPoolSize, DescriptorSetHandle, DescriptorSetLayoutHandle, FenceHandle,
    FenceStatus, ImageHandle, ImageLayout, ImageRange, PipelineStages, QueryPoolHandle,
    SemaphoreHandle,
};

/// Device and allocation context used to create pool-backing objects.
///
/// Implementations must be usable from several threads at once; the pools and
/// the frame scheduler share one device behind an `Arc`.
pub trait GpuDevice: Send + Sync + fmt::Debug {
    /// Human readable backend name.
    fn name(&self) -> &'static str;

    // Descriptors

    /// Create a descriptor pool that supports freeing individual sets.
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[DescriptorPoolSize],
    ) -> Result<DescriptorPoolHandle, GraphicsError>;

    /// Destroy a descriptor pool and every set allocated from it.
    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle);

    /// Allocate one descriptor set for `layout` from `pool`.
    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, GraphicsError>;

    /// Return a descriptor set's capacity to the pool it came from.
    fn free_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        set: DescriptorSetHandle,
    ) -> Result<(), GraphicsError>;

    // Synchronization

    /// Create a fence, optionally already signaled.
    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, GraphicsError>;

    /// Put a fence back in the unsignaled state.
    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GraphicsError>;

    /// Query a fence without blocking.
    fn fence_status(&self, fence: FenceHandle) -> Result<FenceStatus, GraphicsError>;

    /// Block until the fence is signaled.
    ///
    /// Returns `Ok(false)` if the timeout elapsed first.
    fn wait_fence(&self, fence: FenceHandle, timeout: Duration) -> Result<bool, GraphicsError>;

    /// Destroy a fence.
    fn destroy_fence(&self, fence: FenceHandle);

    /// Create a binary semaphore.
    fn create_semaphore(&self) -> Result<SemaphoreHandle, GraphicsError>;

    /// Destroy a semaphore.
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    // Command buffers

    /// Allocate a primary command buffer.
    fn allocate_command_buffer(&self) -> Result<CommandBufferHandle, GraphicsError>;

    /// Return a command buffer to the initial state.
    fn reset_command_buffer(&self, command_buffer: CommandBufferHandle)
    -> Result<(), GraphicsError>;

    /// Free a command buffer.
    fn free_command_buffer(&self, command_buffer: CommandBufferHandle);

    /// Begin recording and get the recorder for `command_buffer`.
    fn begin_commands(
        &self,
        command_buffer: CommandBufferHandle,
    ) -> Result<Box<dyn CommandRecorder + '_>, GraphicsError>;

    /// Finish recording `command_buffer`.
    fn end_commands(&self, command_buffer: CommandBufferHandle) -> Result<(), GraphicsError>;

    /// Submit recorded command buffers.
    fn submit(&self, submission: &Submission<'_>) -> Result<(), GraphicsError>;

    /// Block until the device has finished all submitted work.
    fn wait_idle(&self) -> Result<(), GraphicsError>;

    // Queries

    /// Create a timestamp query pool with `count` queries.
    fn create_timestamp_query_pool(&self, count: u32) -> Result<QueryPoolHandle, GraphicsError>;

    /// Destroy a query pool.
    fn destroy_query_pool(&self, pool: QueryPoolHandle);

    /// Read `count` timestamps starting at `first`.
    ///
    /// Returns `Ok(None)` when the results are not available yet.
    fn timestamp_results(
        &self,
        pool: QueryPoolHandle,
        first: u32,
        count: u32,
    ) -> Result<Option<Vec<u64>>, GraphicsError>;
}

/// Work handed to [`GpuDevice::submit`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Submission<'a> {
    pub command_buffers: &'a [CommandBufferHandle],
    pub wait_semaphores: &'a [SemaphoreHandle],
    pub signal_semaphores: &'a [SemaphoreHandle],
    /// Signaled once every command buffer has completed.
    pub fence: Option<FenceHandle>,
}

/// Command emission surface for one command buffer.
///
/// Node callbacks receive the recorder for the frame's command buffer. Draws and
/// dispatches are recorded by the collaborators themselves through
/// [`command_buffer`](Self::command_buffer); the scheduler only needs barriers,
/// clears, timestamps and labels.
pub trait CommandRecorder {
    /// The command buffer being recorded.
    fn command_buffer(&self) -> CommandBufferHandle;

    /// Record a pipeline barrier.
    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier);

    /// Reset `count` queries of `pool` starting at `first`.
    fn reset_query_pool(&mut self, pool: QueryPoolHandle, first: u32, count: u32);

    /// Write a timestamp once all prior work has reached `stage`.
    fn write_timestamp(&mut self, stage: PipelineStages, pool: QueryPoolHandle, query: u32);

    /// Clear a color image in `layout`.
    fn clear_color_image(&mut self, range: &ImageRange, layout: ImageLayout, color: [f32; 4]);

    /// Clear a depth/stencil image in `layout`.
    fn clear_depth_stencil_image(
        &mut self,
        range: &ImageRange,
        layout: ImageLayout,
        depth: f32,
        stencil: u32,
    );

    /// Insert a debug label into the command stream.
    fn insert_label(&mut self, label: &str);
}

/// Layout transition and/or memory dependency on one image subresource.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBarrier {
    pub range: ImageRange,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
}

/// Memory dependency on a buffer range.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferBarrier {
    pub range: BufferRange,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
}

/// One pipeline barrier command covering any number of resources.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineBarrier {
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
    pub image_barriers: Vec<ImageBarrier>,
    pub buffer_barriers: Vec<BufferBarrier>,
}

impl PipelineBarrier {
    /// Create an empty barrier between two stage masks.
    pub fn new(src_stages: PipelineStages, dst_stages: PipelineStages) -> Self {
        Self {
            src_stages,
            dst_stages,
            image_barriers: Vec::new(),
            buffer_barriers: Vec::new(),
        }
    }

    /// Check if the barrier carries no resource barriers.
    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty() && self.buffer_barriers.is_empty()
    }

    /// Check if the barrier covers `buffer`.
    pub fn covers_buffer(&self, buffer: BufferHandle) -> bool {
        self.buffer_barriers.iter().any(|b| b.range.buffer == buffer)
    }

    /// Check if the barrier covers `image`.
    pub fn covers_image(&self, image: ImageHandle) -> bool {
        self.image_barriers.iter().any(|b| b.range.image == image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barrier_coverage() {
        let mut barrier = PipelineBarrier::new(
            PipelineStages::COMPUTE_SHADER,
            PipelineStages::FRAGMENT_SHADER,
        );
        assert!(barrier.is_empty());

        barrier.buffer_barriers.push(BufferBarrier {
            range: BufferRange::whole(BufferHandle::from_raw(9)),
            src_access: AccessFlags::SHADER_WRITE,
            dst_access: AccessFlags::SHADER_READ,
        });

        assert!(!barrier.is_empty());
        assert!(barrier.covers_buffer(BufferHandle::from_raw(9)));
        assert!(!barrier.covers_buffer(BufferHandle::from_raw(1)));
        assert!(!barrier.covers_image(ImageHandle::from_raw(9)));
    }
}
