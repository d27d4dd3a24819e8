//! Frame scheduler for managing multiple frames in flight.
//!
//! This module provides [`FrameScheduler`], which ties the render graph, the
//! pools and the resource container together and overlaps CPU frame
//! preparation with GPU execution.
//!
//! # Frame Slots
//!
//! With N frames in flight there are N slots. Each slot owns:
//!
//! - a [`RenderGraphAllocator`] the frame's nodes live in
//! - a [`ResourceContainer`] keeping everything the frame's commands reference
//! - once submitted, the fence and command buffer of the frame
//!
//! ```text
//! frames_in_flight = 2
//!
//! Slot 0: [Frame 1] ──► [Frame 3] ──► [Frame 5] ──►
//! Slot 1: [Frame 2] ──► [Frame 4] ──► [Frame 6] ──►
//! ```
//!
//! # Frame Lifecycle
//!
//! ```text
//! begin_frame()
//!   ├─ wait for the slot's fence (error after fence_timeout)
//!   ├─ release the slot's container    ──► descriptor sets back in their pool
//!   ├─ return fence + command buffer   ──► fence pool / command buffer pool
//!   └─ reset the slot's allocator      ──► old node handles become stale
//!
//! frame()                              ──► build nodes, register resources
//!
//! end_frame(&graph)
//!   ├─ acquire command buffer + fence
//!   ├─ execute the graph into the command buffer
//!   ├─ submit, signaling the fence
//!   └─ advance to the next slot
//! ```
//!
//! # Example
//!
//! ```ignore
//! use vesta_graphics::frame::{FrameConfig, FrameScheduler};
//!
//! let mut scheduler = FrameScheduler::new(device, FrameConfig::new())?;
//!
//! while running {
//!     scheduler.begin_frame()?;  // May block if the GPU is behind
//!
//!     let set = scheduler.descriptor_sets().acquire_shared(layout)?;
//!     let mut frame = scheduler.frame();
//!     frame.resources.add_resource(set);
//!     let node = frame.allocator.allocate("main");
//!
//!     scheduler.end_frame(&node.into())?;
//! }
//!
//! scheduler.wait_idle()?;
//! ```
//!
//! # Choosing Frames in Flight
//!
//! | Count | Behavior |
//! |-------|----------|
//! | 1 | CPU waits for GPU every frame. Simple but slow. |
//! | 2 | Good balance. CPU can work on N+1 while GPU renders N. |
//! | 3 | More overlap, higher latency. |

use std::sync::Arc;
use std::time::Duration;

use vesta_core::profiling::{frame_mark, profile_scope};

use crate::backend::{GpuDevice, Submission};
use crate::container::ResourceContainer;
use crate::error::GraphicsError;
use crate::graph::{ExecutionStats, Graph, GraphConfig, GraphExecutor, RenderGraphAllocator};
use crate::pools::{
    CommandBufferPool, CommandBufferStrategy, DescriptorPoolConfig, DescriptorSetPool, FencePool,
    FenceStrategy, PooledCommandBuffer, PooledFence,
};
use crate::types::{FenceStatus, ImageHandle};

/// Default number of frames in flight.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Default time [`FrameScheduler::begin_frame`] waits for a slot.
pub const DEFAULT_FENCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of a [`FrameScheduler`].
#[derive(Debug, Clone, PartialEq)]
pub struct FrameConfig {
    /// Number of frames that can be in flight simultaneously.
    pub frames_in_flight: usize,
    /// Node budget of every slot's allocator.
    pub graph: GraphConfig,
    /// Sizing of the shared descriptor set pool.
    pub descriptor_pool: DescriptorPoolConfig,
    /// How long to wait for a slot's fence before giving up.
    pub fence_timeout: Duration,
}

impl FrameConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    pub fn with_graph(mut self, graph: GraphConfig) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_descriptor_pool(mut self, descriptor_pool: DescriptorPoolConfig) -> Self {
        self.descriptor_pool = descriptor_pool;
        self
    }

    pub fn with_fence_timeout(mut self, fence_timeout: Duration) -> Self {
        self.fence_timeout = fence_timeout;
        self
    }

    pub fn validate(&self) -> Result<(), GraphicsError> {
        if self.frames_in_flight == 0 {
            return Err(GraphicsError::InvalidConfiguration(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        self.graph.validate()?;
        self.descriptor_pool.validate()
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            graph: GraphConfig::default(),
            descriptor_pool: DescriptorPoolConfig::default(),
            fence_timeout: DEFAULT_FENCE_TIMEOUT,
        }
    }
}

/// Access to the slot being built, returned by [`FrameScheduler::frame`].
#[derive(Debug)]
pub struct Frame<'a> {
    pub allocator: &'a mut RenderGraphAllocator,
    pub resources: &'a mut ResourceContainer,
    /// Index of the slot, also passed to node callbacks.
    pub frame_index: u32,
}

#[derive(Debug)]
struct InFlight {
    fence: PooledFence,
    command_buffer: PooledCommandBuffer,
}

#[derive(Debug)]
struct FrameSlot {
    allocator: RenderGraphAllocator,
    resources: ResourceContainer,
    in_flight: Option<InFlight>,
}

/// Runs one render graph per frame with multiple frames in flight.
///
/// # Thread Safety
///
/// `FrameScheduler` is **not thread-safe**. It should be owned by a single
/// thread (typically the render thread). The pools it hands out are shared and
/// can be used from any thread.
///
/// # Image Layouts
///
/// The layout every image is left in carries over to the next frame. Call
/// [`forget_image`](Self::forget_image) when destroying an image, otherwise its
/// layouts are kept for the lifetime of the scheduler and a new image reusing
/// the handle starts from a stale layout.
#[derive(Debug)]
pub struct FrameScheduler {
    device: Arc<dyn GpuDevice>,
    config: FrameConfig,
    slots: Vec<FrameSlot>,
    fences: FencePool,
    command_buffers: CommandBufferPool,
    descriptor_sets: DescriptorSetPool,
    executor: GraphExecutor,
    /// Current frame slot index (0 to frames_in_flight - 1).
    current_slot: usize,
    /// Total frames started.
    frame_count: u64,
    frame_active: bool,
}

impl FrameScheduler {
    /// Create a scheduler on `device`.
    ///
    /// Fails with [`GraphicsError::InvalidConfiguration`] if `config` does not
    /// validate.
    pub fn new(device: Arc<dyn GpuDevice>, config: FrameConfig) -> Result<Self, GraphicsError> {
        config.validate()?;

        let slots = (0..config.frames_in_flight)
            .map(|_| FrameSlot {
                allocator: RenderGraphAllocator::with_config(config.graph),
                resources: ResourceContainer::new(),
                in_flight: None,
            })
            .collect();

        log::debug!(
            "FrameScheduler: {} frames in flight on {}",
            config.frames_in_flight,
            device.name()
        );

        Ok(Self {
            fences: FencePool::new(FenceStrategy::new(Arc::clone(&device))),
            command_buffers: CommandBufferPool::new(CommandBufferStrategy::new(Arc::clone(
                &device,
            ))),
            descriptor_sets: DescriptorSetPool::new(
                Arc::clone(&device),
                config.descriptor_pool.clone(),
            )?,
            device,
            config,
            slots,
            executor: GraphExecutor::new(),
            current_slot: 0,
            frame_count: 0,
            frame_active: false,
        })
    }

    /// Begin a new frame.
    ///
    /// Waits for the GPU to finish the previous frame of the current slot,
    /// then recycles everything that frame held. Node handles from that frame
    /// become stale.
    ///
    /// On [`GraphicsError::FenceTimeout`] nothing is recycled and the call can
    /// be retried.
    pub fn begin_frame(&mut self) -> Result<(), GraphicsError> {
        profile_scope!("begin_frame");
        assert!(!self.frame_active, "begin_frame called twice without end_frame");

        let timeout = self.config.fence_timeout;
        let slot = &mut self.slots[self.current_slot];

        if let Some(in_flight) = &slot.in_flight
            && !self.device.wait_fence(*in_flight.fence, timeout)?
        {
            log::warn!(
                "Frame slot {} still busy after {:?}",
                self.current_slot,
                timeout
            );
            return Err(GraphicsError::FenceTimeout);
        }

        slot.resources.release();
        if let Some(in_flight) = slot.in_flight.take() {
            log::trace!(
                "Recycling fence {:?} and command buffer {:?}",
                *in_flight.fence,
                *in_flight.command_buffer
            );
        }
        slot.allocator.reset();

        self.frame_count += 1;
        self.frame_active = true;

        log::trace!(
            "Begin frame {} (slot {})",
            self.frame_count,
            self.current_slot
        );
        Ok(())
    }

    /// Allocator and container of the frame being built.
    pub fn frame(&mut self) -> Frame<'_> {
        let slot = &mut self.slots[self.current_slot];
        Frame {
            allocator: &mut slot.allocator,
            resources: &mut slot.resources,
            frame_index: self.current_slot as u32,
        }
    }

    /// Allocator of the frame being built.
    pub fn allocator(&mut self) -> &mut RenderGraphAllocator {
        &mut self.slots[self.current_slot].allocator
    }

    /// Container of the frame being built.
    pub fn resources(&mut self) -> &mut ResourceContainer {
        &mut self.slots[self.current_slot].resources
    }

    /// End the current frame.
    ///
    /// Records `graph` into a pooled command buffer and submits it with a
    /// pooled fence, then advances to the next slot. If the graph fails to
    /// execute nothing is submitted, the frame stays open and its nodes keep
    /// their state.
    pub fn end_frame(&mut self, graph: &Graph) -> Result<ExecutionStats, GraphicsError> {
        profile_scope!("end_frame");
        assert!(self.frame_active, "end_frame called without begin_frame");

        let device = Arc::clone(&self.device);
        let command_buffer = self.command_buffers.acquire()?;
        let fence = self.fences.acquire()?;

        let slot_index = self.current_slot;
        let slot = &mut self.slots[slot_index];

        let result = {
            let mut recorder = device.begin_commands(*command_buffer)?;
            self.executor.execute(
                &mut slot.allocator,
                graph,
                slot_index as u32,
                &mut *recorder,
                &mut slot.resources,
            )
        };
        device.end_commands(*command_buffer)?;
        let stats = result?;

        device.submit(&Submission {
            command_buffers: &[*command_buffer],
            fence: Some(*fence),
            ..Default::default()
        })?;

        slot.in_flight = Some(InFlight {
            fence,
            command_buffer,
        });

        log::trace!(
            "End frame {} (slot {}): {} nodes, {} barriers",
            self.frame_count,
            slot_index,
            stats.nodes_executed,
            stats.barriers_emitted
        );

        self.current_slot = (self.current_slot + 1) % self.config.frames_in_flight;
        self.frame_active = false;
        frame_mark!();

        Ok(stats)
    }

    /// Wait for all in-flight GPU work to complete.
    ///
    /// Call this before destroying resources the GPU may still use.
    pub fn wait_idle(&self) -> Result<(), GraphicsError> {
        log::trace!("Waiting for GPU idle ({} slots)", self.config.frames_in_flight);
        self.device.wait_idle()?;
        log::trace!("GPU idle");
        Ok(())
    }

    /// Check if a specific frame slot is ready (non-blocking).
    ///
    /// Returns `true` if the slot's fence is signaled or if the slot has not
    /// been submitted yet.
    pub fn is_slot_ready(&self, slot: usize) -> bool {
        assert!(slot < self.config.frames_in_flight, "Invalid slot index");

        match &self.slots[slot].in_flight {
            Some(in_flight) => matches!(
                self.device.fence_status(*in_flight.fence),
                Ok(FenceStatus::Signaled)
            ),
            None => true,
        }
    }

    /// Check if all frame slots are ready (non-blocking).
    pub fn is_idle(&self) -> bool {
        (0..self.config.frames_in_flight).all(|slot| self.is_slot_ready(slot))
    }

    pub fn frames_in_flight(&self) -> usize {
        self.config.frames_in_flight
    }

    /// Current frame slot index, from 0 to `frames_in_flight - 1`.
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Total frames started with [`begin_frame`](Self::begin_frame).
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    /// Descriptor set pool shared by every slot.
    pub fn descriptor_sets(&self) -> &DescriptorSetPool {
        &self.descriptor_sets
    }

    pub fn executor(&self) -> &GraphExecutor {
        &self.executor
    }

    /// Executor, e.g. to declare image layouts established outside the graph.
    pub fn executor_mut(&mut self) -> &mut GraphExecutor {
        &mut self.executor
    }

    /// Drop the tracked layouts of a destroyed image.
    pub fn forget_image(&mut self, image: ImageHandle) {
        self.executor.layouts_mut().forget(image);
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::error!("FrameScheduler: wait_idle failed during drop: {e}");
        }
        for slot in &mut self.slots {
            slot.resources.release();
            slot.in_flight = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;
    use crate::types::{
        AccessFlags, BufferHandle, BufferRange, DescriptorSetLayoutHandle, ImageLayout, ImageRange,
        PipelineStages,
    };

    fn scheduler(frames_in_flight: usize) -> (Arc<DummyDevice>, FrameScheduler) {
        let device = Arc::new(DummyDevice::new());
        let config = FrameConfig::new().with_frames_in_flight(frames_in_flight);
        let scheduler = FrameScheduler::new(device.clone(), config).unwrap();
        (device, scheduler)
    }

    fn run_frame(scheduler: &mut FrameScheduler) -> ExecutionStats {
        scheduler.begin_frame().unwrap();
        let node = scheduler.allocator().allocate("frame");
        scheduler.end_frame(&node.into()).unwrap()
    }

    #[test]
    fn test_new() {
        let (_, scheduler) = scheduler(2);
        assert_eq!(scheduler.frames_in_flight(), 2);
        assert_eq!(scheduler.current_slot(), 0);
        assert_eq!(scheduler.frame_count(), 0);
    }

    #[test]
    fn test_default_config() {
        let config = FrameConfig::default();
        assert_eq!(config.frames_in_flight, DEFAULT_FRAMES_IN_FLIGHT);
        assert_eq!(config.fence_timeout, DEFAULT_FENCE_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_frames_rejected() {
        let device = Arc::new(DummyDevice::new());
        let config = FrameConfig::new().with_frames_in_flight(0);
        let err = FrameScheduler::new(device, config).unwrap_err();
        assert!(matches!(err, GraphicsError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_end_frame_advances_slot() {
        let (device, mut scheduler) = scheduler(3);

        run_frame(&mut scheduler);
        assert_eq!(scheduler.current_slot(), 1);
        run_frame(&mut scheduler);
        assert_eq!(scheduler.current_slot(), 2);
        run_frame(&mut scheduler);
        assert_eq!(scheduler.current_slot(), 0); // Wraps around

        assert_eq!(scheduler.frame_count(), 3);
        assert_eq!(device.submissions().len(), 3);
    }

    #[test]
    fn test_is_slot_ready_unused() {
        let (_, scheduler) = scheduler(2);
        assert!(scheduler.is_slot_ready(0));
        assert!(scheduler.is_slot_ready(1));
        assert!(scheduler.is_idle());
    }

    #[test]
    #[should_panic(expected = "Invalid slot index")]
    fn test_is_slot_ready_invalid() {
        let (_, scheduler) = scheduler(2);
        scheduler.is_slot_ready(5);
    }

    #[test]
    #[should_panic(expected = "end_frame called without begin_frame")]
    fn test_end_frame_without_begin_panics() {
        let (_, mut scheduler) = scheduler(2);
        let _ = scheduler.end_frame(&Graph::empty());
    }

    #[test]
    fn test_fences_and_command_buffers_recycled() {
        let (device, mut scheduler) = scheduler(2);

        for _ in 0..6 {
            run_frame(&mut scheduler);
        }

        // One fence and one command buffer per slot.
        assert_eq!(device.fences_created(), 2);
        assert_eq!(device.command_buffers_allocated(), 2);
    }

    #[test]
    fn test_frame_index_is_slot() {
        let (_, mut scheduler) = scheduler(2);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for _ in 0..3 {
            scheduler.begin_frame().unwrap();
            let mut frame = scheduler.frame();
            let node = frame.allocator.allocate("record");
            let sink = Arc::clone(&seen);
            frame
                .allocator
                .node_mut(node)
                .set_callback(move |index, _, _| sink.lock().push(index));
            scheduler.end_frame(&node.into()).unwrap();
        }

        assert_eq!(*seen.lock(), vec![0, 1, 0]);
    }

    #[test]
    fn test_resources_released_once_slot_reused() {
        let (_, mut scheduler) = scheduler(2);
        let layout = DescriptorSetLayoutHandle::from_raw(1);

        scheduler.begin_frame().unwrap();
        let set = scheduler.descriptor_sets().acquire_shared(layout).unwrap();
        scheduler.resources().add_resource(set);
        let node = scheduler.allocator().allocate("bind");
        scheduler.end_frame(&node.into()).unwrap();
        assert_eq!(scheduler.descriptor_sets().acquired(), 1);

        run_frame(&mut scheduler);
        assert_eq!(scheduler.descriptor_sets().acquired(), 1);

        // Slot 0 again: its container is released.
        scheduler.begin_frame().unwrap();
        assert_eq!(scheduler.descriptor_sets().acquired(), 0);
        assert_eq!(scheduler.descriptor_sets().pooled(), 1);
    }

    #[test]
    fn test_fence_timeout_keeps_slot() {
        let device = Arc::new(DummyDevice::new());
        device.set_auto_complete(false);
        let config = FrameConfig::new()
            .with_frames_in_flight(1)
            .with_fence_timeout(Duration::from_millis(1));
        let mut scheduler = FrameScheduler::new(device.clone(), config).unwrap();
        let released = Arc::new(std::sync::atomic::AtomicBool::new(false));

        scheduler.begin_frame().unwrap();
        let flag = Arc::clone(&released);
        scheduler
            .resources()
            .defer(move || flag.store(true, std::sync::atomic::Ordering::SeqCst));
        let node = scheduler.allocator().allocate("pending");
        scheduler.end_frame(&node.into()).unwrap();

        assert!(!scheduler.is_slot_ready(0));
        assert_eq!(scheduler.begin_frame(), Err(GraphicsError::FenceTimeout));
        assert!(!released.load(std::sync::atomic::Ordering::SeqCst));

        device.complete_pending();
        assert!(scheduler.is_slot_ready(0));
        scheduler.begin_frame().unwrap();
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_failed_execution_submits_nothing() {
        let (device, mut scheduler) = scheduler(2);
        let buffer = BufferRange::whole(BufferHandle::from_raw(1));

        scheduler.begin_frame().unwrap();
        let allocator = scheduler.allocator();
        let a = allocator.allocate("a");
        let b = allocator.allocate("b");
        allocator.node_mut(a).add_buffer(buffer, AccessFlags::SHADER_WRITE);
        allocator.add_next(a, b);
        allocator.add_next(b, a);

        let err = scheduler.end_frame(&a.into()).unwrap_err();
        assert!(matches!(err, GraphicsError::CyclicDependency { .. }));
        assert!(device.submissions().is_empty());
        assert_eq!(scheduler.current_slot(), 0);
    }

    #[test]
    fn test_forget_image_resets_layout() {
        let (_, mut scheduler) = scheduler(2);
        let image = ImageHandle::from_raw(7);
        let target = ImageRange::color(image);
        let other = ImageRange::color(ImageHandle::from_raw(8));

        scheduler.begin_frame().unwrap();
        let allocator = scheduler.allocator();
        let draw = allocator.allocate("draw");
        allocator
            .node_mut(draw)
            .set_stages(
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            )
            .add_image(target, ImageLayout::ColorAttachment, AccessFlags::COLOR_ATTACHMENT_WRITE)
            .add_image(other, ImageLayout::ColorAttachment, AccessFlags::COLOR_ATTACHMENT_WRITE);
        scheduler.end_frame(&draw.into()).unwrap();
        assert_eq!(scheduler.executor().image_layout(&target), ImageLayout::ColorAttachment);
        assert_eq!(scheduler.executor().layouts().len(), 2);

        scheduler.forget_image(image);
        assert_eq!(scheduler.executor().image_layout(&target), ImageLayout::Undefined);
        assert_eq!(scheduler.executor().image_layout(&other), ImageLayout::ColorAttachment);
        assert_eq!(scheduler.executor().layouts().len(), 1);
    }

    static_assertions::assert_impl_all!(FrameScheduler: Send);
}
