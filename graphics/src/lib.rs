//! # Vesta Graphics
//!
//! Per-frame GPU command scheduling on top of pooled GPU objects.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`graph`] - Per-frame render graph with automatic barrier insertion
//! - [`pools`] - Descriptor set, fence, semaphore and command buffer pools
//! - [`ResourceContainer`] - Keeps a frame's resources alive until its fence signals
//! - [`FrameScheduler`] - Multiple frames in flight over one [`GpuDevice`]
//! - [`GpuProfiler`] - Timestamp queries around a graph
//! - Multiple backend support: Vulkan and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vesta_graphics::{FrameConfig, FrameScheduler};
//! use vesta_graphics::backend::dummy::DummyDevice;
//!
//! let device = Arc::new(DummyDevice::new());
//! let mut scheduler = FrameScheduler::new(device, FrameConfig::new())?;
//!
//! scheduler.begin_frame()?;
//! let node = scheduler.allocator().allocate("main");
//! scheduler.end_frame(&node.into())?;
//! ```

pub mod backend;
pub mod container;
pub mod error;
pub mod frame;
pub mod graph;
pub mod pools;
pub mod profiler;
pub mod profiling;
pub mod types;

// Re-export main types for convenience
pub use backend::{CommandRecorder, GpuDevice, PipelineBarrier, Submission};
pub use container::{ResourceBundle, ResourceContainer};
pub use error::GraphicsError;
pub use frame::{Frame, FrameConfig, FrameScheduler};
pub use graph::{
    Graph, GraphBuilder, GraphConfig, GraphExecutor, Node, NodeHandle, RenderGraphAllocator,
    gather,
};
pub use pools::{
    CommandBufferPool, DescriptorPoolConfig, DescriptorSetPool, FencePool, SemaphorePool,
    SharedDescriptorSet,
};
pub use profiler::GpuProfiler;

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
