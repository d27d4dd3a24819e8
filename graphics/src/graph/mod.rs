//! Render graph infrastructure.
//!
//! A frame's GPU work is described as a graph of [`Node`]s living in a
//! [`RenderGraphAllocator`]. Nodes declare the image and buffer ranges they
//! touch; the executor handles:
//!
//! - Dependency ordering via topological sort
//! - Barrier insertion between conflicting accesses
//! - Image layout tracking across frames
//! - Cycle and stall detection before anything is recorded
//!
//! # Architecture
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Frame | [`FrameScheduler`](crate::frame::FrameScheduler) | Multiple frames in flight |
//! | Execution | [`GraphExecutor`] | Barriers and callbacks into one command buffer |
//! | **Graph** | [`Graph`], [`GraphBuilder`] | Node dependencies (this module) |
//! | Node | [`Node`] | Single unit of GPU work |
//!
//! # Example
//!
//! ```ignore
//! use vesta_graphics::graph::{GraphBuilder, RenderGraphAllocator};
//! use vesta_graphics::types::{AccessFlags, BufferRange, PipelineStages};
//!
//! let mut allocator = RenderGraphAllocator::new();
//!
//! let simulate = allocator.allocate("simulate");
//! allocator
//!     .node_mut(simulate)
//!     .set_stages(PipelineStages::COMPUTE_SHADER, PipelineStages::COMPUTE_SHADER)
//!     .add_buffer(particles, AccessFlags::SHADER_WRITE)
//!     .set_callback(|frame, recorder, resources| { /* dispatch */ });
//!
//! let draw = allocator.allocate("draw");
//! allocator
//!     .node_mut(draw)
//!     .set_stages(PipelineStages::VERTEX_INPUT, PipelineStages::COLOR_ATTACHMENT_OUTPUT)
//!     .add_buffer(particles, AccessFlags::VERTEX_ATTRIBUTE_READ);
//!
//! let mut builder = GraphBuilder::new();
//! builder.concat(&mut allocator, simulate);
//! builder.concat(&mut allocator, draw);
//! let graph = builder.build();
//! ```

mod allocator;
mod compiler;
pub mod dot;
mod executor;
mod helpers;
mod node;

pub use allocator::{
    DEFAULT_MAX_NODES, Direction, Graph, GraphBuilder, GraphConfig, RenderGraphAllocator, gather,
};
pub use compiler::{CompiledGraph, ImageLayouts, compile};
pub use executor::{ExecutionStats, GraphExecutor};
pub use helpers::{clear_color_image, clear_depth_stencil_image};
pub use node::{BufferAccess, ImageAccess, Node, NodeCallback, NodeHandle, NodeState};
