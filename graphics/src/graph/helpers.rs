//! Ready-made nodes for common transfer work.

use crate::types::{AccessFlags, ImageLayout, ImageRange, PipelineStages};

use super::allocator::RenderGraphAllocator;
use super::node::NodeHandle;

/// Allocate a node that clears a color image to `color`.
pub fn clear_color_image(
    allocator: &mut RenderGraphAllocator,
    range: ImageRange,
    color: [f32; 4],
) -> NodeHandle {
    let handle = allocator.allocate("clear_color_image");
    allocator
        .node_mut(handle)
        .set_stages(PipelineStages::TRANSFER, PipelineStages::TRANSFER)
        .add_image(range, ImageLayout::TransferDst, AccessFlags::TRANSFER_WRITE)
        .set_callback(move |_, recorder, _| {
            recorder.clear_color_image(&range, ImageLayout::TransferDst, color);
        });
    handle
}

/// Allocate a node that clears a depth/stencil image.
pub fn clear_depth_stencil_image(
    allocator: &mut RenderGraphAllocator,
    range: ImageRange,
    depth: f32,
    stencil: u32,
) -> NodeHandle {
    let handle = allocator.allocate("clear_depth_stencil_image");
    allocator
        .node_mut(handle)
        .set_stages(PipelineStages::TRANSFER, PipelineStages::TRANSFER)
        .add_image(range, ImageLayout::TransferDst, AccessFlags::TRANSFER_WRITE)
        .set_callback(move |_, recorder, _| {
            recorder.clear_depth_stencil_image(&range, ImageLayout::TransferDst, depth, stencil);
        });
    handle
}
