//! Command recording into Vulkan command buffers.

use std::ffi::CString;

use ash::vk;

use crate::backend::{CommandRecorder, PipelineBarrier};
use crate::types::{
    BufferRange, CommandBufferHandle, ImageLayout, ImageRange, PipelineStages, QueryPoolHandle,
};

use super::conversion::{
    convert_access, convert_layout, convert_stages, convert_subresource_range, vk_buffer,
    vk_command_buffer, vk_image, vk_query_pool,
};

/// Records into one command buffer between `begin_commands` and `end_commands`.
pub struct VulkanRecorder<'a> {
    pub(super) device: &'a ash::Device,
    pub(super) debug_utils: Option<&'a ash::ext::debug_utils::Device>,
    pub(super) command_buffer: CommandBufferHandle,
}

impl VulkanRecorder<'_> {
    fn cmd(&self) -> vk::CommandBuffer {
        vk_command_buffer(self.command_buffer)
    }
}

fn buffer_size(range: &BufferRange) -> vk::DeviceSize {
    if range.size == BufferRange::WHOLE_SIZE {
        vk::WHOLE_SIZE
    } else {
        range.size
    }
}

impl CommandRecorder for VulkanRecorder<'_> {
    fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier) {
        let image_barriers: Vec<vk::ImageMemoryBarrier> = barrier
            .image_barriers
            .iter()
            .map(|b| {
                vk::ImageMemoryBarrier::default()
                    .old_layout(convert_layout(b.old_layout))
                    .new_layout(convert_layout(b.new_layout))
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(vk_image(b.range.image))
                    .subresource_range(convert_subresource_range(&b.range))
                    .src_access_mask(convert_access(b.src_access))
                    .dst_access_mask(convert_access(b.dst_access))
            })
            .collect();

        let buffer_barriers: Vec<vk::BufferMemoryBarrier> = barrier
            .buffer_barriers
            .iter()
            .map(|b| {
                vk::BufferMemoryBarrier::default()
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(vk_buffer(b.range.buffer))
                    .offset(b.range.offset)
                    .size(buffer_size(&b.range))
                    .src_access_mask(convert_access(b.src_access))
                    .dst_access_mask(convert_access(b.dst_access))
            })
            .collect();

        log::trace!(
            "Vulkan: barrier {:?} -> {:?} ({} images, {} buffers)",
            barrier.src_stages,
            barrier.dst_stages,
            image_barriers.len(),
            buffer_barriers.len()
        );

        unsafe {
            self.device.cmd_pipeline_barrier(
                self.cmd(),
                convert_stages(barrier.src_stages),
                convert_stages(barrier.dst_stages),
                vk::DependencyFlags::empty(),
                &[],
                &buffer_barriers,
                &image_barriers,
            );
        }
    }

    fn reset_query_pool(&mut self, pool: QueryPoolHandle, first: u32, count: u32) {
        unsafe {
            self.device
                .cmd_reset_query_pool(self.cmd(), vk_query_pool(pool), first, count);
        }
    }

    fn write_timestamp(&mut self, stage: PipelineStages, pool: QueryPoolHandle, query: u32) {
        unsafe {
            self.device.cmd_write_timestamp(
                self.cmd(),
                convert_stages(stage),
                vk_query_pool(pool),
                query,
            );
        }
    }

    fn clear_color_image(&mut self, range: &ImageRange, layout: ImageLayout, color: [f32; 4]) {
        let value = vk::ClearColorValue { float32: color };
        unsafe {
            self.device.cmd_clear_color_image(
                self.cmd(),
                vk_image(range.image),
                convert_layout(layout),
                &value,
                &[convert_subresource_range(range)],
            );
        }
    }

    fn clear_depth_stencil_image(
        &mut self,
        range: &ImageRange,
        layout: ImageLayout,
        depth: f32,
        stencil: u32,
    ) {
        let value = vk::ClearDepthStencilValue { depth, stencil };
        unsafe {
            self.device.cmd_clear_depth_stencil_image(
                self.cmd(),
                vk_image(range.image),
                convert_layout(layout),
                &value,
                &[convert_subresource_range(range)],
            );
        }
    }

    fn insert_label(&mut self, label: &str) {
        let Some(debug_utils) = self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(label) else {
            log::warn!("Vulkan: debug label {label:?} contains a NUL byte");
            return;
        };

        let label = vk::DebugUtilsLabelEXT::default().label_name(&name);
        unsafe {
            debug_utils.cmd_insert_debug_utils_label(self.cmd(), &label);
        }
    }
}
