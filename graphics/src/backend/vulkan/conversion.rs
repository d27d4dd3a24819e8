//! Type conversions between Vesta types and Vulkan types.
//!
//! Flag and enum values already match Vulkan, so most conversions are raw
//! casts. Handles carry the raw 64-bit Vulkan handle.

use ash::vk;
use ash::vk::Handle;

use crate::error::GraphicsError;
use crate::types::{
    AccessFlags, BufferHandle, CommandBufferHandle, DescriptorPoolHandle, DescriptorPoolSize,
    DescriptorSetHandle, DescriptorSetLayoutHandle, FenceHandle, ImageAspects, ImageHandle,
    ImageLayout, ImageRange, PipelineStages, QueryPoolHandle, SemaphoreHandle,
};

pub fn convert_stages(stages: PipelineStages) -> vk::PipelineStageFlags {
    vk::PipelineStageFlags::from_raw(stages.bits())
}

pub fn convert_access(access: AccessFlags) -> vk::AccessFlags {
    vk::AccessFlags::from_raw(access.bits())
}

pub fn convert_layout(layout: ImageLayout) -> vk::ImageLayout {
    vk::ImageLayout::from_raw(layout.as_raw())
}

pub fn convert_aspects(aspects: ImageAspects) -> vk::ImageAspectFlags {
    vk::ImageAspectFlags::from_raw(aspects.bits())
}

/// Subresource range covering exactly one mip level and array layer.
pub fn convert_subresource_range(range: &ImageRange) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: convert_aspects(range.aspects),
        base_mip_level: range.mip_level,
        level_count: 1,
        base_array_layer: range.array_layer,
        layer_count: 1,
    }
}

pub fn convert_pool_size(size: &DescriptorPoolSize) -> vk::DescriptorPoolSize {
    vk::DescriptorPoolSize {
        ty: vk::DescriptorType::from_raw(size.ty.as_raw()),
        descriptor_count: size.count,
    }
}

/// Map a Vulkan error to a [`GraphicsError`], keeping `context` in the message.
pub fn convert_error(context: &str, result: vk::Result) -> GraphicsError {
    match result {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            GraphicsError::OutOfMemory
        }
        vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
        e => GraphicsError::ResourceCreationFailed(format!("{context}: {e:?}")),
    }
}

macro_rules! handle_conversions {
    ($($to_vk:ident, $from_vk:ident: $ours:ty => $theirs:ty;)+) => {
        $(
            pub fn $to_vk(handle: $ours) -> $theirs {
                <$theirs>::from_raw(handle.as_raw())
            }

            pub fn $from_vk(handle: $theirs) -> $ours {
                <$ours>::from_raw(handle.as_raw())
            }
        )+
    };
}

handle_conversions! {
    vk_descriptor_pool, from_descriptor_pool: DescriptorPoolHandle => vk::DescriptorPool;
    vk_descriptor_set, from_descriptor_set: DescriptorSetHandle => vk::DescriptorSet;
    vk_descriptor_set_layout, from_descriptor_set_layout: DescriptorSetLayoutHandle => vk::DescriptorSetLayout;
    vk_fence, from_fence: FenceHandle => vk::Fence;
    vk_semaphore, from_semaphore: SemaphoreHandle => vk::Semaphore;
    vk_command_buffer, from_command_buffer: CommandBufferHandle => vk::CommandBuffer;
    vk_image, from_image: ImageHandle => vk::Image;
    vk_buffer, from_buffer: BufferHandle => vk::Buffer;
    vk_query_pool, from_query_pool: QueryPoolHandle => vk::QueryPool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DescriptorType;

    #[test]
    fn test_flag_values_match_vulkan() {
        assert_eq!(
            convert_stages(PipelineStages::COMPUTE_SHADER | PipelineStages::TRANSFER),
            vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::TRANSFER
        );
        assert_eq!(
            convert_access(AccessFlags::SHADER_WRITE | AccessFlags::MEMORY_READ),
            vk::AccessFlags::SHADER_WRITE | vk::AccessFlags::MEMORY_READ
        );
        assert_eq!(
            convert_aspects(ImageAspects::DEPTH | ImageAspects::STENCIL),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_layout_values_match_vulkan() {
        assert_eq!(
            convert_layout(ImageLayout::TransferDst),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        );
        assert_eq!(
            convert_layout(ImageLayout::ShaderReadOnly),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
        assert_eq!(
            convert_layout(ImageLayout::PresentSrc),
            vk::ImageLayout::PRESENT_SRC_KHR
        );
    }

    #[test]
    fn test_descriptor_types_match_vulkan() {
        let size = convert_pool_size(&DescriptorPoolSize::new(DescriptorType::StorageBuffer, 4));
        assert_eq!(size.ty, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(size.descriptor_count, 4);
    }

    #[test]
    fn test_handle_round_trip() {
        let fence = FenceHandle::from_raw(0xdead_beef);
        assert_eq!(vk_fence(fence).as_raw(), 0xdead_beef);
        assert_eq!(from_fence(vk_fence(fence)), fence);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            convert_error("alloc", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            GraphicsError::OutOfMemory
        );
        assert_eq!(
            convert_error("submit", vk::Result::ERROR_DEVICE_LOST),
            GraphicsError::DeviceLost
        );
        assert!(matches!(
            convert_error("pool", vk::Result::ERROR_FRAGMENTED_POOL),
            GraphicsError::ResourceCreationFailed(_)
        ));
    }
}
