//! Descriptor types and pool sizing.

/// Kind of binding in a descriptor set.
///
/// Discriminants match `VkDescriptorType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum DescriptorType {
    Sampler = 0,
    CombinedImageSampler = 1,
    SampledImage = 2,
    StorageImage = 3,
    UniformTexelBuffer = 4,
    StorageTexelBuffer = 5,
    UniformBuffer = 6,
    StorageBuffer = 7,
    UniformBufferDynamic = 8,
    StorageBufferDynamic = 9,
    InputAttachment = 10,
}

impl DescriptorType {
    /// Every descriptor type.
    pub const ALL: [Self; 11] = [
        Self::Sampler,
        Self::CombinedImageSampler,
        Self::SampledImage,
        Self::StorageImage,
        Self::UniformTexelBuffer,
        Self::StorageTexelBuffer,
        Self::UniformBuffer,
        Self::StorageBuffer,
        Self::UniformBufferDynamic,
        Self::StorageBufferDynamic,
        Self::InputAttachment,
    ];

    /// Raw Vulkan value of the type.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// Number of descriptors of one type a sub-pool can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorPoolSize {
    pub ty: DescriptorType,
    pub count: u32,
}

impl DescriptorPoolSize {
    /// Create a pool size entry.
    pub fn new(ty: DescriptorType, count: u32) -> Self {
        Self { ty, count }
    }
}
