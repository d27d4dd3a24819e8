//! Image and buffer ranges referenced by graph nodes.

use bitflags::bitflags;

use super::{BufferHandle, ImageHandle};

bitflags! {
    /// Aspects of an image a node touches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageAspects: u32 {
        const COLOR = 0x1;
        const DEPTH = 0x2;
        const STENCIL = 0x4;
    }
}

impl Default for ImageAspects {
    fn default() -> Self {
        Self::empty()
    }
}

/// Layout an image subresource is in.
///
/// Discriminants match `VkImageLayout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum ImageLayout {
    /// Contents are undefined and may be discarded.
    #[default]
    Undefined = 0,
    General = 1,
    ColorAttachment = 2,
    DepthStencilAttachment = 3,
    DepthStencilReadOnly = 4,
    ShaderReadOnly = 5,
    TransferSrc = 6,
    TransferDst = 7,
    PresentSrc = 1_000_001_002,
}

impl ImageLayout {
    /// Raw Vulkan value of the layout.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

/// One mip level and array layer of an image, for one or more aspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageRange {
    pub image: ImageHandle,
    pub aspects: ImageAspects,
    pub mip_level: u32,
    pub array_layer: u32,
}

impl ImageRange {
    /// Mip 0, layer 0 of `image` for the given aspects.
    pub fn new(image: ImageHandle, aspects: ImageAspects) -> Self {
        Self {
            image,
            aspects,
            mip_level: 0,
            array_layer: 0,
        }
    }

    /// Color aspect of mip 0, layer 0.
    pub fn color(image: ImageHandle) -> Self {
        Self::new(image, ImageAspects::COLOR)
    }

    /// Depth and stencil aspects of mip 0, layer 0.
    pub fn depth_stencil(image: ImageHandle) -> Self {
        Self::new(image, ImageAspects::DEPTH | ImageAspects::STENCIL)
    }

    /// Select a mip level.
    pub fn with_mip_level(mut self, mip_level: u32) -> Self {
        self.mip_level = mip_level;
        self
    }

    /// Select an array layer.
    pub fn with_array_layer(mut self, array_layer: u32) -> Self {
        self.array_layer = array_layer;
        self
    }
}

/// A byte range of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRange {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub size: u64,
}

impl BufferRange {
    /// Size value meaning "to the end of the buffer".
    pub const WHOLE_SIZE: u64 = u64::MAX;

    /// The whole buffer.
    pub fn whole(buffer: BufferHandle) -> Self {
        Self {
            buffer,
            offset: 0,
            size: Self::WHOLE_SIZE,
        }
    }

    /// A sub-range of the buffer.
    pub fn new(buffer: BufferHandle, offset: u64, size: u64) -> Self {
        Self {
            buffer,
            offset,
            size,
        }
    }
}
