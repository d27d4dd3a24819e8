//! Common types shared by pools, the render graph and backends.
//!
//! This module contains opaque GPU handles, synchronization flags, image and
//! buffer ranges, and descriptor pool sizing.

mod descriptor;
mod handles;
mod image;
mod sync;

pub use descriptor::{DescriptorPoolSize, DescriptorType};
pub use handles::{
    BufferHandle, CommandBufferHandle, DescriptorPoolHandle, DescriptorSetHandle,
    DescriptorSetLayoutHandle, FenceHandle, ImageHandle, QueryPoolHandle, SemaphoreHandle,
};
pub use image::{BufferRange, ImageAspects, ImageLayout, ImageRange};
pub use sync::{AccessFlags, AccessMode, FenceStatus, PipelineStages};
