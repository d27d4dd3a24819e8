//! Opaque handles to GPU objects.
//!
//! Handles are plain 64-bit values so they can carry native handles of any
//! backend (Vulkan handles are 64-bit on every platform). Zero is reserved as
//! the null handle.

macro_rules! define_handle {
    ($($(#[$meta:meta])* $name:ident;)+) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
            pub struct $name(u64);

            impl $name {
                /// The null handle.
                pub const NULL: Self = Self(0);

                /// Wrap a raw backend handle.
                pub const fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                /// Get the raw backend handle.
                pub const fn as_raw(self) -> u64 {
                    self.0
                }

                /// Check if this is the null handle.
                pub const fn is_null(self) -> bool {
                    self.0 == 0
                }
            }
        )+
    };
}

define_handle! {
    /// Layout that a descriptor set is allocated for.
    DescriptorSetLayoutHandle;
    /// Backing descriptor pool (a sub-pool of the descriptor-set pool).
    DescriptorPoolHandle;
    /// Descriptor set carved from a descriptor pool.
    DescriptorSetHandle;
    /// CPU-GPU completion signal.
    FenceHandle;
    /// GPU-GPU synchronization signal.
    SemaphoreHandle;
    /// Primary command buffer.
    CommandBufferHandle;
    /// Image owned by a collaborator.
    ImageHandle;
    /// Buffer owned by a collaborator.
    BufferHandle;
    /// Timestamp query pool.
    QueryPoolHandle;
}
