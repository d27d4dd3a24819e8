//! Pools of GPU objects built on [`vesta_core::pool::ObjectPool`].
//!
//! | Pool | Object | On reuse |
//! |------|--------|----------|
//! | [`DescriptorSetPool`] | descriptor set | same layout reused, otherwise evicted and reallocated |
//! | [`FencePool`] | fence | reset to unsignaled |
//! | [`SemaphorePool`] | binary semaphore | nothing |
//! | [`CommandBufferPool`] | primary command buffer | reset to the initial state |
//!
//! Every pool is `Send + Sync` and cheap to clone. Checked-out objects return
//! to their pool when dropped, so anything the GPU may still use must be kept
//! alive in the frame's [`ResourceContainer`](crate::container::ResourceContainer)
//! until the frame's fence is signaled.

mod command;
mod descriptor;
mod sync;

pub use command::{CommandBufferPool, CommandBufferStrategy, PooledCommandBuffer};
pub use descriptor::{
    DEFAULT_DESCRIPTORS_PER_TYPE, DEFAULT_MAX_SETS, DescriptorPoolConfig, DescriptorRecycler,
    DescriptorSetPool, ManagedDescriptorSet, PooledDescriptorSet, SharedDescriptorSet,
};
pub use sync::{
    FencePool, FenceStrategy, PooledFence, PooledSemaphore, SemaphorePool, SemaphoreStrategy,
};
