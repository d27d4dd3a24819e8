//! Fence and semaphore pools.

use std::sync::Arc;

use vesta_core::pool::{ObjectPool, PoolStrategy, Pooled, Recycler};

use crate::backend::GpuDevice;
use crate::error::GraphicsError;
use crate::types::{FenceHandle, SemaphoreHandle};

/// Strategy for pooled fences.
///
/// Fresh fences are created unsignaled. A reused fence is reset back to
/// unsignaled before it is handed out.
#[derive(Debug, Clone)]
pub struct FenceStrategy {
    device: Arc<dyn GpuDevice>,
}

impl FenceStrategy {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self { device }
    }

    /// Get the device fences are created on.
    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }
}

impl Recycler for FenceStrategy {
    type Object = FenceHandle;

    fn destroy(&self, fence: FenceHandle) {
        self.device.destroy_fence(fence);
    }
}

impl PoolStrategy for FenceStrategy {
    type Error = GraphicsError;

    fn create(&self) -> Result<FenceHandle, GraphicsError> {
        let fence = self.device.create_fence(false)?;
        log::debug!("FencePool: created {fence:?}");
        Ok(fence)
    }

    fn reset(&self, fence: &mut FenceHandle) -> Result<(), GraphicsError> {
        self.device.reset_fence(*fence)
    }
}

/// Pool of fences.
pub type FencePool = ObjectPool<FenceStrategy>;

/// A fence checked out of a [`FencePool`].
pub type PooledFence = Pooled<FenceStrategy>;

/// Strategy for pooled binary semaphores.
///
/// A semaphore is unsignaled again once its wait completed, so reuse needs no
/// reset.
#[derive(Debug, Clone)]
pub struct SemaphoreStrategy {
    device: Arc<dyn GpuDevice>,
}

impl SemaphoreStrategy {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self { device }
    }
}

impl Recycler for SemaphoreStrategy {
    type Object = SemaphoreHandle;

    fn destroy(&self, semaphore: SemaphoreHandle) {
        self.device.destroy_semaphore(semaphore);
    }
}

impl PoolStrategy for SemaphoreStrategy {
    type Error = GraphicsError;

    fn create(&self) -> Result<SemaphoreHandle, GraphicsError> {
        self.device.create_semaphore()
    }

    fn reset(&self, _semaphore: &mut SemaphoreHandle) -> Result<(), GraphicsError> {
        Ok(())
    }
}

/// Pool of binary semaphores.
pub type SemaphorePool = ObjectPool<SemaphoreStrategy>;

/// A semaphore checked out of a [`SemaphorePool`].
pub type PooledSemaphore = Pooled<SemaphoreStrategy>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyDevice;
    use crate::types::FenceStatus;

    #[test]
    fn test_fresh_fence_is_unsignaled() {
        let device = Arc::new(DummyDevice::new());
        let pool = FencePool::new(FenceStrategy::new(device.clone()));

        let fence = pool.acquire().unwrap();
        assert_eq!(device.fence_status(*fence).unwrap(), FenceStatus::Unsignaled);
        assert_eq!(device.fences_created(), 1);
    }

    #[test]
    fn test_reused_fence_is_reset() {
        let device = Arc::new(DummyDevice::new());
        let pool = FencePool::new(FenceStrategy::new(device.clone()));

        let fence = pool.acquire().unwrap();
        let handle = *fence;
        device.signal_fence(handle);
        drop(fence);

        let again = pool.acquire().unwrap();
        assert_eq!(*again, handle);
        assert_eq!(device.fence_status(handle).unwrap(), FenceStatus::Unsignaled);
        assert_eq!(device.fences_created(), 1);
    }

    #[test]
    fn test_pooled_fences_destroyed_with_pool() {
        let device = Arc::new(DummyDevice::new());
        let pool = FencePool::new(FenceStrategy::new(device.clone()));

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        drop(a);
        drop(b);
        assert_eq!(device.live_fences(), 2);

        drop(pool);
        assert_eq!(device.live_fences(), 0);
    }

    #[test]
    fn test_semaphore_reuse() {
        let device = Arc::new(DummyDevice::new());
        let pool = SemaphorePool::new(SemaphoreStrategy::new(device.clone()));

        let semaphore = pool.acquire().unwrap();
        let handle = *semaphore;
        drop(semaphore);

        assert_eq!(*pool.acquire().unwrap(), handle);
        assert_eq!(device.live_semaphores(), 1);
    }

    static_assertions::assert_impl_all!(FencePool: Send, Sync);
    static_assertions::assert_impl_all!(PooledFence: Send, Sync);
}
