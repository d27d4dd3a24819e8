//! Descriptor set pool backed by growable descriptor sub-pools.
//!
//! Sets are carved from fixed-capacity sub-pools created on demand. Released
//! sets go back to a free list instead of being freed, and [`DescriptorSetPool::acquire`]
//! picks the cheapest way to satisfy a request:
//!
//! 1. a released set with the requested layout is handed out as is;
//! 2. otherwise the oldest released set is freed and its capacity reused for
//!    the requested layout, in the same sub-pool;
//! 3. otherwise a new sub-pool is created when there is none yet or the active
//!    one already handed out `max_sets` sets;
//! 4. otherwise a set is allocated from the active sub-pool.

use std::sync::Arc;

use parking_lot::Mutex;
use vesta_core::pool::{ObjectPool, Pooled, Recycler};

use crate::backend::GpuDevice;
use crate::error::GraphicsError;
use crate::types::{
    DescriptorPoolHandle, DescriptorPoolSize, DescriptorSetHandle, DescriptorSetLayoutHandle,
    DescriptorType,
};

/// Default number of sets per sub-pool.
pub const DEFAULT_MAX_SETS: u32 = 32;

/// Default number of descriptors of each type per sub-pool.
pub const DEFAULT_DESCRIPTORS_PER_TYPE: u32 = 32;

/// Sizing of every descriptor sub-pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorPoolConfig {
    /// Maximum sets carved from one sub-pool.
    pub max_sets: u32,
    /// Descriptor budget of one sub-pool.
    pub pool_sizes: Vec<DescriptorPoolSize>,
}

impl DescriptorPoolConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of sets per sub-pool.
    pub fn with_max_sets(mut self, max_sets: u32) -> Self {
        self.max_sets = max_sets;
        self
    }

    /// Set the budget for one descriptor type, replacing any previous entry.
    pub fn with_pool_size(mut self, ty: DescriptorType, count: u32) -> Self {
        match self.pool_sizes.iter_mut().find(|size| size.ty == ty) {
            Some(size) => size.count = count,
            None => self.pool_sizes.push(DescriptorPoolSize::new(ty, count)),
        }
        self
    }

    /// Replace the whole descriptor budget.
    pub fn with_pool_sizes(mut self, pool_sizes: Vec<DescriptorPoolSize>) -> Self {
        self.pool_sizes = pool_sizes;
        self
    }

    /// Check the configuration can back at least one set.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        if self.max_sets == 0 {
            return Err(GraphicsError::InvalidConfiguration(
                "descriptor pool max_sets must be at least 1".to_string(),
            ));
        }
        if self.pool_sizes.is_empty() {
            return Err(GraphicsError::InvalidConfiguration(
                "descriptor pool needs at least one pool size".to_string(),
            ));
        }
        if let Some(size) = self.pool_sizes.iter().find(|size| size.count == 0) {
            return Err(GraphicsError::InvalidConfiguration(format!(
                "descriptor pool size for {:?} must be non-zero",
                size.ty
            )));
        }
        Ok(())
    }
}

impl Default for DescriptorPoolConfig {
    fn default() -> Self {
        Self {
            max_sets: DEFAULT_MAX_SETS,
            pool_sizes: DescriptorType::ALL
                .iter()
                .map(|&ty| DescriptorPoolSize::new(ty, DEFAULT_DESCRIPTORS_PER_TYPE))
                .collect(),
        }
    }
}

/// A descriptor set together with the layout and sub-pool it was carved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagedDescriptorSet {
    layout: DescriptorSetLayoutHandle,
    pool: DescriptorPoolHandle,
    set: DescriptorSetHandle,
}

impl ManagedDescriptorSet {
    /// Layout the set was allocated for.
    pub fn layout(&self) -> DescriptorSetLayoutHandle {
        self.layout
    }

    /// Sub-pool the set was carved from.
    pub fn pool(&self) -> DescriptorPoolHandle {
        self.pool
    }

    /// The descriptor set.
    pub fn set(&self) -> DescriptorSetHandle {
        self.set
    }
}

#[derive(Debug, Default)]
struct SubPools {
    pools: Vec<DescriptorPoolHandle>,
    /// Sets carved from the last sub-pool in `pools`.
    last_allocated: u32,
}

/// Pool strategy owning the descriptor sub-pools.
///
/// Individual sets are never destroyed on their own: they go away with the
/// sub-pool they were carved from, when the recycler is dropped.
#[derive(Debug)]
pub struct DescriptorRecycler {
    device: Arc<dyn GpuDevice>,
    config: DescriptorPoolConfig,
    sub_pools: Mutex<SubPools>,
}

impl DescriptorRecycler {
    fn new(device: Arc<dyn GpuDevice>, config: DescriptorPoolConfig) -> Self {
        Self {
            device,
            config,
            sub_pools: Mutex::new(SubPools::default()),
        }
    }

    /// Allocate a fresh set, growing the sub-pool list when needed.
    fn allocate(
        &self,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<ManagedDescriptorSet, GraphicsError> {
        let mut sub_pools = self.sub_pools.lock();

        let pool = match sub_pools.pools.last() {
            Some(&pool) if sub_pools.last_allocated < self.config.max_sets => pool,
            _ => {
                let pool = self
                    .device
                    .create_descriptor_pool(self.config.max_sets, &self.config.pool_sizes)
                    .map_err(|e| creation_failed(format!("failed to create sub-pool: {e}")))?;
                sub_pools.pools.push(pool);
                sub_pools.last_allocated = 0;
                log::debug!(
                    "DescriptorSetPool: created sub-pool #{} ({:?}, max_sets: {})",
                    sub_pools.pools.len(),
                    pool,
                    self.config.max_sets
                );
                pool
            }
        };

        let set = self
            .device
            .allocate_descriptor_set(pool, layout)
            .map_err(|e| {
                creation_failed(format!(
                    "failed to allocate descriptor set for {layout:?} from {pool:?}: {e}"
                ))
            })?;
        sub_pools.last_allocated += 1;

        Ok(ManagedDescriptorSet { layout, pool, set })
    }

    /// Free `stale` and allocate a set for `layout` in the same sub-pool.
    fn reallocate(
        &self,
        stale: ManagedDescriptorSet,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<ManagedDescriptorSet, GraphicsError> {
        self.device
            .free_descriptor_set(stale.pool, stale.set)
            .map_err(|e| creation_failed(format!("failed to free {:?}: {e}", stale.set)))?;

        let set = self
            .device
            .allocate_descriptor_set(stale.pool, layout)
            .map_err(|e| {
                creation_failed(format!(
                    "failed to reallocate descriptor set for {layout:?} from {:?}: {e}",
                    stale.pool
                ))
            })?;

        log::trace!(
            "DescriptorSetPool: evicted {:?} ({:?}) for {:?}",
            stale.set,
            stale.layout,
            layout
        );
        Ok(ManagedDescriptorSet {
            layout,
            pool: stale.pool,
            set,
        })
    }
}

fn creation_failed(message: String) -> GraphicsError {
    log::error!("DescriptorSetPool: {message}");
    GraphicsError::ResourceCreationFailed(message)
}

impl Recycler for DescriptorRecycler {
    type Object = ManagedDescriptorSet;

    fn destroy(&self, _set: ManagedDescriptorSet) {}
}

impl Drop for DescriptorRecycler {
    fn drop(&mut self) {
        let sub_pools = self.sub_pools.get_mut();
        for pool in sub_pools.pools.drain(..) {
            self.device.destroy_descriptor_pool(pool);
        }
    }
}

/// A descriptor set checked out of a [`DescriptorSetPool`].
pub type PooledDescriptorSet = Pooled<DescriptorRecycler>;

/// A descriptor set shared between a frame's resource container and the
/// subsystem that filled it. It returns to the pool when the last holder
/// lets go.
pub type SharedDescriptorSet = Arc<PooledDescriptorSet>;

/// Pool of descriptor sets for any layout.
#[derive(Debug, Clone)]
pub struct DescriptorSetPool {
    pool: ObjectPool<DescriptorRecycler>,
}

impl DescriptorSetPool {
    /// Create an empty pool. No sub-pool is created until the first acquire.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        config: DescriptorPoolConfig,
    ) -> Result<Self, GraphicsError> {
        config.validate()?;
        Ok(Self {
            pool: ObjectPool::new(DescriptorRecycler::new(device, config)),
        })
    }

    /// Check out a descriptor set for `layout`.
    pub fn acquire(
        &self,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<PooledDescriptorSet, GraphicsError> {
        if let Some(set) = self.pool.try_acquire_where(|set| set.layout == layout) {
            return Ok(set);
        }

        if let Some(result) = self
            .pool
            .recycle_oldest(|recycler, stale| recycler.reallocate(stale, layout))
        {
            return result;
        }

        let set = self.pool.recycler().allocate(layout)?;
        Ok(self.pool.adopt(set))
    }

    /// Check out a descriptor set for `layout` with shared ownership.
    pub fn acquire_shared(
        &self,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<SharedDescriptorSet, GraphicsError> {
        self.acquire(layout).map(Arc::new)
    }

    /// Get the sub-pool configuration.
    pub fn config(&self) -> &DescriptorPoolConfig {
        &self.pool.recycler().config
    }

    /// Number of sub-pools created so far.
    pub fn sub_pool_count(&self) -> usize {
        self.pool.recycler().sub_pools.lock().pools.len()
    }

    /// Number of sets carved from the active sub-pool.
    pub fn active_sub_pool_allocations(&self) -> u32 {
        self.pool.recycler().sub_pools.lock().last_allocated
    }

    /// Number of sets currently checked out.
    pub fn acquired(&self) -> usize {
        self.pool.acquired()
    }

    /// Number of released sets waiting for reuse.
    pub fn pooled(&self) -> usize {
        self.pool.pooled()
    }

    /// Number of live sets owned by the pool.
    pub fn created(&self) -> usize {
        self.pool.created()
    }
}
