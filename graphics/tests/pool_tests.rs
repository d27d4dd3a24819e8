//! Pool and frame scheduler integration tests.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use rstest::rstest;

use common::dummy_device;
use vesta_core::pool::ObjectPool;
use vesta_graphics::backend::dummy::DummyDevice;
use vesta_graphics::pools::{FenceStrategy, PooledFence};
use vesta_graphics::types::{
    AccessFlags, BufferHandle, BufferRange, DescriptorSetLayoutHandle, FenceHandle, FenceStatus,
};
use vesta_graphics::{
    DescriptorPoolConfig, DescriptorSetPool, FencePool, FrameConfig, FrameScheduler, GpuDevice,
    Graph,
};

const LAYOUT_A: DescriptorSetLayoutHandle = DescriptorSetLayoutHandle::from_raw(10);
const LAYOUT_B: DescriptorSetLayoutHandle = DescriptorSetLayoutHandle::from_raw(20);
const LAYOUT_C: DescriptorSetLayoutHandle = DescriptorSetLayoutHandle::from_raw(30);

fn descriptor_pool(max_sets: u32) -> (Arc<DummyDevice>, DescriptorSetPool) {
    let device = dummy_device();
    let pool = DescriptorSetPool::new(
        device.clone(),
        DescriptorPoolConfig::new().with_max_sets(max_sets),
    )
    .unwrap();
    (device, pool)
}

// ---------------------------------------------------------------------------
// Object pool accounting
// ---------------------------------------------------------------------------

#[rstest]
#[case::seed_1(1)]
#[case::seed_7(7)]
#[case::seed_1234(1234)]
fn test_fence_pool_counts_balance(#[case] seed: u64) {
    let device = dummy_device();
    let pool: FencePool = ObjectPool::new(FenceStrategy::new(device.clone()));
    let mut held: Vec<PooledFence> = Vec::new();
    let mut state = seed;

    for _ in 0..200 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        match (state >> 33) % 4 {
            0 | 1 => held.push(pool.acquire().unwrap()),
            2 if !held.is_empty() => {
                let index = (state >> 40) as usize % held.len();
                drop(held.swap_remove(index));
            }
            3 => {
                if let Some(fence) = pool.try_acquire() {
                    held.push(fence);
                }
            }
            _ => {}
        }
        assert_eq!(pool.created(), pool.acquired() + pool.pooled());
        assert_eq!(pool.acquired(), held.len());
    }

    drop(held);
    assert_eq!(pool.acquired(), 0);
    assert_eq!(pool.created(), pool.pooled());
    assert_eq!(device.live_fences(), pool.created());
}

#[test]
fn test_released_fences_return_to_one_pool() {
    let device = dummy_device();
    let first: FencePool = ObjectPool::new(FenceStrategy::new(device.clone()));
    let second: FencePool = ObjectPool::new(FenceStrategy::new(device.clone()));

    let from_first: Vec<FenceHandle> = {
        let fences: Vec<_> = (0..4).map(|_| first.acquire().unwrap()).collect();
        fences.iter().map(|f| **f).collect()
    };
    let from_second: Vec<FenceHandle> = {
        let fences: Vec<_> = (0..3).map(|_| second.acquire().unwrap()).collect();
        fences.iter().map(|f| **f).collect()
    };
    assert_eq!(first.pooled(), 4);
    assert_eq!(second.pooled(), 3);

    let reused_first: HashSet<FenceHandle> = std::iter::from_fn(|| first.try_acquire())
        .take(10)
        .map(|f| {
            let handle = *f;
            f.discard();
            handle
        })
        .collect();
    let reused_second: HashSet<FenceHandle> = std::iter::from_fn(|| second.try_acquire())
        .take(10)
        .map(|f| {
            let handle = *f;
            f.discard();
            handle
        })
        .collect();

    assert_eq!(reused_first, from_first.into_iter().collect());
    assert_eq!(reused_second, from_second.into_iter().collect());
    assert!(reused_first.is_disjoint(&reused_second));
    assert_eq!(device.live_fences(), 0);
}

#[test]
fn test_reused_fence_is_unsignaled() {
    let device = dummy_device();
    let pool: FencePool = ObjectPool::new(FenceStrategy::new(device.clone()));

    let handle = {
        let fence = pool.acquire().unwrap();
        device.signal_fence(*fence);
        *fence
    };

    let fence = pool.acquire().unwrap();
    assert_eq!(*fence, handle);
    assert_eq!(device.fence_status(*fence).unwrap(), FenceStatus::Unsignaled);
}

// ---------------------------------------------------------------------------
// Descriptor sets
// ---------------------------------------------------------------------------

#[test]
fn test_same_layout_reuse_creates_no_sub_pool() {
    let (device, pool) = descriptor_pool(4);

    let first = pool.acquire(LAYOUT_A).unwrap();
    let set = first.set();
    drop(first);

    let sub_pools = pool.sub_pool_count();
    let allocations = device.descriptor_set_allocations();

    let second = pool.acquire(LAYOUT_A).unwrap();
    assert_eq!(second.set(), set);
    assert_eq!(pool.sub_pool_count(), sub_pools);
    assert_eq!(device.descriptor_pools_created(), sub_pools);
    assert_eq!(device.descriptor_set_allocations(), allocations);
}

#[test]
fn test_other_layout_evicts_oldest_free_set() {
    let (device, pool) = descriptor_pool(4);

    let a = pool.acquire(LAYOUT_A).unwrap();
    let b = pool.acquire(LAYOUT_B).unwrap();
    let a_set = a.set();
    let sub_pool = a.pool();
    drop(a);
    drop(b);
    assert_eq!(pool.pooled(), 2);

    let c = pool.acquire(LAYOUT_C).unwrap();
    assert_eq!(c.layout(), LAYOUT_C);
    assert_eq!(c.pool(), sub_pool);
    assert_ne!(c.set(), a_set);
    assert_eq!(pool.pooled(), 1);
    assert_eq!(pool.sub_pool_count(), 1);
    assert_eq!(device.live_descriptor_sets(sub_pool), 2);

    // The layout B set is still free and reused as is.
    let allocations = device.descriptor_set_allocations();
    let b = pool.acquire(LAYOUT_B).unwrap();
    assert_eq!(b.layout(), LAYOUT_B);
    assert_eq!(device.descriptor_set_allocations(), allocations);
}

#[rstest]
#[case::one_per_pool(1, 5)]
#[case::three_per_pool(3, 10)]
#[case::exact_fit(4, 8)]
#[case::defaults(32, 33)]
fn test_sub_pool_never_exceeds_max_sets(#[case] max_sets: u32, #[case] count: usize) {
    let (device, pool) = descriptor_pool(max_sets);
    let layouts = [LAYOUT_A, LAYOUT_B, LAYOUT_C];

    let held: Vec<_> = (0..count)
        .map(|i| pool.acquire(layouts[i % layouts.len()]).unwrap())
        .collect();

    let sub_pools: HashSet<_> = held.iter().map(|set| set.pool()).collect();
    for &sub_pool in &sub_pools {
        assert!(device.live_descriptor_sets(sub_pool) <= max_sets as usize);
    }
    assert_eq!(pool.sub_pool_count(), count.div_ceil(max_sets as usize));
    assert_eq!(sub_pools.len(), pool.sub_pool_count());
    assert!(pool.active_sub_pool_allocations() <= max_sets);
}

#[test]
fn test_shared_set_returns_with_last_holder() {
    let (_device, pool) = descriptor_pool(4);

    let shared = pool.acquire_shared(LAYOUT_A).unwrap();
    let other = Arc::clone(&shared);
    drop(shared);
    assert_eq!(pool.acquired(), 1);

    drop(other);
    assert_eq!(pool.acquired(), 0);
    assert_eq!(pool.pooled(), 1);
}

#[test]
fn test_allocation_failure_is_reported() {
    let (device, pool) = descriptor_pool(4);
    device.set_fail_allocations(true);

    assert!(pool.acquire(LAYOUT_A).is_err());
    assert_eq!(pool.created(), 0);
}

// ---------------------------------------------------------------------------
// Frame scheduler
// ---------------------------------------------------------------------------

#[test]
fn test_frame_keeps_descriptor_sets_until_fence() {
    let device = dummy_device();
    device.set_auto_complete(false);
    let mut scheduler = FrameScheduler::new(
        device.clone(),
        FrameConfig::new().with_frames_in_flight(2),
    )
    .unwrap();
    let sets = scheduler.descriptor_sets().clone();

    scheduler.begin_frame().unwrap();
    {
        let mut frame = scheduler.frame();
        let set = sets.acquire_shared(LAYOUT_A).unwrap();
        let node = frame.allocator.allocate("dispatch");
        let captured = Arc::clone(&set);
        frame
            .allocator
            .node_mut(node)
            .add_buffer(
                BufferRange::whole(BufferHandle::from_raw(1)),
                AccessFlags::SHADER_WRITE,
            )
            .set_callback(move |_, _, resources| resources.add_resource(captured));
        drop(set);
        let graph = node.into();
        scheduler.end_frame(&graph).unwrap();
    }
    assert_eq!(sets.acquired(), 1);

    // Slot 1 does not touch slot 0's resources.
    scheduler.begin_frame().unwrap();
    scheduler.end_frame(&Graph::empty()).unwrap();
    assert_eq!(sets.acquired(), 1);
    assert!(!scheduler.is_slot_ready(0));

    device.complete_pending();
    assert!(scheduler.is_slot_ready(0));
    scheduler.begin_frame().unwrap();
    assert_eq!(sets.acquired(), 0);
    assert_eq!(sets.pooled(), 1);
}

#[test]
fn test_steady_state_frames_allocate_nothing_new() {
    let device = dummy_device();
    let mut scheduler = FrameScheduler::new(device.clone(), FrameConfig::new()).unwrap();
    let sets = scheduler.descriptor_sets().clone();

    for _ in 0..8 {
        scheduler.begin_frame().unwrap();
        let set = sets.acquire_shared(LAYOUT_B).unwrap();
        scheduler.resources().add_resource(set);
        let node = scheduler.allocator().allocate("frame");
        scheduler.end_frame(&node.into()).unwrap();
    }

    assert_eq!(device.descriptor_pools_created(), 1);
    assert!(sets.created() <= scheduler.frames_in_flight());
    assert!(device.fences_created() <= scheduler.frames_in_flight());
    assert!(device.command_buffers_allocated() <= scheduler.frames_in_flight());
    assert_eq!(device.submissions().len(), 8);
}
