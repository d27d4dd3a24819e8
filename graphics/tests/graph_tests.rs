//! Render graph integration tests.
//!
//! Graphs are recorded into the dummy backend, which keeps every command so
//! the tests can check callback order and barrier placement.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use rstest::rstest;

use common::{dummy_device, record, trace};
use vesta_graphics::graph::NodeState;
use vesta_graphics::types::{
    AccessFlags, BufferHandle, BufferRange, ImageHandle, ImageLayout, ImageRange, PipelineStages,
};
use vesta_graphics::{
    GpuProfiler, GraphExecutor, GraphicsError, NodeHandle, RenderGraphAllocator,
    ResourceContainer,
};

/// Allocate a node whose callback inserts its own name as a label.
fn labeled(allocator: &mut RenderGraphAllocator, name: &'static str) -> NodeHandle {
    let handle = allocator.allocate(name);
    allocator
        .node_mut(handle)
        .set_callback(move |_, recorder, _| recorder.insert_label(name));
    handle
}

fn chain(allocator: &mut RenderGraphAllocator, nodes: &[NodeHandle]) {
    for pair in nodes.windows(2) {
        allocator.add_next(pair[0], pair[1]);
    }
}

// ---------------------------------------------------------------------------
// Barriers
// ---------------------------------------------------------------------------

#[rstest]
#[case::transfer_writes(AccessFlags::TRANSFER_WRITE, AccessFlags::TRANSFER_WRITE)]
#[case::shader_writes(AccessFlags::SHADER_WRITE, AccessFlags::SHADER_WRITE)]
#[case::write_then_read(AccessFlags::SHADER_WRITE, AccessFlags::SHADER_READ)]
#[case::read_then_write(AccessFlags::SHADER_READ, AccessFlags::TRANSFER_WRITE)]
fn test_hazard_emits_barrier_between_callbacks(
    #[case] first: AccessFlags,
    #[case] second: AccessFlags,
) {
    let device = dummy_device();
    let mut allocator = RenderGraphAllocator::new();
    let mut executor = GraphExecutor::new();
    let mut container = ResourceContainer::new();
    let buffer = BufferRange::whole(BufferHandle::from_raw(42));

    let a = labeled(&mut allocator, "a");
    let b = labeled(&mut allocator, "b");
    allocator
        .node_mut(a)
        .set_stages(PipelineStages::COMPUTE_SHADER, PipelineStages::COMPUTE_SHADER)
        .add_buffer(buffer, first);
    allocator
        .node_mut(b)
        .set_stages(PipelineStages::TRANSFER, PipelineStages::TRANSFER)
        .add_buffer(buffer, second);
    allocator.add_next(a, b);

    let commands = record(&device, |recorder| {
        executor
            .execute(&mut allocator, &a.into(), 0, recorder, &mut container)
            .unwrap();
    });

    let a_pos = commands.iter().position(|c| c.as_label() == Some("a")).unwrap();
    let b_pos = commands.iter().position(|c| c.as_label() == Some("b")).unwrap();
    assert!(a_pos < b_pos);

    let between: Vec<_> = commands[a_pos + 1..b_pos]
        .iter()
        .filter_map(|c| c.as_barrier())
        .collect();
    assert_eq!(between.len(), 1);
    assert!(between[0].covers_buffer(buffer.buffer));
    assert!(between[0].src_stages.contains(PipelineStages::COMPUTE_SHADER));
    assert!(between[0].dst_stages.contains(PipelineStages::TRANSFER));
}

#[test]
fn test_independent_resources_do_not_synchronize() {
    let device = dummy_device();
    let mut allocator = RenderGraphAllocator::new();
    let mut executor = GraphExecutor::new();
    let mut container = ResourceContainer::new();

    let a = labeled(&mut allocator, "a");
    let b = labeled(&mut allocator, "b");
    allocator
        .node_mut(a)
        .add_buffer(BufferRange::whole(BufferHandle::from_raw(1)), AccessFlags::SHADER_READ);
    allocator
        .node_mut(b)
        .add_buffer(BufferRange::whole(BufferHandle::from_raw(2)), AccessFlags::SHADER_READ);
    allocator.add_next(a, b);

    let commands = record(&device, |recorder| {
        executor
            .execute(&mut allocator, &a.into(), 0, recorder, &mut container)
            .unwrap();
    });

    // Entry barriers only: the reads share nothing.
    let b_pos = commands.iter().position(|c| c.as_label() == Some("b")).unwrap();
    let before_b = commands[b_pos - 1].as_barrier().unwrap();
    assert!(before_b.covers_buffer(BufferHandle::from_raw(2)));
    assert!(!before_b.covers_buffer(BufferHandle::from_raw(1)));
}

#[test]
fn test_image_layout_carries_across_frames() {
    let device = dummy_device();
    let mut allocator = RenderGraphAllocator::new();
    let mut executor = GraphExecutor::new();
    let mut container = ResourceContainer::new();
    let image = ImageRange::color(ImageHandle::from_raw(9));

    let write = allocator.allocate("write");
    allocator.node_mut(write).add_image(
        image,
        ImageLayout::TransferDst,
        AccessFlags::TRANSFER_WRITE,
    );
    record(&device, |recorder| {
        executor
            .execute(&mut allocator, &write.into(), 0, recorder, &mut container)
            .unwrap();
    });
    assert_eq!(executor.image_layout(&image), ImageLayout::TransferDst);

    allocator.reset();
    let read = allocator.allocate("read");
    allocator.node_mut(read).add_image(
        image,
        ImageLayout::ShaderReadOnly,
        AccessFlags::SHADER_READ,
    );
    let commands = record(&device, |recorder| {
        executor
            .execute(&mut allocator, &read.into(), 1, recorder, &mut container)
            .unwrap();
    });

    let barrier = commands[0].as_barrier().unwrap();
    assert_eq!(barrier.image_barriers.len(), 1);
    assert_eq!(barrier.image_barriers[0].old_layout, ImageLayout::TransferDst);
    assert_eq!(barrier.image_barriers[0].new_layout, ImageLayout::ShaderReadOnly);
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

#[rstest]
#[case::two_nodes(2)]
#[case::three_nodes(3)]
#[case::five_nodes(5)]
fn test_cycle_fails_before_any_callback(#[case] cycle_len: usize) {
    let device = dummy_device();
    let mut allocator = RenderGraphAllocator::new();
    let mut executor = GraphExecutor::new();
    let mut container = ResourceContainer::new();
    let calls = Arc::new(Mutex::new(0usize));

    let root = allocator.allocate("root");
    let nodes: Vec<_> = (0..cycle_len)
        .map(|i| {
            let handle = allocator.allocate(&format!("node_{i}"));
            let calls = Arc::clone(&calls);
            allocator
                .node_mut(handle)
                .set_callback(move |_, _, _| *calls.lock() += 1);
            handle
        })
        .collect();
    allocator.add_next(root, nodes[0]);
    chain(&mut allocator, &nodes);
    allocator.add_next(nodes[cycle_len - 1], nodes[0]);

    let commands = record(&device, |recorder| {
        let err = executor
            .execute(&mut allocator, &root.into(), 0, recorder, &mut container)
            .unwrap_err();
        assert!(matches!(err, GraphicsError::CyclicDependency { .. }));
    });

    assert!(commands.is_empty());
    assert_eq!(*calls.lock(), 0);
    assert!(
        nodes
            .iter()
            .all(|&n| allocator.node(n).state() != NodeState::Recorded)
    );
}

#[rstest]
#[case::chain_of_three(3)]
#[case::chain_of_eight(8)]
fn test_chain_starting_and_ending_nodes(#[case] len: usize) {
    let mut allocator = RenderGraphAllocator::new();
    let nodes: Vec<_> = (0..len)
        .map(|i| allocator.allocate(&format!("node_{i}")))
        .collect();
    chain(&mut allocator, &nodes);
    let graph = nodes[0].into();

    assert_eq!(allocator.starting_nodes(&graph), vec![nodes[0]]);
    assert_eq!(allocator.ending_nodes(&graph), vec![nodes[len - 1]]);

    let mut visited = Vec::new();
    allocator.iterate_starting_nodes(&graph, |n| visited.push(n));
    allocator.iterate_ending_nodes(&graph, |n| visited.push(n));
    assert_eq!(visited, vec![nodes[0], nodes[len - 1]]);
}

#[test]
fn test_reset_node_inherits_nothing() {
    let device = dummy_device();
    let mut allocator = RenderGraphAllocator::new();
    let mut executor = GraphExecutor::new();
    let mut container = ResourceContainer::new();

    let a = allocator.allocate("a");
    let b = allocator.allocate("b");
    allocator
        .node_mut(a)
        .add_buffer(BufferRange::whole(BufferHandle::from_raw(1)), AccessFlags::SHADER_WRITE)
        .add_image(
            ImageRange::color(ImageHandle::from_raw(2)),
            ImageLayout::General,
            AccessFlags::SHADER_WRITE,
        )
        .set_callback(|_, recorder, _| recorder.insert_label("stale"));
    allocator.add_next(a, b);
    let generation = allocator.generation();

    allocator.reset();
    assert!(allocator.is_empty());
    assert_ne!(allocator.generation(), generation);

    let fresh = allocator.allocate("fresh");
    let node = allocator.node(fresh);
    assert_eq!(node.name(), "fresh");
    assert_eq!(node.state(), NodeState::Allocated);
    assert!(node.buffers().is_empty());
    assert!(node.images().is_empty());
    assert!(node.next().is_empty());
    assert!(node.previous().is_empty());
    assert!(!node.has_callback());

    let commands = record(&device, |recorder| {
        executor
            .execute(&mut allocator, &fresh.into(), 0, recorder, &mut container)
            .unwrap();
    });
    assert!(commands.is_empty());
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn test_markers_bracket_compute_node() {
    let device = dummy_device();
    let mut allocator = RenderGraphAllocator::new();
    let mut executor = GraphExecutor::new();
    let mut container = ResourceContainer::new();
    let buffer = BufferRange::whole(BufferHandle::from_raw(77));
    let compute_calls = Arc::new(Mutex::new(Vec::new()));

    let start = labeled(&mut allocator, "start");
    let end = labeled(&mut allocator, "end");
    let compute = allocator.allocate("compute");
    {
        let calls = Arc::clone(&compute_calls);
        allocator
            .node_mut(compute)
            .set_stages(PipelineStages::COMPUTE_SHADER, PipelineStages::COMPUTE_SHADER)
            .add_buffer(buffer, AccessFlags::SHADER_WRITE)
            .set_callback(move |frame, recorder, _| {
                calls.lock().push(frame);
                recorder.insert_label("compute");
            });
    }
    chain(&mut allocator, &[start, compute, end]);

    let commands = record(&device, |recorder| {
        let stats = executor
            .execute(&mut allocator, &start.into(), 1, recorder, &mut container)
            .unwrap();
        assert_eq!(stats.nodes_executed, 3);
        assert_eq!(stats.barriers_emitted, 1);
    });

    assert_eq!(trace(&commands), vec!["start", "|", "compute", "end"]);
    assert!(commands[1].as_barrier().unwrap().covers_buffer(buffer.buffer));
    assert_eq!(*compute_calls.lock(), vec![1]);
}

#[test]
fn test_profiler_wraps_graph_with_timestamps() {
    let device = dummy_device();
    let profiler = GpuProfiler::new(device.clone(), 2).unwrap();
    let mut allocator = RenderGraphAllocator::new();
    let mut executor = GraphExecutor::new();
    let mut container = ResourceContainer::new();

    let compute = labeled(&mut allocator, "compute");
    allocator.node_mut(compute).add_buffer(
        BufferRange::whole(BufferHandle::from_raw(5)),
        AccessFlags::SHADER_WRITE,
    );
    let graph = profiler.profile(&mut allocator, &compute.into(), 1);

    let commands = record(&device, |recorder| {
        executor
            .execute(&mut allocator, &graph, 1, recorder, &mut container)
            .unwrap();
    });

    let trace = trace(&commands);
    let compute_pos = trace.iter().position(|c| c == "compute").unwrap();
    assert_eq!(trace[compute_pos - 1], "|");
    assert!(trace[..compute_pos].iter().any(|c| c.contains("TOP_OF_PIPE")));
    assert!(trace[compute_pos..].iter().any(|c| c.contains("BOTTOM_OF_PIPE")));
    assert!(trace.first().unwrap().starts_with("ResetQueryPool"));
    assert!(trace.last().unwrap().starts_with("WriteTimestamp"));
}
