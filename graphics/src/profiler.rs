//! GPU timing of render graphs with timestamp queries.
//!
//! [`GpuProfiler::profile`] brackets a graph between two marker nodes that
//! write timestamps. Each slot owns a pair of queries, so up to `slots`
//! measurements can be in flight at once:
//!
//! ```text
//! profiler_start ──► [graph starting nodes] ... [graph ending nodes] ──► profiler_end
//!   reset 2q, ts[2s]                                                       ts[2s+1]
//! ```
//!
//! Results are read back once the frame's fence has signaled; until then
//! [`GpuProfiler::read_timestamps`] returns `Ok(None)`.

use std::sync::Arc;

use crate::backend::GpuDevice;
use crate::error::GraphicsError;
use crate::graph::{Graph, RenderGraphAllocator};
use crate::types::{PipelineStages, QueryPoolHandle};

/// Timestamp query pool with a start/end pair per slot.
#[derive(Debug)]
pub struct GpuProfiler {
    device: Arc<dyn GpuDevice>,
    query_pool: QueryPoolHandle,
    slots: u32,
}

impl GpuProfiler {
    /// Create a profiler with `slots` independent measurements.
    pub fn new(device: Arc<dyn GpuDevice>, slots: u32) -> Result<Self, GraphicsError> {
        if slots == 0 {
            return Err(GraphicsError::InvalidConfiguration(
                "profiler needs at least one slot".to_string(),
            ));
        }

        let query_pool = device.create_timestamp_query_pool(slots * 2)?;
        log::debug!("GpuProfiler: created {query_pool:?} with {slots} slots");

        Ok(Self {
            device,
            query_pool,
            slots,
        })
    }

    pub fn slots(&self) -> u32 {
        self.slots
    }

    pub fn query_pool(&self) -> QueryPoolHandle {
        self.query_pool
    }

    /// Wrap `graph` between timestamp nodes writing into `slot`.
    ///
    /// Returns the wrapped graph, rooted at the start node.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    pub fn profile(
        &self,
        allocator: &mut RenderGraphAllocator,
        graph: &Graph,
        slot: u32,
    ) -> Graph {
        assert!(slot < self.slots, "Invalid profiler slot");

        let query_pool = self.query_pool;
        let first = slot * 2;

        let start = allocator.allocate("profiler_start");
        allocator.node_mut(start).set_callback(move |_, recorder, _| {
            recorder.reset_query_pool(query_pool, first, 2);
            recorder.write_timestamp(PipelineStages::TOP_OF_PIPE, query_pool, first);
        });

        let end = allocator.allocate("profiler_end");
        allocator.node_mut(end).set_callback(move |_, recorder, _| {
            recorder.write_timestamp(PipelineStages::BOTTOM_OF_PIPE, query_pool, first + 1);
        });

        for node in allocator.starting_nodes(graph) {
            allocator.add_next(start, node);
        }
        for node in allocator.ending_nodes(graph) {
            allocator.add_next(node, end);
        }
        if graph.is_empty() {
            allocator.add_next(start, end);
        }

        start.into()
    }

    /// Start and end timestamps of `slot`, or `None` if not available yet.
    pub fn read_timestamps(&self, slot: u32) -> Result<Option<(u64, u64)>, GraphicsError> {
        if slot >= self.slots {
            return Err(GraphicsError::InvalidParameter(format!(
                "profiler slot {slot} out of range (slots: {})",
                self.slots
            )));
        }

        let results = self
            .device
            .timestamp_results(self.query_pool, slot * 2, 2)?;
        Ok(results.and_then(|ts| match ts[..] {
            [start, end] => Some((start, end)),
            _ => None,
        }))
    }

    /// Elapsed time of `slot` in nanoseconds, given the device timestamp
    /// period in nanoseconds per tick.
    pub fn read_elapsed_ns(&self, slot: u32, period_ns: f64) -> Result<Option<f64>, GraphicsError> {
        Ok(self
            .read_timestamps(slot)?
            .map(|(start, end)| end.saturating_sub(start) as f64 * period_ns))
    }
}

impl Drop for GpuProfiler {
    fn drop(&mut self) {
        self.device.destroy_query_pool(self.query_pool);
    }
}
