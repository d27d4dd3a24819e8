//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations. It hands out unique
//! handles, enforces the same capacity rules a real driver would (a descriptor
//! pool cannot hold more than `max_sets` sets), and keeps a log of every
//! recorded command so tests can assert on barrier placement and ordering.
//!
//! Submitted work completes immediately by default. Call
//! [`DummyDevice::set_auto_complete`] with `false` to keep submissions pending
//! until [`DummyDevice::complete_pending`] is called, which simulates a GPU that
//! is still busy.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;

use super::{CommandRecorder, GpuDevice, PipelineBarrier, Submission};
use crate::error::GraphicsError;
use crate::types::{
    CommandBufferHandle, DescriptorPoolHandle, DescriptorPoolSize, DescriptorSetHandle,
    DescriptorSetLayoutHandle, FenceHandle, FenceStatus, ImageLayout, ImageRange,
    PipelineStages, QueryPoolHandle, SemaphoreHandle,
};

/// A command captured by the dummy backend.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    Barrier(PipelineBarrier),
    ResetQueryPool {
        pool: QueryPoolHandle,
        first: u32,
        count: u32,
    },
    WriteTimestamp {
        stage: PipelineStages,
        pool: QueryPoolHandle,
        query: u32,
    },
    ClearColor {
        range: ImageRange,
        layout: ImageLayout,
        color: [f32; 4],
    },
    ClearDepthStencil {
        range: ImageRange,
        layout: ImageLayout,
        depth: f32,
        stencil: u32,
    },
    Label(String),
}

impl RecordedCommand {
    /// Get the barrier if this command is one.
    pub fn as_barrier(&self) -> Option<&PipelineBarrier> {
        match self {
            Self::Barrier(barrier) => Some(barrier),
            _ => None,
        }
    }

    /// Get the label text if this command is a label.
    pub fn as_label(&self) -> Option<&str> {
        match self {
            Self::Label(label) => Some(label),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct DescriptorPoolState {
    max_sets: u32,
    live_sets: HashSet<DescriptorSetHandle>,
}

#[derive(Debug, Default)]
struct CommandBufferState {
    commands: Vec<RecordedCommand>,
    recording: bool,
    resets: usize,
}

#[derive(Debug)]
struct PendingSubmission {
    command_buffers: Vec<CommandBufferHandle>,
    fence: Option<FenceHandle>,
}

#[derive(Debug, Default)]
struct DummyState {
    next_handle: u64,
    descriptor_pools: HashMap<DescriptorPoolHandle, DescriptorPoolState>,
    descriptor_pools_created: usize,
    descriptor_set_allocations: usize,
    fences: HashMap<FenceHandle, bool>,
    fences_created: usize,
    semaphores: HashSet<SemaphoreHandle>,
    command_buffers: HashMap<CommandBufferHandle, CommandBufferState>,
    command_buffers_allocated: usize,
    query_pools: HashMap<QueryPoolHandle, Vec<Option<u64>>>,
    submissions: Vec<CommandBufferHandle>,
    pending: Vec<PendingSubmission>,
    clock: u64,
    manual_completion: bool,
    fail_allocations: bool,
}

impl DummyState {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn check_allocations(&self, what: &str) -> Result<(), GraphicsError> {
        if self.fail_allocations {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "DummyDevice: {what} allocation disabled"
            )));
        }
        Ok(())
    }

    fn complete(&mut self, submission: PendingSubmission) {
        for command_buffer in &submission.command_buffers {
            let Some(state) = self.command_buffers.get(command_buffer) else {
                continue;
            };
            for command in &state.commands {
                match *command {
                    RecordedCommand::ResetQueryPool { pool, first, count } => {
                        if let Some(results) = self.query_pools.get_mut(&pool) {
                            for slot in results.iter_mut().skip(first as usize).take(count as usize)
                            {
                                *slot = None;
                            }
                        }
                    }
                    RecordedCommand::WriteTimestamp { pool, query, .. } => {
                        self.clock += 1;
                        if let Some(slot) = self
                            .query_pools
                            .get_mut(&pool)
                            .and_then(|results| results.get_mut(query as usize))
                        {
                            *slot = Some(self.clock);
                        }
                    }
                    _ => {}
                }
            }
        }

        if let Some(fence) = submission.fence
            && let Some(signaled) = self.fences.get_mut(&fence)
        {
            *signaled = true;
        }
    }
}

/// Dummy GPU device.
#[derive(Debug, Default)]
pub struct DummyDevice {
    state: Mutex<DummyState>,
}

impl DummyDevice {
    /// Create a new dummy device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Choose whether submissions complete immediately (the default).
    pub fn set_auto_complete(&self, enabled: bool) {
        self.state.lock().manual_completion = !enabled;
    }

    /// Complete every pending submission: write timestamps, signal fences.
    pub fn complete_pending(&self) {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending);
        for submission in pending {
            state.complete(submission);
        }
    }

    /// Make every subsequent allocation fail.
    pub fn set_fail_allocations(&self, fail: bool) {
        self.state.lock().fail_allocations = fail;
    }

    /// Signal a fence from the host.
    pub fn signal_fence(&self, fence: FenceHandle) {
        if let Some(signaled) = self.state.lock().fences.get_mut(&fence) {
            *signaled = true;
        }
    }

    /// Total descriptor pools ever created.
    pub fn descriptor_pools_created(&self) -> usize {
        self.state.lock().descriptor_pools_created
    }

    /// Descriptor pools currently alive.
    pub fn live_descriptor_pools(&self) -> usize {
        self.state.lock().descriptor_pools.len()
    }

    /// Descriptor sets currently allocated from `pool`.
    pub fn live_descriptor_sets(&self, pool: DescriptorPoolHandle) -> usize {
        self.state
            .lock()
            .descriptor_pools
            .get(&pool)
            .map_or(0, |p| p.live_sets.len())
    }

    /// Total descriptor set allocations.
    pub fn descriptor_set_allocations(&self) -> usize {
        self.state.lock().descriptor_set_allocations
    }

    /// Total fences ever created.
    pub fn fences_created(&self) -> usize {
        self.state.lock().fences_created
    }

    /// Fences currently alive.
    pub fn live_fences(&self) -> usize {
        self.state.lock().fences.len()
    }

    /// Semaphores currently alive.
    pub fn live_semaphores(&self) -> usize {
        self.state.lock().semaphores.len()
    }

    /// Total command buffers ever allocated.
    pub fn command_buffers_allocated(&self) -> usize {
        self.state.lock().command_buffers_allocated
    }

    /// Command buffers currently alive.
    pub fn live_command_buffers(&self) -> usize {
        self.state.lock().command_buffers.len()
    }

    /// How many times `command_buffer` was reset.
    pub fn command_buffer_resets(&self, command_buffer: CommandBufferHandle) -> usize {
        self.state
            .lock()
            .command_buffers
            .get(&command_buffer)
            .map_or(0, |cb| cb.resets)
    }

    /// Commands recorded into `command_buffer` since it last began recording.
    pub fn commands(&self, command_buffer: CommandBufferHandle) -> Vec<RecordedCommand> {
        self.state
            .lock()
            .command_buffers
            .get(&command_buffer)
            .map(|cb| cb.commands.clone())
            .unwrap_or_default()
    }

    /// Every submitted command buffer, in submission order.
    pub fn submissions(&self) -> Vec<CommandBufferHandle> {
        self.state.lock().submissions.clone()
    }

    /// Query pools currently alive.
    pub fn live_query_pools(&self) -> usize {
        self.state.lock().query_pools.len()
    }

    fn record(&self, command_buffer: CommandBufferHandle, command: RecordedCommand) {
        let mut state = self.state.lock();
        match state.command_buffers.get_mut(&command_buffer) {
            Some(cb) if cb.recording => cb.commands.push(command),
            _ => log::warn!(
                "DummyDevice: command recorded into {:?} outside of recording",
                command_buffer
            ),
        }
    }
}

impl GpuDevice for DummyDevice {
    fn name(&self) -> &'static str {
        "Dummy Device"
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[DescriptorPoolSize],
    ) -> Result<DescriptorPoolHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.check_allocations("descriptor pool")?;
        if max_sets == 0 || pool_sizes.is_empty() {
            return Err(GraphicsError::InvalidParameter(
                "descriptor pool needs at least one set and one pool size".to_string(),
            ));
        }

        let pool = DescriptorPoolHandle::from_raw(state.next_handle());
        state.descriptor_pools.insert(
            pool,
            DescriptorPoolState {
                max_sets,
                live_sets: HashSet::new(),
            },
        );
        state.descriptor_pools_created += 1;
        log::trace!("DummyDevice: created descriptor pool {pool:?} (max_sets: {max_sets})");
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        self.state.lock().descriptor_pools.remove(&pool);
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.check_allocations("descriptor set")?;
        let set = DescriptorSetHandle::from_raw(state.next_handle());

        let Some(pool_state) = state.descriptor_pools.get_mut(&pool) else {
            return Err(GraphicsError::InvalidParameter(format!(
                "unknown descriptor pool {pool:?}"
            )));
        };
        if pool_state.live_sets.len() >= pool_state.max_sets as usize {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "descriptor pool {pool:?} is out of memory allocating layout {layout:?}"
            )));
        }
        pool_state.live_sets.insert(set);
        state.descriptor_set_allocations += 1;
        Ok(set)
    }

    fn free_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        set: DescriptorSetHandle,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        let removed = state
            .descriptor_pools
            .get_mut(&pool)
            .is_some_and(|p| p.live_sets.remove(&set));
        if !removed {
            return Err(GraphicsError::InvalidParameter(format!(
                "descriptor set {set:?} does not belong to pool {pool:?}"
            )));
        }
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.check_allocations("fence")?;
        let fence = FenceHandle::from_raw(state.next_handle());
        state.fences.insert(fence, signaled);
        state.fences_created += 1;
        Ok(fence)
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GraphicsError> {
        match self.state.lock().fences.get_mut(&fence) {
            Some(signaled) => {
                *signaled = false;
                Ok(())
            }
            None => Err(GraphicsError::InvalidParameter(format!(
                "unknown fence {fence:?}"
            ))),
        }
    }

    fn fence_status(&self, fence: FenceHandle) -> Result<FenceStatus, GraphicsError> {
        match self.state.lock().fences.get(&fence) {
            Some(true) => Ok(FenceStatus::Signaled),
            Some(false) => Ok(FenceStatus::Unsignaled),
            None => Err(GraphicsError::InvalidParameter(format!(
                "unknown fence {fence:?}"
            ))),
        }
    }

    fn wait_fence(&self, fence: FenceHandle, _timeout: Duration) -> Result<bool, GraphicsError> {
        // Nothing runs in the background, so an unsignaled fence can only be
        // signaled by this thread later: report the timeout right away.
        Ok(self.fence_status(fence)? == FenceStatus::Signaled)
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        self.state.lock().fences.remove(&fence);
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.check_allocations("semaphore")?;
        let semaphore = SemaphoreHandle::from_raw(state.next_handle());
        state.semaphores.insert(semaphore);
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.state.lock().semaphores.remove(&semaphore);
    }

    fn allocate_command_buffer(&self) -> Result<CommandBufferHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.check_allocations("command buffer")?;
        let command_buffer = CommandBufferHandle::from_raw(state.next_handle());
        state
            .command_buffers
            .insert(command_buffer, CommandBufferState::default());
        state.command_buffers_allocated += 1;
        Ok(command_buffer)
    }

    fn reset_command_buffer(
        &self,
        command_buffer: CommandBufferHandle,
    ) -> Result<(), GraphicsError> {
        match self.state.lock().command_buffers.get_mut(&command_buffer) {
            Some(cb) => {
                cb.commands.clear();
                cb.recording = false;
                cb.resets += 1;
                Ok(())
            }
            None => Err(GraphicsError::InvalidParameter(format!(
                "unknown command buffer {command_buffer:?}"
            ))),
        }
    }

    fn free_command_buffer(&self, command_buffer: CommandBufferHandle) {
        self.state.lock().command_buffers.remove(&command_buffer);
    }

    fn begin_commands(
        &self,
        command_buffer: CommandBufferHandle,
    ) -> Result<Box<dyn CommandRecorder + '_>, GraphicsError> {
        {
            let mut state = self.state.lock();
            let Some(cb) = state.command_buffers.get_mut(&command_buffer) else {
                return Err(GraphicsError::InvalidParameter(format!(
                    "unknown command buffer {command_buffer:?}"
                )));
            };
            cb.commands.clear();
            cb.recording = true;
        }

        Ok(Box::new(DummyRecorder {
            device: self,
            command_buffer,
        }))
    }

    fn end_commands(&self, command_buffer: CommandBufferHandle) -> Result<(), GraphicsError> {
        match self.state.lock().command_buffers.get_mut(&command_buffer) {
            Some(cb) if cb.recording => {
                cb.recording = false;
                Ok(())
            }
            _ => Err(GraphicsError::InvalidParameter(format!(
                "command buffer {command_buffer:?} is not recording"
            ))),
        }
    }

    fn submit(&self, submission: &Submission<'_>) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        for command_buffer in submission.command_buffers {
            match state.command_buffers.get(command_buffer) {
                Some(cb) if !cb.recording => {}
                _ => {
                    return Err(GraphicsError::InvalidParameter(format!(
                        "command buffer {command_buffer:?} is not ready for submission"
                    )));
                }
            }
        }

        state
            .submissions
            .extend_from_slice(submission.command_buffers);
        let pending = PendingSubmission {
            command_buffers: submission.command_buffers.to_vec(),
            fence: submission.fence,
        };
        if state.manual_completion {
            state.pending.push(pending);
        } else {
            state.complete(pending);
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        self.complete_pending();
        Ok(())
    }

    fn create_timestamp_query_pool(&self, count: u32) -> Result<QueryPoolHandle, GraphicsError> {
        let mut state = self.state.lock();
        state.check_allocations("query pool")?;
        let pool = QueryPoolHandle::from_raw(state.next_handle());
        state.query_pools.insert(pool, vec![None; count as usize]);
        Ok(pool)
    }

    fn destroy_query_pool(&self, pool: QueryPoolHandle) {
        self.state.lock().query_pools.remove(&pool);
    }

    fn timestamp_results(
        &self,
        pool: QueryPoolHandle,
        first: u32,
        count: u32,
    ) -> Result<Option<Vec<u64>>, GraphicsError> {
        let state = self.state.lock();
        let Some(results) = state.query_pools.get(&pool) else {
            return Err(GraphicsError::InvalidParameter(format!(
                "unknown query pool {pool:?}"
            )));
        };

        let end = first as usize + count as usize;
        if end > results.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "query range {first}..{end} out of bounds"
            )));
        }
        Ok(results[first as usize..end].iter().copied().collect())
    }
}

struct DummyRecorder<'a> {
    device: &'a DummyDevice,
    command_buffer: CommandBufferHandle,
}

impl CommandRecorder for DummyRecorder<'_> {
    fn command_buffer(&self) -> CommandBufferHandle {
        self.command_buffer
    }

    fn pipeline_barrier(&mut self, barrier: &PipelineBarrier) {
        self.device
            .record(self.command_buffer, RecordedCommand::Barrier(barrier.clone()));
    }

    fn reset_query_pool(&mut self, pool: QueryPoolHandle, first: u32, count: u32) {
        self.device.record(
            self.command_buffer,
            RecordedCommand::ResetQueryPool { pool, first, count },
        );
    }

    fn write_timestamp(&mut self, stage: PipelineStages, pool: QueryPoolHandle, query: u32) {
        self.device.record(
            self.command_buffer,
            RecordedCommand::WriteTimestamp { stage, pool, query },
        );
    }

    fn clear_color_image(&mut self, range: &ImageRange, layout: ImageLayout, color: [f32; 4]) {
        self.device.record(
            self.command_buffer,
            RecordedCommand::ClearColor {
                range: *range,
                layout,
                color,
            },
        );
    }

    fn clear_depth_stencil_image(
        &mut self,
        range: &ImageRange,
        layout: ImageLayout,
        depth: f32,
        stencil: u32,
    ) {
        self.device.record(
            self.command_buffer,
            RecordedCommand::ClearDepthStencil {
                range: *range,
                layout,
                depth,
                stencil,
            },
        );
    }

    fn insert_label(&mut self, label: &str) {
        self.device
            .record(self.command_buffer, RecordedCommand::Label(label.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DescriptorType, ImageHandle};

    fn sizes() -> Vec<DescriptorPoolSize> {
        vec![DescriptorPoolSize::new(DescriptorType::UniformBuffer, 4)]
    }

    #[test]
    fn test_descriptor_pool_capacity() {
        let device = DummyDevice::new();
        let pool = device.create_descriptor_pool(2, &sizes()).unwrap();
        let layout = DescriptorSetLayoutHandle::from_raw(1);

        let a = device.allocate_descriptor_set(pool, layout).unwrap();
        device.allocate_descriptor_set(pool, layout).unwrap();
        assert!(device.allocate_descriptor_set(pool, layout).is_err());

        device.free_descriptor_set(pool, a).unwrap();
        assert!(device.allocate_descriptor_set(pool, layout).is_ok());
        assert_eq!(device.live_descriptor_sets(pool), 2);
    }

    #[test]
    fn test_fence_lifecycle() {
        let device = DummyDevice::new();
        let fence = device.create_fence(false).unwrap();
        assert_eq!(device.fence_status(fence).unwrap(), FenceStatus::Unsignaled);
        assert!(!device.wait_fence(fence, Duration::from_millis(1)).unwrap());

        device.signal_fence(fence);
        assert!(device.wait_fence(fence, Duration::from_millis(1)).unwrap());

        device.reset_fence(fence).unwrap();
        assert_eq!(device.fence_status(fence).unwrap(), FenceStatus::Unsignaled);

        device.destroy_fence(fence);
        assert!(device.fence_status(fence).is_err());
    }

    #[test]
    fn test_recording_and_submission() {
        let device = DummyDevice::new();
        let cb = device.allocate_command_buffer().unwrap();
        let fence = device.create_fence(false).unwrap();
        let image = ImageRange::color(ImageHandle::from_raw(5));

        {
            let mut recorder = device.begin_commands(cb).unwrap();
            recorder.insert_label("hello");
            recorder.clear_color_image(&image, ImageLayout::TransferDst, [0.0; 4]);
        }
        device.end_commands(cb).unwrap();
        device
            .submit(&Submission {
                command_buffers: &[cb],
                fence: Some(fence),
                ..Default::default()
            })
            .unwrap();

        let commands = device.commands(cb);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].as_label(), Some("hello"));
        assert_eq!(device.submissions(), vec![cb]);
        assert_eq!(device.fence_status(fence).unwrap(), FenceStatus::Signaled);
    }

    #[test]
    fn test_submit_while_recording_fails() {
        let device = DummyDevice::new();
        let cb = device.allocate_command_buffer().unwrap();
        let _recorder = device.begin_commands(cb).unwrap();
        let result = device.submit(&Submission {
            command_buffers: &[cb],
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_manual_completion_delays_timestamps() {
        let device = DummyDevice::new();
        device.set_auto_complete(false);
        let pool = device.create_timestamp_query_pool(2).unwrap();
        let cb = device.allocate_command_buffer().unwrap();
        let fence = device.create_fence(false).unwrap();

        {
            let mut recorder = device.begin_commands(cb).unwrap();
            recorder.reset_query_pool(pool, 0, 2);
            recorder.write_timestamp(PipelineStages::TOP_OF_PIPE, pool, 0);
            recorder.write_timestamp(PipelineStages::BOTTOM_OF_PIPE, pool, 1);
        }
        device.end_commands(cb).unwrap();
        device
            .submit(&Submission {
                command_buffers: &[cb],
                fence: Some(fence),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(device.timestamp_results(pool, 0, 2).unwrap(), None);
        assert_eq!(device.fence_status(fence).unwrap(), FenceStatus::Unsignaled);

        device.complete_pending();
        let results = device.timestamp_results(pool, 0, 2).unwrap().unwrap();
        assert!(results[1] > results[0]);
        assert_eq!(device.fence_status(fence).unwrap(), FenceStatus::Signaled);
    }

    #[test]
    fn test_fail_allocations() {
        let device = DummyDevice::new();
        device.set_fail_allocations(true);
        assert!(matches!(
            device.create_fence(false),
            Err(GraphicsError::ResourceCreationFailed(_))
        ));
    }
}
