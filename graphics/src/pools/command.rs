//! Command buffer pool.

use std::sync::Arc;

use vesta_core::pool::{ObjectPool, PoolStrategy, Pooled, Recycler};

use crate::backend::GpuDevice;
use crate::error::GraphicsError;
use crate::types::CommandBufferHandle;

/// Strategy for pooled primary command buffers.
///
/// A reused command buffer is reset to the initial state before it is handed
/// out, so callers can begin recording right away.
#[derive(Debug, Clone)]
pub struct CommandBufferStrategy {
    device: Arc<dyn GpuDevice>,
}

impl CommandBufferStrategy {
    pub fn new(device: Arc<dyn GpuDevice>) -> Self {
        Self { device }
    }
}

impl Recycler for CommandBufferStrategy {
    type Object = CommandBufferHandle;

    fn destroy(&self, command_buffer: CommandBufferHandle) {
        self.device.free_command_buffer(command_buffer);
    }
}

impl PoolStrategy for CommandBufferStrategy {
    type Error = GraphicsError;

    fn create(&self) -> Result<CommandBufferHandle, GraphicsError> {
        let command_buffer = self.device.allocate_command_buffer()?;
        log::debug!("CommandBufferPool: allocated {command_buffer:?}");
        Ok(command_buffer)
    }

    fn reset(&self, command_buffer: &mut CommandBufferHandle) -> Result<(), GraphicsError> {
        self.device.reset_command_buffer(*command_buffer)
    }
}

/// Pool of primary command buffers.
pub type CommandBufferPool = ObjectPool<CommandBufferStrategy>;

/// A command buffer checked out of a [`CommandBufferPool`].
pub type PooledCommandBuffer = Pooled<CommandBufferStrategy>;
