//! Native Vulkan backend implementation using ash.
//!
//! [`VulkanDevice`] wraps a logical device created by the application and
//! implements [`GpuDevice`] on one queue. Instance and device creation,
//! surfaces and swapchains stay with the application.
//!
//! # Synchronization
//!
//! The command pool and the queue are externally synchronized objects in
//! Vulkan; both are guarded by a mutex. Command buffers allocated from the
//! pool must be recorded from one thread at a time.

pub mod conversion;
mod recorder;

use std::time::Duration;

use ash::vk;
use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::types::{
    CommandBufferHandle, DescriptorPoolHandle, DescriptorPoolSize, DescriptorSetHandle,
    DescriptorSetLayoutHandle, FenceHandle, FenceStatus, QueryPoolHandle, SemaphoreHandle,
};

use super::{CommandRecorder, GpuDevice, Submission};

use self::conversion::{
    convert_error, convert_pool_size, from_command_buffer, from_descriptor_pool,
    from_descriptor_set, from_fence, from_query_pool, from_semaphore, vk_command_buffer,
    vk_descriptor_pool, vk_descriptor_set, vk_descriptor_set_layout, vk_fence, vk_query_pool,
    vk_semaphore,
};
pub use self::recorder::VulkanRecorder;

/// [`GpuDevice`] implementation on top of an `ash` logical device.
pub struct VulkanDevice {
    /// Logical device, owned by the application.
    device: ash::Device,
    /// Queue used for every submission.
    queue: Mutex<vk::Queue>,
    /// Queue family of `queue`.
    queue_family_index: u32,
    /// Pool every command buffer is allocated from.
    command_pool: Mutex<vk::CommandPool>,
    /// Debug utils extension, for command buffer labels.
    debug_utils: Option<ash::ext::debug_utils::Device>,
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("queue_family_index", &self.queue_family_index)
            .field("debug_labels", &self.debug_utils.is_some())
            .finish()
    }
}

impl VulkanDevice {
    /// Wrap `device` and use queue `queue_index` of `queue_family_index`.
    ///
    /// # Safety
    ///
    /// `device` must stay valid until the returned value and every pool built
    /// on it are dropped, and the queue must exist.
    pub unsafe fn new(
        device: ash::Device,
        queue_family_index: u32,
        queue_index: u32,
    ) -> Result<Self, GraphicsError> {
        let queue = unsafe { device.get_device_queue(queue_family_index, queue_index) };

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(|e| convert_error("Failed to create command pool", e))?;

        log::debug!("Vulkan device wrapped (queue family {queue_family_index})");

        Ok(Self {
            device,
            queue: Mutex::new(queue),
            queue_family_index,
            command_pool: Mutex::new(command_pool),
            debug_utils: None,
        })
    }

    /// Insert debug labels through `VK_EXT_debug_utils`.
    ///
    /// The extension must be enabled on `instance`.
    pub fn with_debug_utils(mut self, instance: &ash::Instance) -> Self {
        self.debug_utils = Some(ash::ext::debug_utils::Device::new(instance, &self.device));
        self
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let queue = *self.queue.get_mut();
            if let Err(e) = self.device.queue_wait_idle(queue) {
                log::error!("Vulkan: queue_wait_idle failed during drop: {e:?}");
            }
            self.device
                .destroy_command_pool(*self.command_pool.get_mut(), None);
        }
    }
}

impl GpuDevice for VulkanDevice {
    fn name(&self) -> &'static str {
        "Vulkan"
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[DescriptorPoolSize],
    ) -> Result<DescriptorPoolHandle, GraphicsError> {
        let sizes: Vec<vk::DescriptorPoolSize> = pool_sizes.iter().map(convert_pool_size).collect();
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        let pool = unsafe { self.device.create_descriptor_pool(&info, None) }
            .map_err(|e| convert_error("Failed to create descriptor pool", e))?;
        Ok(from_descriptor_pool(pool))
    }

    fn destroy_descriptor_pool(&self, pool: DescriptorPoolHandle) {
        unsafe {
            self.device
                .destroy_descriptor_pool(vk_descriptor_pool(pool), None);
        }
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSetHandle, GraphicsError> {
        let layouts = [vk_descriptor_set_layout(layout)];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(vk_descriptor_pool(pool))
            .set_layouts(&layouts);

        let sets = unsafe { self.device.allocate_descriptor_sets(&info) }
            .map_err(|e| convert_error("Failed to allocate descriptor set", e))?;
        sets.into_iter().next().map(from_descriptor_set).ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("Descriptor set allocation returned nothing".into())
        })
    }

    fn free_descriptor_set(
        &self,
        pool: DescriptorPoolHandle,
        set: DescriptorSetHandle,
    ) -> Result<(), GraphicsError> {
        unsafe {
            self.device
                .free_descriptor_sets(vk_descriptor_pool(pool), &[vk_descriptor_set(set)])
        }
        .map_err(|e| GraphicsError::Internal(format!("Failed to free descriptor set: {e:?}")))
    }

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle, GraphicsError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { self.device.create_fence(&info, None) }
            .map_err(|e| convert_error("Failed to create fence", e))?;
        Ok(from_fence(fence))
    }

    fn reset_fence(&self, fence: FenceHandle) -> Result<(), GraphicsError> {
        unsafe { self.device.reset_fences(&[vk_fence(fence)]) }
            .map_err(|e| convert_error("Failed to reset fence", e))
    }

    fn fence_status(&self, fence: FenceHandle) -> Result<FenceStatus, GraphicsError> {
        match unsafe { self.device.get_fence_status(vk_fence(fence)) } {
            Ok(true) => Ok(FenceStatus::Signaled),
            Ok(false) => Ok(FenceStatus::Unsignaled),
            Err(e) => Err(convert_error("Failed to query fence", e)),
        }
    }

    fn wait_fence(&self, fence: FenceHandle, timeout: Duration) -> Result<bool, GraphicsError> {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        match unsafe {
            self.device
                .wait_for_fences(&[vk_fence(fence)], true, timeout_ns)
        } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(convert_error("Fence wait failed", e)),
        }
    }

    fn destroy_fence(&self, fence: FenceHandle) {
        unsafe { self.device.destroy_fence(vk_fence(fence), None) };
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle, GraphicsError> {
        let info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { self.device.create_semaphore(&info, None) }
            .map_err(|e| convert_error("Failed to create semaphore", e))?;
        Ok(from_semaphore(semaphore))
    }

    fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        unsafe { self.device.destroy_semaphore(vk_semaphore(semaphore), None) };
    }

    fn allocate_command_buffer(&self) -> Result<CommandBufferHandle, GraphicsError> {
        let command_pool = self.command_pool.lock();
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&info) }
            .map_err(|e| convert_error("Failed to allocate command buffer", e))?;
        buffers.into_iter().next().map(from_command_buffer).ok_or_else(|| {
            GraphicsError::ResourceCreationFailed("Command buffer allocation returned nothing".into())
        })
    }

    fn reset_command_buffer(
        &self,
        command_buffer: CommandBufferHandle,
    ) -> Result<(), GraphicsError> {
        let _pool = self.command_pool.lock();
        unsafe {
            self.device.reset_command_buffer(
                vk_command_buffer(command_buffer),
                vk::CommandBufferResetFlags::empty(),
            )
        }
        .map_err(|e| convert_error("Failed to reset command buffer", e))
    }

    fn free_command_buffer(&self, command_buffer: CommandBufferHandle) {
        let command_pool = self.command_pool.lock();
        unsafe {
            self.device
                .free_command_buffers(*command_pool, &[vk_command_buffer(command_buffer)]);
        }
    }

    fn begin_commands(
        &self,
        command_buffer: CommandBufferHandle,
    ) -> Result<Box<dyn CommandRecorder + '_>, GraphicsError> {
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(vk_command_buffer(command_buffer), &info)
        }
        .map_err(|e| convert_error("Failed to begin command buffer", e))?;

        Ok(Box::new(VulkanRecorder {
            device: &self.device,
            debug_utils: self.debug_utils.as_ref(),
            command_buffer,
        }))
    }

    fn end_commands(&self, command_buffer: CommandBufferHandle) -> Result<(), GraphicsError> {
        unsafe { self.device.end_command_buffer(vk_command_buffer(command_buffer)) }
            .map_err(|e| convert_error("Failed to end command buffer", e))
    }

    fn submit(&self, submission: &Submission<'_>) -> Result<(), GraphicsError> {
        let command_buffers: Vec<vk::CommandBuffer> = submission
            .command_buffers
            .iter()
            .map(|&cb| vk_command_buffer(cb))
            .collect();
        let wait_semaphores: Vec<vk::Semaphore> = submission
            .wait_semaphores
            .iter()
            .map(|&s| vk_semaphore(s))
            .collect();
        let wait_stage_masks: Vec<vk::PipelineStageFlags> = wait_semaphores
            .iter()
            .map(|_| vk::PipelineStageFlags::ALL_COMMANDS)
            .collect();
        let signal_semaphores: Vec<vk::Semaphore> = submission
            .signal_semaphores
            .iter()
            .map(|&s| vk_semaphore(s))
            .collect();

        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stage_masks)
            .signal_semaphores(&signal_semaphores);
        let fence = submission.fence.map_or(vk::Fence::null(), vk_fence);

        let queue = self.queue.lock();
        unsafe { self.device.queue_submit(*queue, &[submit_info], fence) }
            .map_err(|e| convert_error("Failed to submit command buffer", e))
    }

    fn wait_idle(&self) -> Result<(), GraphicsError> {
        let queue = self.queue.lock();
        unsafe { self.device.queue_wait_idle(*queue) }
            .map_err(|e| convert_error("Failed to wait for queue idle", e))
    }

    fn create_timestamp_query_pool(&self, count: u32) -> Result<QueryPoolHandle, GraphicsError> {
        let info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(count);
        let pool = unsafe { self.device.create_query_pool(&info, None) }
            .map_err(|e| convert_error("Failed to create query pool", e))?;
        Ok(from_query_pool(pool))
    }

    fn destroy_query_pool(&self, pool: QueryPoolHandle) {
        unsafe { self.device.destroy_query_pool(vk_query_pool(pool), None) };
    }

    fn timestamp_results(
        &self,
        pool: QueryPoolHandle,
        first: u32,
        count: u32,
    ) -> Result<Option<Vec<u64>>, GraphicsError> {
        let mut results = vec![0u64; count as usize];
        match unsafe {
            self.device.get_query_pool_results(
                vk_query_pool(pool),
                first,
                &mut results,
                vk::QueryResultFlags::TYPE_64,
            )
        } {
            Ok(()) => Ok(Some(results)),
            Err(vk::Result::NOT_READY) => Ok(None),
            Err(e) => Err(convert_error("Failed to read query results", e)),
        }
    }
}

static_assertions::assert_impl_all!(VulkanDevice: Send, Sync);
