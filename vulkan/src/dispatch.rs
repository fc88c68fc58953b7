//! Command recording and queue submission.
//!
//! Submission waits for the whole queue to go idle instead of signalling a
//! fence. One dispatch is in flight at a time; overlapping submissions would
//! need a fence per submission.

use std::marker::PhantomData;

use ash::vk;

use crate::binding::DescriptorSet;
use crate::device::ComputeDevice;
use crate::error::VulkanError;
use crate::pipeline::ComputePipeline;

/// Lifecycle of a command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    Initial,
    Recording,
    Executable,
    Pending,
}

impl CommandBufferState {
    pub fn begin(self) -> Result<Self, VulkanError> {
        match self {
            CommandBufferState::Initial => Ok(CommandBufferState::Recording),
            CommandBufferState::Pending => Err(VulkanError::invalid_state(
                "cannot re-record a command buffer while it is pending",
            )),
            other => Err(VulkanError::invalid_state(format!("cannot begin recording from {:?}", other))),
        }
    }

    /// Commands may only be recorded between `begin` and `end`.
    pub fn require_recording(self) -> Result<(), VulkanError> {
        match self {
            CommandBufferState::Recording => Ok(()),
            other => Err(VulkanError::invalid_state(format!("cannot record commands in {:?} state", other))),
        }
    }

    pub fn end(self) -> Result<Self, VulkanError> {
        self.require_recording()?;
        Ok(CommandBufferState::Executable)
    }

    pub fn submit(self) -> Result<Self, VulkanError> {
        match self {
            CommandBufferState::Executable => Ok(CommandBufferState::Pending),
            other => Err(VulkanError::invalid_state(format!("cannot submit from {:?} state", other))),
        }
    }

    /// Execution finished; the buffer can be recorded again.
    pub fn complete(self) -> Result<Self, VulkanError> {
        match self {
            CommandBufferState::Pending => Ok(CommandBufferState::Initial),
            other => Err(VulkanError::invalid_state(format!("nothing pending in {:?} state", other))),
        }
    }
}

/// Command pool on queue family 0. Buffers allocated from it may be reset
/// by beginning them again.
pub struct CommandPool<'d> {
    gpu: &'d ComputeDevice,
    pool: vk::CommandPool,
}

impl<'d> CommandPool<'d> {
    pub fn new(gpu: &'d ComputeDevice) -> Result<Self, VulkanError> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(gpu.queue_family_index())
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let pool = unsafe { gpu.raw().create_command_pool(&info, None)? };
        Ok(Self { gpu, pool })
    }

    pub fn allocate(&self) -> Result<CommandBuffer<'_>, VulkanError> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.gpu.raw().allocate_command_buffers(&info)? };
        let cmd = *buffers
            .first()
            .ok_or_else(|| VulkanError::invalid_state("driver returned no command buffer"))?;
        Ok(CommandBuffer {
            gpu: self.gpu,
            cmd,
            state: CommandBufferState::Initial,
            _pool: PhantomData,
        })
    }
}

impl Drop for CommandPool<'_> {
    fn drop(&mut self) {
        // Frees every command buffer allocated from the pool.
        unsafe { self.gpu.raw().destroy_command_pool(self.pool, None) };
    }
}

/// Primary command buffer with its lifecycle tracked on the host.
///
/// `'p` covers the pool and every pipeline and descriptor set recorded into
/// the buffer, so none of them can be destroyed while the buffer can still
/// be submitted.
pub struct CommandBuffer<'p> {
    gpu: &'p ComputeDevice,
    cmd: vk::CommandBuffer,
    state: CommandBufferState,
    _pool: PhantomData<&'p CommandPool<'p>>,
}

impl<'p> CommandBuffer<'p> {
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    pub fn begin(&mut self) -> Result<(), VulkanError> {
        let next = self.state.begin()?;
        let info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.gpu.raw().begin_command_buffer(self.cmd, &info)? };
        self.state = next;
        Ok(())
    }

    pub fn bind_descriptor_set(
        &mut self,
        pipeline: &'p ComputePipeline<'_>,
        set: &'p DescriptorSet<'_>,
    ) -> Result<(), VulkanError> {
        self.state.require_recording()?;
        if !set.is_written() {
            return Err(VulkanError::invalid_state("descriptor set has not been written"));
        }
        unsafe {
            self.gpu.raw().cmd_bind_descriptor_sets(
                self.cmd,
                vk::PipelineBindPoint::COMPUTE,
                pipeline.layout(),
                0,
                &[set.handle()],
                &[],
            );
        }
        Ok(())
    }

    pub fn bind_pipeline(&mut self, pipeline: &'p ComputePipeline<'_>) -> Result<(), VulkanError> {
        self.state.require_recording()?;
        unsafe {
            self.gpu
                .raw()
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::COMPUTE, pipeline.handle());
        }
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), VulkanError> {
        self.state.require_recording()?;
        unsafe { self.gpu.raw().cmd_dispatch(self.cmd, x, y, z) };
        Ok(())
    }

    pub fn end(&mut self) -> Result<(), VulkanError> {
        let next = self.state.end()?;
        unsafe { self.gpu.raw().end_command_buffer(self.cmd)? };
        self.state = next;
        Ok(())
    }

    /// Record the whole single-dispatch sequence: bind the descriptor set,
    /// bind the pipeline, dispatch `(group_count_x, 1, 1)`. No barriers are
    /// recorded; [`ComputeDevice::submit_and_wait`] provides the ordering.
    ///
    /// The pipeline and set stay borrowed for as long as the buffer lives:
    ///
    /// ```compile_fail
    /// # use vkdispatch_vulkan::*;
    /// # fn run(
    /// #     gpu: &ComputeDevice,
    /// #     layout: &PipelineLayout<'_>,
    /// #     set: &DescriptorSet<'_>,
    /// #     code: &[u32],
    /// # ) -> Result<(), VulkanError> {
    /// let pool = CommandPool::new(gpu)?;
    /// let mut cmd = pool.allocate()?;
    /// let pipeline = ComputePipeline::new(gpu, layout, code)?;
    /// cmd.record_dispatch(&pipeline, set, 8)?;
    /// drop(pipeline);
    /// gpu.submit_and_wait(&mut cmd)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn record_dispatch(
        &mut self,
        pipeline: &'p ComputePipeline<'_>,
        set: &'p DescriptorSet<'_>,
        group_count_x: u32,
    ) -> Result<(), VulkanError> {
        self.begin()?;
        self.bind_descriptor_set(pipeline, set)?;
        self.bind_pipeline(pipeline)?;
        self.dispatch(group_count_x, 1, 1)?;
        self.end()?;
        log::debug!("recorded dispatch ({}, 1, 1)", group_count_x);
        Ok(())
    }
}

impl ComputeDevice {
    /// Submit `cmd` with no semaphores and block until the queue is idle.
    ///
    /// There is no timeout: a hung dispatch hangs the caller.
    pub fn submit_and_wait(&self, cmd: &mut CommandBuffer<'_>) -> Result<(), VulkanError> {
        let pending = cmd.state.submit()?;
        let command_buffers = [cmd.cmd];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        unsafe { self.raw().queue_submit(self.queue(), &[submit_info], vk::Fence::null())? };
        cmd.state = pending;

        unsafe { self.raw().queue_wait_idle(self.queue())? };
        cmd.state = cmd.state.complete()?;
        log::debug!("queue idle after submission");
        Ok(())
    }
}
