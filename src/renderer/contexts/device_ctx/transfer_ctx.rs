use ash::vk;
use color_eyre::eyre::Result;
use crate::renderer::contexts::device_ctx::queue::Queue;
use crate::renderer::error::RenderError;

/// Records and runs a throwaway command buffer on the graphics queue, blocking until the
/// queue drains. Meant for setup-time uploads, not for steady-state per-frame work.
pub struct TransferContext<'a> {
    device: &'a ash::Device,
    command_pool: vk::CommandPool,
    queue: Queue,
}

impl<'a> TransferContext<'a> {
    pub fn new(
        device: &'a ash::Device,
        command_pool: vk::CommandPool,
        queue: Queue,
    ) -> Self {
        Self {
            device,
            command_pool,
            queue,
        }
    }

    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let cmd = unsafe {
            self.device
                .allocate_command_buffers(&command_buffer_info)
                .map_err(RenderError::creation("one-shot command buffer"))?[0]
        };

        let result = self.record_and_submit(cmd, func);

        // Freed on every path so an error mid-recording does not leak the buffer
        unsafe {
            self.device.free_command_buffers(self.command_pool, &[cmd]);
        }

        result
    }

    fn record_and_submit<F>(
        &self,
        cmd: vk::CommandBuffer,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        // This command buffer will be used exactly once
        let cmd_begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(cmd, &cmd_begin_info)?;
        }

        func(cmd, self.device)?;

        unsafe {
            self.device.end_command_buffer(cmd)?;
        }

        let cmds = [cmd];
        let submit = vk::SubmitInfo::default()
            .command_buffers(&cmds);
        unsafe {
            self.device.queue_submit(self.queue.handle, &[submit], vk::Fence::null())?;
            self.device.queue_wait_idle(self.queue.handle)?;
        }

        log::trace!("One-shot submission completed");

        Ok(())
    }
}
