use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::error::RenderError;
use crate::renderer::resources::memory::DeviceMemory;

/// A buffer and the memory bound to it, released together.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,

    memory: DeviceMemory,
    device: Arc<ash::Device>,
}

impl GpuBuffer {
    /// Host-visible, coherent, and already mapped
    pub fn new_mapped(
        dev: &RenderDevice,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        let mut buffer = allocate_buffer(
            dev,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        buffer.memory.map()?;
        Ok(buffer)
    }

    /// Device-local buffer filled through a staging copy
    pub fn new_device_local<T: Copy>(
        dev_ctx: &RenderDeviceContext,
        data: &[T],
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        let size = std::mem::size_of_val(data) as vk::DeviceSize;
        let buffer = allocate_buffer(
            &dev_ctx.device,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        upload_via_staging(dev_ctx, data, &buffer)?;
        Ok(buffer)
    }

    pub fn write<T: Copy>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord> {
        self.memory.map()?.write(data, start_offset)
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        // `memory` is freed right after, when the fields drop
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Creates a buffer, allocates memory from the first matching type, and binds it at offset 0.
pub fn allocate_buffer(
    dev: &RenderDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> Result<GpuBuffer> {
    let device = dev.logical.clone();

    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe {
        device
            .create_buffer(&buffer_info, None)
            .map_err(RenderError::creation("buffer"))?
    };

    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let memory = DeviceMemory::allocate(
        device.clone(),
        &dev.memory_properties,
        requirements,
        properties,
    );
    let memory = match memory {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    // From here on the pair is owned together and drop releases both
    let buffer = GpuBuffer {
        buffer,
        size,
        memory,
        device,
    };
    unsafe {
        buffer
            .device
            .bind_buffer_memory(buffer.buffer, buffer.memory.memory, 0)
            .map_err(RenderError::creation("buffer memory binding"))?;
    }

    Ok(buffer)
}

/// Copies `data` into `dst` through a temporary host-visible buffer and a blocking one-shot submit.
pub fn upload_via_staging<T: Copy>(
    dev_ctx: &RenderDeviceContext,
    data: &[T],
    dst: &GpuBuffer,
) -> Result<()> {
    let size = std::mem::size_of_val(data) as vk::DeviceSize;
    let mut staging = GpuBuffer::new_mapped(
        &dev_ctx.device,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
    )?;
    staging.write(data, 0)?;
    // Coherent memory, so no flush is needed before the copy
    staging.memory.unmap();

    copy_buffer(&dev_ctx.transfer(), &staging, dst, size)
        .wrap_err("Staging upload failed")
}

pub fn copy_buffer(
    transfer: &TransferContext,
    src: &GpuBuffer,
    dst: &GpuBuffer,
    size: vk::DeviceSize,
) -> Result<()> {
    transfer.immediate_submit(|cmd, device| {
        let region = vk::BufferCopy::default()
            .src_offset(0)
            .dst_offset(0)
            .size(size);
        unsafe {
            device.cmd_copy_buffer(cmd, src.buffer, dst.buffer, &[region]);
        }
        Ok(())
    })
}
