use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::resources::buffer::GpuBuffer;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::scene::{Component, FrameUpdateData};

/// Device-local mesh buffers plus the pipeline that draws them
pub struct ModelComponent {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    index_count: u32,
    pipeline: vk::Pipeline,
    device: Arc<ash::Device>,
}

impl ModelComponent {
    pub fn new(
        dev_ctx: &RenderDeviceContext,
        mesh: &Mesh,
        pipeline: vk::Pipeline,
    ) -> Result<Self> {
        let vertex_buffer = GpuBuffer::new_device_local(
            dev_ctx,
            &mesh.vertices,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        ).wrap_err("Failed to upload vertex buffer")?;
        let index_buffer = GpuBuffer::new_device_local(
            dev_ctx,
            &mesh.indices,
            vk::BufferUsageFlags::INDEX_BUFFER,
        ).wrap_err("Failed to upload index buffer")?;

        log::debug!(
            "Model uploaded: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len(),
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
            pipeline,
            device: dev_ctx.device.logical.clone(),
        })
    }
}

impl Component for ModelComponent {
    fn update(&mut self, data: &FrameUpdateData) -> Result<()> {
        let cmd = data.command_buffer;
        unsafe {
            self.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            self.device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            self.device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
            self.device.cmd_draw_indexed(cmd, self.index_count, 1, 0, 0, 0);
        }
        Ok(())
    }
}
