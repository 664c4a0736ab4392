use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use glam::Mat4;
use crate::renderer::camera::Camera;
use crate::renderer::config::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::resource_ctx::descriptor_set_layout_builder::{DescriptorSetLayoutBuilder, OwnedSetLayout};
use crate::renderer::contexts::resource_ctx::{DescriptorDemand, RenderResourceContext};
use crate::renderer::resources::buffer::GpuBuffer;
use crate::renderer::scene::{Component, FrameUpdateData};
use crate::renderer::shader_data::UniformBufferObject;

const ROTATION_DEG_PER_SEC: f32 = 90.0;

/// Per-frame model/view/projection uniforms, bound as one descriptor set per frame slot
pub struct TransformComponent {
    sets: Vec<vk::DescriptorSet>,
    uniform_buffers: Vec<GpuBuffer>,
    layout: OwnedSetLayout,
    demand: DescriptorDemand,

    camera: Camera,
    extent: vk::Extent2D,
    animate: bool,
    set_index: Option<u32>,
    device: Arc<ash::Device>,
}

impl TransformComponent {
    pub fn new(
        dev: &RenderDevice,
        extent: vk::Extent2D,
        animate: bool,
    ) -> Result<Self> {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::UNIFORM_BUFFER, 1, vk::ShaderStageFlags::VERTEX);
        let demand = DescriptorDemand {
            bindings: builder.binding_counts(),
            per_frame: true,
        };
        let layout = builder.build(dev.logical.clone())?;

        let uniform_buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                GpuBuffer::new_mapped(
                    dev,
                    size_of::<UniformBufferObject>() as vk::DeviceSize,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sets: Vec::new(),
            uniform_buffers,
            layout,
            demand,
            camera: Camera::new(),
            extent,
            animate,
            set_index: None,
            device: dev.logical.clone(),
        })
    }

    pub fn demand(&self) -> &DescriptorDemand {
        &self.demand
    }

    /// Allocates one set per frame slot and points each at that slot's uniform buffer
    pub fn allocate_descriptor_sets(&mut self, res: &mut RenderResourceContext) -> Result<()> {
        let layouts = [self.layout.layout; MAX_FRAMES_IN_FLIGHT];
        let sets = res.allocate_sets(&layouts)?;

        for (set, buffer) in sets.iter().zip(&self.uniform_buffers) {
            let buffer_infos = [vk::DescriptorBufferInfo::default()
                .buffer(buffer.buffer)
                .offset(0)
                .range(buffer.size)];
            let write = vk::WriteDescriptorSet::default()
                .dst_set(*set)
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_infos);
            unsafe {
                self.device.update_descriptor_sets(&[write], &[]);
            }
        }

        self.sets = sets;
        Ok(())
    }

    pub fn uniforms(&self, elapsed_secs: f32) -> UniformBufferObject {
        UniformBufferObject {
            model: model_matrix(self.animate, elapsed_secs),
            view: self.camera.get_view_mat(),
            proj: self.camera.get_proj_mat(self.extent),
        }
    }
}

impl Component for TransformComponent {
    fn descriptor_layout(&self) -> Option<vk::DescriptorSetLayout> {
        Some(self.layout.layout)
    }

    fn assign_set_index(&mut self, index: u32) {
        self.set_index = Some(index);
    }

    fn update(&mut self, data: &FrameUpdateData) -> Result<()> {
        let set_index = self
            .set_index
            .ok_or_else(|| eyre!("Transform layout was never collected into a pipeline layout"))?;
        let set = *self
            .sets
            .get(data.frame_index)
            .ok_or_else(|| eyre!("No transform descriptor set for frame {}", data.frame_index))?;

        let ubo = self.uniforms(data.elapsed_secs);
        self.uniform_buffers[data.frame_index].write(&[ubo], 0)?;

        unsafe {
            self.device.cmd_bind_descriptor_sets(
                data.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                data.pipeline_layout,
                set_index,
                &[set],
                &[],
            );
        }
        Ok(())
    }
}

/// Quarter turn about +Z, spinning at a constant rate when animated
pub fn model_matrix(animate: bool, elapsed_secs: f32) -> Mat4 {
    let degrees = if animate {
        elapsed_secs * ROTATION_DEG_PER_SEC
    } else {
        90.0
    };
    Mat4::from_rotation_z(degrees.to_radians())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-5, "{a:?} != {b:?}");
    }

    #[test]
    fn test_static_model_is_quarter_turn() {
        let model = model_matrix(false, 12.5);
        assert_close(model.transform_vector3(Vec3::X), Vec3::Y);
        assert_close(model.transform_vector3(Vec3::Z), Vec3::Z);
    }

    #[test]
    fn test_animated_model_follows_time() {
        assert_close(model_matrix(true, 0.0).transform_vector3(Vec3::X), Vec3::X);
        assert_close(model_matrix(true, 1.0).transform_vector3(Vec3::X), Vec3::Y);
        assert_close(model_matrix(true, 2.0).transform_vector3(Vec3::X), Vec3::NEG_X);
    }
}
