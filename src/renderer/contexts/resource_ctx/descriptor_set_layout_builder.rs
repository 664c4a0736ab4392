use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use smallvec::SmallVec;
use crate::renderer::error::RenderError;

#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: SmallVec<[vk::DescriptorSetLayoutBinding<'a>; 4]>,
}

impl DescriptorSetLayoutBuilder<'_> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        descriptor_count: u32,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(descriptor_count)
            .stage_flags(stages);

        self.bindings.push(binding);
        self
    }

    /// `(type, count)` for every binding, in the shape pool planning expects
    pub fn binding_counts(&self) -> SmallVec<[(vk::DescriptorType, u32); 4]> {
        self.bindings
            .iter()
            .map(|b| (b.descriptor_type, b.descriptor_count))
            .collect()
    }

    pub fn build(
        self,
        device: Arc<ash::Device>,
    ) -> Result<OwnedSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&self.bindings);
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(RenderError::creation("descriptor set layout"))?
        };
        Ok(OwnedSetLayout { layout, device })
    }
}

/// A descriptor set layout destroyed on drop
pub struct OwnedSetLayout {
    pub layout: vk::DescriptorSetLayout,
    device: Arc<ash::Device>,
}

impl Drop for OwnedSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}
