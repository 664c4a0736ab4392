use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::{eyre, WrapErr};
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::resource_ctx::descriptor_set_layout_builder::{DescriptorSetLayoutBuilder, OwnedSetLayout};
use crate::renderer::contexts::resource_ctx::{DescriptorDemand, RenderResourceContext};
use crate::renderer::error::RenderError;
use crate::renderer::resources::image::GpuImage;
use crate::renderer::scene::{Component, FrameUpdateData};

const FALLBACK_SIZE: u32 = 8;

/// Tightly packed RGBA8 pixels, row-major
pub struct Pixels {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Pixels {
    /// Decodes an image file, or falls back to a checkerboard if it can't be read
    pub fn load_or_checkerboard(path: &Path) -> Self {
        match Self::load(path) {
            Ok(pixels) => pixels,
            Err(e) => {
                log::warn!("Using a checkerboard texture: {e:#}");
                checkerboard(FALLBACK_SIZE)
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let decoded = image::open(path)
            .wrap_err_with(|| format!("Failed to load texture {}", path.display()))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Self {
            data: decoded.into_raw(),
            width,
            height,
        })
    }
}

/// Opaque white and magenta squares, one pixel each
pub fn checkerboard(size: u32) -> Pixels {
    let mut data = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let texel = if (x + y) % 2 == 0 {
                [255, 255, 255, 255]
            } else {
                [255, 0, 255, 255]
            };
            data.extend_from_slice(&texel);
        }
    }
    Pixels {
        data,
        width: size,
        height: size,
    }
}

/// Sampled texture bound as one static combined-image-sampler set
pub struct TextureComponent {
    set: vk::DescriptorSet,
    layout: OwnedSetLayout,
    demand: DescriptorDemand,
    sampler: vk::Sampler,
    image: GpuImage,
    set_index: Option<u32>,
    device: Arc<ash::Device>,
}

impl TextureComponent {
    pub fn new(
        dev_ctx: &RenderDeviceContext,
        pixels: &Pixels,
    ) -> Result<Self> {
        let image = GpuImage::new_texture(dev_ctx, &pixels.data, pixels.width, pixels.height)?;
        log::debug!("Texture uploaded: {}x{}", pixels.width, pixels.height);

        let device = dev_ctx.device.logical.clone();
        let sampler = unsafe {
            device
                .create_sampler(&sampler_info(), None)
                .map_err(RenderError::creation("texture sampler"))?
        };

        let builder = DescriptorSetLayoutBuilder::new()
            .add_binding(0, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1, vk::ShaderStageFlags::FRAGMENT);
        let demand = DescriptorDemand {
            bindings: builder.binding_counts(),
            per_frame: false,
        };
        let layout = match builder.build(device.clone()) {
            Ok(layout) => layout,
            Err(e) => {
                unsafe { device.destroy_sampler(sampler, None) };
                return Err(e);
            }
        };

        Ok(Self {
            set: vk::DescriptorSet::null(),
            layout,
            demand,
            sampler,
            image,
            set_index: None,
            device,
        })
    }

    pub fn demand(&self) -> &DescriptorDemand {
        &self.demand
    }

    pub fn allocate_descriptor_sets(&mut self, res: &mut RenderResourceContext) -> Result<()> {
        let set = res
            .allocate_sets(&[self.layout.layout])?
            .first()
            .copied()
            .ok_or_else(|| eyre!("Texture descriptor set allocation returned nothing"))?;

        let image_infos = [vk::DescriptorImageInfo::default()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(self.image.view)
            .sampler(self.sampler)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_infos);
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }

        self.set = set;
        Ok(())
    }
}

impl Component for TextureComponent {
    fn descriptor_layout(&self) -> Option<vk::DescriptorSetLayout> {
        Some(self.layout.layout)
    }

    fn assign_set_index(&mut self, index: u32) {
        self.set_index = Some(index);
    }

    fn update(&mut self, data: &FrameUpdateData) -> Result<()> {
        if self.set == vk::DescriptorSet::null() {
            return Err(eyre!("Texture descriptor set was never allocated"));
        }
        let set_index = self
            .set_index
            .ok_or_else(|| eyre!("Texture layout was never collected into a pipeline layout"))?;
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                data.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                data.pipeline_layout,
                set_index,
                &[self.set],
                &[],
            );
        }
        Ok(())
    }
}

impl Drop for TextureComponent {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

fn sampler_info() -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_is_tightly_packed_rgba8() {
        let pixels = checkerboard(8);
        assert_eq!((pixels.width, pixels.height), (8, 8));
        assert_eq!(pixels.data.len(), 8 * 8 * 4);
    }

    #[test]
    fn test_checkerboard_alternates() {
        let pixels = checkerboard(4);
        let texel = |x: usize, y: usize| {
            let i = (y * 4 + x) * 4;
            &pixels.data[i..i + 4]
        };
        assert_eq!(texel(0, 0), &[255, 255, 255, 255]);
        assert_eq!(texel(1, 0), &[255, 0, 255, 255]);
        assert_eq!(texel(0, 1), &[255, 0, 255, 255]);
        assert_eq!(texel(1, 1), &[255, 255, 255, 255]);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let pixels = Pixels::load_or_checkerboard(Path::new("does/not/exist.png"));
        assert_eq!((pixels.width, pixels.height), (FALLBACK_SIZE, FALLBACK_SIZE));
    }

    #[test]
    fn test_sampler_filters_linearly_and_repeats() {
        let info = sampler_info();
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
        assert_eq!(info.max_lod, 0.0);
    }
}
